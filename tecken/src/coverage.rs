//! Reading codepoint coverage and variation sequences out of a font's
//! character-mapping table.

use std::collections::{BTreeMap, BTreeSet};

use write_fonts::read::{
    collections::IntSet,
    tables::cmap::{CmapSubtable, MapVariant},
    FontRef, TableProvider,
};
use write_fonts::types::GlyphId;

use crate::{is_variation_selector, woff2, Error, VariationSequence};

/// Everything a font's cmap table says about the characters it can render.
pub struct Coverage {
    /// Every directly mapped codepoint, ascending.
    pub codepoints: IntSet<u32>,
    /// Every resolved variation sequence, ordered by base then selector.
    pub sequences: BTreeSet<VariationSequence>,
    /// Subtables that were skipped and sequences that were dropped.
    pub warnings: Vec<Warning>,
}

/// A non-fatal problem found while walking cmap subtables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// An encoding record whose subtable has no direct codepoint-to-glyph
    /// reading (or could not be read at all); the record is skipped.
    UnsupportedSubtableFormat { platform_id: u16, encoding_id: u16 },
    /// A variation-sequence pair whose glyph reference did not resolve;
    /// the pair is dropped.
    UnresolvedVariationSelector { base: u32, selector: u32 },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnsupportedSubtableFormat {
                platform_id,
                encoding_id,
            } => write!(
                f,
                "skipped unsupported cmap subtable (platform {platform_id}, encoding {encoding_id})"
            ),
            Warning::UnresolvedVariationSelector { base, selector } => write!(
                f,
                "dropped variation sequence U+{base:04X} U+{selector:04X}: unresolved glyph reference"
            ),
        }
    }
}

/// Extract the coverage of a font binary.
///
/// The input may be a raw table-directory font or a WOFF2 transport
/// container; the container is decompressed internally. A font with no
/// readable character-mapping table is a fatal
/// [`MalformedContainer`](Error::MalformedContainer).
pub fn parse_coverage(container: &[u8]) -> Result<Coverage, Error> {
    let sfnt = woff2::ensure_sfnt(container)?;
    let font = FontRef::new(&sfnt)?;
    Ok(char_maps(&font)?.into_coverage())
}

/// A variant mapping as stored in a format 14 subtable, before resolution.
enum VariantRef {
    /// The non-default mapping names a variant glyph.
    Glyph(GlyphId),
    /// The default mapping: the base character's own glyph applies.
    Default,
}

impl From<MapVariant> for VariantRef {
    fn from(variant: MapVariant) -> Self {
        match variant {
            MapVariant::Variant(gid) => VariantRef::Glyph(gid),
            MapVariant::UseDefault => VariantRef::Default,
        }
    }
}

/// The full character-to-glyph view of a font, shared between coverage
/// extraction and subsetting.
pub(crate) struct CharMaps {
    /// codepoint → glyph, first mapping wins across subtables.
    pub(crate) mappings: BTreeMap<u32, GlyphId>,
    /// resolved variation sequence → variant glyph.
    pub(crate) variants: BTreeMap<VariationSequence, GlyphId>,
    pub(crate) warnings: Vec<Warning>,
}

impl CharMaps {
    pub(crate) fn into_coverage(self) -> Coverage {
        Coverage {
            codepoints: self.mappings.keys().copied().collect(),
            sequences: self.variants.keys().copied().collect(),
            warnings: self.warnings,
        }
    }
}

/// Walk every cmap encoding record once.
pub(crate) fn char_maps(font: &FontRef) -> Result<CharMaps, Error> {
    let cmap = font.cmap()?;
    let num_glyphs = font.maxp().map(|maxp| maxp.num_glyphs()).unwrap_or(u16::MAX);

    let mut maps = CharMaps {
        mappings: BTreeMap::new(),
        variants: BTreeMap::new(),
        warnings: Vec::new(),
    };

    for record in cmap.encoding_records() {
        let unsupported = Warning::UnsupportedSubtableFormat {
            platform_id: record.platform_id() as u16,
            encoding_id: record.encoding_id(),
        };
        let Ok(subtable) = record.subtable(cmap.offset_data()) else {
            maps.warnings.push(unsupported);
            continue;
        };
        match subtable {
            CmapSubtable::Format4(subtable) => {
                for (codepoint, gid) in subtable.iter() {
                    maps.mappings.entry(codepoint).or_insert(gid);
                }
            }
            CmapSubtable::Format12(subtable) => {
                for (codepoint, gid) in subtable.iter() {
                    if codepoint <= char::MAX as u32 {
                        maps.mappings.entry(codepoint).or_insert(gid);
                    }
                }
            }
            CmapSubtable::Format14(subtable) => {
                for (base, selector, variant) in subtable.iter() {
                    resolve_variant(&mut maps, base, selector, variant.into(), num_glyphs);
                }
            }
            _ => maps.warnings.push(unsupported),
        }
    }
    Ok(maps)
}

/// Resolve one variation-sequence record into a concrete (sequence, glyph)
/// pair, or drop it with a warning. Default mappings carry no variant glyph
/// and contribute nothing to coverage.
fn resolve_variant(
    maps: &mut CharMaps,
    base: u32,
    selector: u32,
    variant: VariantRef,
    num_glyphs: u16,
) {
    let gid = match variant {
        VariantRef::Default => return,
        VariantRef::Glyph(gid) => gid,
    };
    if !is_variation_selector(selector) || gid.to_u32() >= num_glyphs as u32 {
        maps.warnings
            .push(Warning::UnresolvedVariationSelector { base, selector });
        return;
    }
    maps.variants
        .entry(VariationSequence::new(base, selector))
        .or_insert(gid);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tecken_test_fonts::TestFont;

    #[test]
    fn direct_mappings_sorted_and_deduped() {
        let font = TestFont::new()
            .map(0x5A, 3)
            .map(0x41, 1)
            .map(0x42, 2)
            .family_name("Tecken Sans")
            .build();
        let coverage = parse_coverage(&font).unwrap();
        let codepoints: Vec<u32> = coverage.codepoints.iter().collect();
        assert_eq!(codepoints, vec![0x41, 0x42, 0x5A]);
        assert!(coverage.sequences.is_empty());
        assert!(coverage.warnings.is_empty());
    }

    #[test]
    fn variation_sequences_share_a_base() {
        let coverage = parse_coverage(&tecken_test_fonts::variant_font()).unwrap();
        let sequences: Vec<VariationSequence> = coverage.sequences.into_iter().collect();
        assert_eq!(
            sequences,
            vec![
                VariationSequence::new(0x4E00, 0xE0100),
                VariationSequence::new(0x4E00, 0xE0101),
            ]
        );
        // the default entry for U+4E01 is ignored, the base codepoint is not
        assert!(coverage.codepoints.contains(0x4E01));
    }

    #[test]
    fn unsupported_subtable_warns_and_continues() {
        let coverage = parse_coverage(&tecken_test_fonts::unsupported_subtable_font()).unwrap();
        assert!(coverage.codepoints.contains(0x41));
        assert_eq!(
            coverage.warnings,
            vec![Warning::UnsupportedSubtableFormat {
                platform_id: 3,
                encoding_id: 1,
            }]
        );
    }

    #[test]
    fn unresolved_variant_dropped_with_warning() {
        let coverage = parse_coverage(&tecken_test_fonts::unresolved_variant_font()).unwrap();
        let sequences: Vec<VariationSequence> = coverage.sequences.into_iter().collect();
        assert_eq!(sequences, vec![VariationSequence::new(0x4E00, 0xE0100)]);
        assert_eq!(
            coverage.warnings,
            vec![Warning::UnresolvedVariationSelector {
                base: 0x4E00,
                selector: 0xE0101,
            }]
        );
    }

    #[test]
    fn woff2_container_is_decompressed() {
        let sfnt = tecken_test_fonts::basic_font();
        let woff2 = crate::woff2::compress(&sfnt).unwrap();
        let from_sfnt = parse_coverage(&sfnt).unwrap();
        let from_woff2 = parse_coverage(&woff2).unwrap();
        let a: Vec<u32> = from_sfnt.codepoints.iter().collect();
        let b: Vec<u32> = from_woff2.codepoints.iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_cmap_is_fatal() {
        assert!(matches!(
            parse_coverage(b"not a font at all"),
            Err(Error::MalformedContainer(_))
        ));
    }
}
