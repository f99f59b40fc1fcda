//! Building a minimal embeddable subset of a font.

use std::collections::BTreeSet;

use write_fonts::read::{collections::IntSet, FontRef, TableProvider};
use write_fonts::types::{GlyphId, Tag};
use write_fonts::FontBuilder;

use crate::{cmap, coverage, glyf_loca, hmtx, name, woff2, Error, VariationSequence};

const MAX_GID: GlyphId = GlyphId::new(0xFFFF);

/// Tables copied into the subset unchanged: glyph programs may call into the
/// hinting support tables, and OS/2 carries metadata consumers expect.
const PASSTHROUGH_TAGS: [Tag; 5] = [
    Tag::new(b"OS/2"),
    Tag::new(b"cvt "),
    Tag::new(b"fpgm"),
    Tag::new(b"prep"),
    Tag::new(b"gasp"),
];

/// The characters a subset must keep.
#[derive(Clone, Debug, Default)]
pub struct SubsetInput {
    pub codepoints: IntSet<u32>,
    pub sequences: BTreeSet<VariationSequence>,
}

impl SubsetInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every character of `text`, with base+selector pairs also requested as
    /// variation sequences.
    pub fn from_text(text: &str) -> Self {
        let mut input = Self::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            input.codepoints.insert(c as u32);
            if let Some(&next) = chars.peek() {
                if crate::is_variation_selector(next as u32) {
                    input
                        .sequences
                        .insert(VariationSequence::new(c as u32, next as u32));
                }
            }
        }
        input
    }

    /// Request everything the font maps, sequences included.
    pub fn all() -> Self {
        let mut input = Self::new();
        input.codepoints = IntSet::all();
        input
    }

    /// A sequence is kept when requested outright, or when both of its
    /// characters are requested (what text-driven subsetting implies).
    fn wants_sequence(&self, sequence: &VariationSequence) -> bool {
        self.sequences.contains(sequence)
            || (self.codepoints.contains(sequence.base)
                && self.codepoints.contains(sequence.selector))
    }

    pub fn is_empty(&self) -> bool {
        self.codepoints.is_empty() && self.sequences.is_empty()
    }
}

/// A finished subset: the WOFF2 payload plus what it declares about itself.
///
/// One artifact per distinct (source font, required set) pair; identical
/// inputs produce identical bytes.
pub struct SubsetFont {
    pub family_name: String,
    /// Codepoints actually retained, ascending.
    pub codepoints: IntSet<u32>,
    /// Variation sequences actually retained.
    pub sequences: BTreeSet<VariationSequence>,
    /// The WOFF2-encoded subset binary.
    pub data: Vec<u8>,
}

/// Subset `font_bytes` down to `input`.
///
/// Characters the font does not cover are omitted without error. The family
/// name is preserved verbatim unless `family_override` is given.
pub fn subset(
    font_bytes: &[u8],
    input: &SubsetInput,
    family_override: Option<&str>,
) -> Result<SubsetFont, Error> {
    let sfnt = woff2::ensure_sfnt(font_bytes)?;
    let font = FontRef::new(&sfnt)?;

    let family_name = match family_override {
        Some(family) => family.to_string(),
        None => name::family_name(&font)?,
    };

    let maps = coverage::char_maps(&font)?;
    let mappings: Vec<(u32, GlyphId)> = maps
        .mappings
        .iter()
        .filter(|(codepoint, _)| input.codepoints.contains(**codepoint))
        .map(|(codepoint, gid)| (*codepoint, *gid))
        .collect();
    let variants: Vec<(VariationSequence, GlyphId)> = maps
        .variants
        .iter()
        .filter(|(sequence, _)| input.wants_sequence(sequence))
        .map(|(sequence, gid)| (*sequence, *gid))
        .collect();

    let glyf = font.glyf().map_err(|_| Error::UnsupportedFontFlavor)?;
    let loca = font.loca(None).map_err(|_| Error::UnsupportedFontFlavor)?;

    let mut retained = IntSet::empty();
    retained.insert(GlyphId::NOTDEF);
    let mut budget = glyf_loca::closure_budget(mappings.len() + variants.len() + 1);
    for gid in mappings
        .iter()
        .map(|(_, gid)| *gid)
        .chain(variants.iter().map(|(_, gid)| *gid))
    {
        budget = glyf_loca::closure_glyphs(&loca, &glyf, gid, &mut retained, budget, 0);
    }
    let font_num_glyphs = font_num_glyphs(&font);
    retained.remove_range(GlyphId::new(font_num_glyphs as u32)..=MAX_GID);

    let mut builder = FontBuilder::default();
    builder.add_raw(Tag::new(b"cmap"), cmap::build(&mappings, &variants)?);
    let num_glyphs = glyf_loca::rebuild(&font, &retained, &mut builder)?;
    hmtx::rebuild(&font, num_glyphs, &mut builder)?;
    builder.add_raw(Tag::new(b"maxp"), rebuild_maxp(&font, num_glyphs)?);
    name::rebuild(&font, family_override, &mut builder)?;
    if let Some(post) = rebuild_post(&font) {
        builder.add_raw(Tag::new(b"post"), post);
    }
    for tag in PASSTHROUGH_TAGS {
        if let Some(data) = font.table_data(tag) {
            builder.add_raw(tag, data.as_bytes().to_vec());
        }
    }

    let data = woff2::compress(&builder.build())?;
    Ok(SubsetFont {
        family_name,
        codepoints: mappings.iter().map(|(codepoint, _)| *codepoint).collect(),
        sequences: variants.iter().map(|(sequence, _)| *sequence).collect(),
        data,
    })
}

fn font_num_glyphs(font: &FontRef) -> usize {
    let from_loca = font.loca(None).map(|loca| loca.len()).unwrap_or(0);
    let from_maxp = font
        .maxp()
        .map(|maxp| maxp.num_glyphs() as usize)
        .unwrap_or(0);
    from_loca.max(from_maxp)
}

/// Copy maxp with the truncated glyph count patched in.
fn rebuild_maxp(font: &FontRef, num_glyphs: u16) -> Result<Vec<u8>, Error> {
    let maxp = font
        .maxp()
        .map_err(|_| Error::RebuildTable(Tag::new(b"maxp")))?;
    let mut out = maxp.offset_data().as_bytes().to_vec();
    let count_field = out
        .get_mut(4..6)
        .ok_or(Error::RebuildTable(Tag::new(b"maxp")))?;
    count_field.copy_from_slice(&num_glyphs.to_be_bytes());
    Ok(out)
}

/// A version 3.0 post header keeping the source's metrics; glyph names are
/// dropped along with the glyphs.
fn rebuild_post(font: &FontRef) -> Option<Vec<u8>> {
    let data = font.table_data(Tag::new(b"post"))?;
    let mut out = data.as_bytes().get(..32)?.to_vec();
    out[..4].copy_from_slice(&0x00030000u32.to_be_bytes());
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_coverage;

    fn unicodes(codepoints: &[u32]) -> SubsetInput {
        let mut input = SubsetInput::new();
        input.codepoints.extend(codepoints.iter().copied());
        input
    }

    #[test]
    fn absent_characters_are_omitted_silently() {
        let font = tecken_test_fonts::basic_font();
        let out = subset(&font, &unicodes(&[0x41, 0x43, 0x391]), None).unwrap();
        let retained: Vec<u32> = out.codepoints.iter().collect();
        assert_eq!(retained, vec![0x41, 0x43]);

        let coverage = parse_coverage(&out.data).unwrap();
        let reparsed: Vec<u32> = coverage.codepoints.iter().collect();
        assert_eq!(reparsed, vec![0x41, 0x43]);
    }

    #[test]
    fn composite_components_come_along() {
        let font = tecken_test_fonts::basic_font();
        let out = subset(&font, &unicodes(&[0xC5]), None).unwrap();

        let sfnt = crate::woff2::decompress(&out.data).unwrap();
        let rebuilt = FontRef::new(&sfnt).unwrap();
        let loca = rebuilt.loca(None).unwrap();
        let glyf = rebuilt.glyf().unwrap();
        // the composite itself
        assert!(loca.get_glyf(GlyphId::new(28), &glyf).unwrap().is_some());
        // and the component it references
        assert!(loca.get_glyf(GlyphId::new(1), &glyf).unwrap().is_some());
        // but not unrelated glyphs
        assert!(loca.get_glyf(GlyphId::new(2), &glyf).unwrap().is_none());
    }

    #[test]
    fn sequences_survive_subsetting() {
        let font = tecken_test_fonts::variant_font();
        let mut input = unicodes(&[0x4E00]);
        input
            .sequences
            .insert(VariationSequence::new(0x4E00, 0xE0100));
        let out = subset(&font, &input, None).unwrap();
        assert_eq!(out.sequences.len(), 1);

        let coverage = parse_coverage(&out.data).unwrap();
        assert_eq!(
            coverage.sequences.into_iter().collect::<Vec<_>>(),
            vec![VariationSequence::new(0x4E00, 0xE0100)]
        );
    }

    #[test]
    fn family_name_is_preserved_or_overridden() {
        let font = tecken_test_fonts::basic_font();
        let kept = subset(&font, &unicodes(&[0x41]), None).unwrap();
        assert_eq!(kept.family_name, "Tecken Sans");

        let renamed = subset(&font, &unicodes(&[0x41]), Some("Tecken Subset")).unwrap();
        assert_eq!(renamed.family_name, "Tecken Subset");
        let sfnt = crate::woff2::decompress(&renamed.data).unwrap();
        let rebuilt = FontRef::new(&sfnt).unwrap();
        assert_eq!(crate::family_name(&rebuilt).unwrap(), "Tecken Subset");
    }

    #[test]
    fn missing_family_name_is_fatal() {
        let font = tecken_test_fonts::no_family_name_font();
        assert!(matches!(
            subset(&font, &unicodes(&[0x41]), None),
            Err(Error::MissingFamilyName)
        ));
    }

    #[test]
    fn fonts_without_glyf_are_rejected() {
        let font_bytes = tecken_test_fonts::basic_font();
        let font = FontRef::new(&font_bytes).unwrap();
        let mut builder = FontBuilder::default();
        for record in font.table_directory.table_records() {
            let tag = record.tag();
            if tag == Tag::new(b"glyf") || tag == Tag::new(b"loca") {
                continue;
            }
            builder.add_raw(tag, font.table_data(tag).unwrap().as_bytes().to_vec());
        }
        let no_glyf = builder.build();
        assert!(matches!(
            subset(&no_glyf, &unicodes(&[0x41]), None),
            Err(Error::UnsupportedFontFlavor)
        ));
    }

    #[test]
    fn from_text_pairs_selectors_with_bases() {
        let input = SubsetInput::from_text("一\u{E0100}あ");
        assert!(input.codepoints.contains(0x4E00));
        assert!(input.codepoints.contains(0x3042));
        assert!(input.codepoints.contains(0xE0100));
        assert_eq!(
            input.sequences.iter().copied().collect::<Vec<_>>(),
            vec![VariationSequence::new(0x4E00, 0xE0100)]
        );
    }
}
