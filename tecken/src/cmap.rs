//! Rebuilding the character-mapping table for a subset.
//!
//! Plain mappings go through write-fonts' `Cmap::from_mappings`; retained
//! variation sequences have no builder equivalent, so the format 14 subtable
//! is serialized by hand and spliced in with recomputed record offsets.

use std::collections::BTreeMap;

use write_fonts::read::tables::cmap as read_cmap;
use write_fonts::read::{FontData, FontRead, TopLevelTable};
use write_fonts::types::{GlyphId, Tag};
use write_fonts::{dump_table, tables::cmap::Cmap};

use crate::{Error, VariationSequence};

const CMAP: Tag = read_cmap::Cmap::TAG;

/// Serialize a cmap covering exactly the retained codepoints and sequences.
pub(crate) fn build(
    mappings: &[(u32, GlyphId)],
    variants: &[(VariationSequence, GlyphId)],
) -> Result<Vec<u8>, Error> {
    let char_map = mappings
        .iter()
        .filter_map(|(cp, gid)| char::from_u32(*cp).map(|c| (c, *gid)));
    let cmap = Cmap::from_mappings(char_map).map_err(|_| Error::RebuildTable(CMAP))?;
    let base = dump_table(&cmap).map_err(|_| Error::RebuildTable(CMAP))?;
    if variants.is_empty() {
        return Ok(base);
    }
    splice_format14(&base, &format14(variants))
}

/// Serialize a format 14 subtable holding only non-default UVS mappings.
fn format14(variants: &[(VariationSequence, GlyphId)]) -> Vec<u8> {
    let mut by_selector: BTreeMap<u32, Vec<(u32, u16)>> = BTreeMap::new();
    for (sequence, gid) in variants {
        by_selector
            .entry(sequence.selector)
            .or_default()
            .push((sequence.base, gid.to_u32() as u16));
    }

    let header_len = 10 + 11 * by_selector.len() as u32;
    let mut records = Vec::new();
    let mut tables = Vec::new();
    for (selector, mappings) in &by_selector {
        let mut mappings = mappings.clone();
        mappings.sort();
        let offset = header_len + tables.len() as u32;
        push_u24(&mut records, *selector);
        records.extend_from_slice(&0u32.to_be_bytes()); // no default UVS table
        records.extend_from_slice(&offset.to_be_bytes());

        tables.extend_from_slice(&(mappings.len() as u32).to_be_bytes());
        for (base, gid) in mappings {
            push_u24(&mut tables, base);
            tables.extend_from_slice(&gid.to_be_bytes());
        }
    }

    let mut out = Vec::with_capacity(header_len as usize + tables.len());
    out.extend_from_slice(&14u16.to_be_bytes());
    out.extend_from_slice(&(header_len + tables.len() as u32).to_be_bytes());
    out.extend_from_slice(&(by_selector.len() as u32).to_be_bytes());
    out.extend_from_slice(&records);
    out.extend_from_slice(&tables);
    out
}

fn push_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes()[1..]);
}

/// Which subtable data a rebuilt encoding record points at.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Block {
    Existing(u32),
    Uvs,
}

/// Re-assemble `base` with one additional (Unicode, encoding 5) record for
/// the UVS subtable, keeping shared subtables shared.
fn splice_format14(base: &[u8], uvs: &[u8]) -> Result<Vec<u8>, Error> {
    let cmap = read_cmap::Cmap::read(FontData::new(base)).map_err(|_| Error::RebuildTable(CMAP))?;
    let mut records: Vec<(u16, u16, Block)> = cmap
        .encoding_records()
        .iter()
        .map(|record| {
            (
                record.platform_id() as u16,
                record.encoding_id(),
                Block::Existing(record.subtable_offset().to_u32()),
            )
        })
        .collect();
    records.push((0, 5, Block::Uvs));
    records.sort();

    let header_len = 4 + 8 * records.len() as u32;
    let mut assigned: BTreeMap<Block, u32> = BTreeMap::new();
    let mut data = Vec::new();
    let mut directory = Vec::new();
    for (platform_id, encoding_id, block) in &records {
        let offset = match assigned.get(block) {
            Some(offset) => *offset,
            None => {
                let bytes = match block {
                    Block::Uvs => uvs,
                    Block::Existing(old_offset) => {
                        let start = *old_offset as usize;
                        let len = subtable_len(base, start)?;
                        base.get(start..start + len).ok_or(Error::RebuildTable(CMAP))?
                    }
                };
                let offset = header_len + data.len() as u32;
                data.extend_from_slice(bytes);
                assigned.insert(*block, offset);
                offset
            }
        };
        directory.extend_from_slice(&platform_id.to_be_bytes());
        directory.extend_from_slice(&encoding_id.to_be_bytes());
        directory.extend_from_slice(&offset.to_be_bytes());
    }

    let mut out = Vec::with_capacity(header_len as usize + data.len());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(records.len() as u16).to_be_bytes());
    out.extend_from_slice(&directory);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Byte length of the subtable starting at `offset`, taken from its header.
fn subtable_len(base: &[u8], offset: usize) -> Result<usize, Error> {
    let err = Error::RebuildTable(CMAP);
    let field = |range: std::ops::Range<usize>| base.get(range).ok_or(Error::RebuildTable(CMAP));
    let format = u16::from_be_bytes(field(offset..offset + 2)?.try_into().unwrap());
    match format {
        4 => Ok(u16::from_be_bytes(field(offset + 2..offset + 4)?.try_into().unwrap()) as usize),
        12 => Ok(u32::from_be_bytes(field(offset + 4..offset + 8)?.try_into().unwrap()) as usize),
        _ => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use write_fonts::read::tables::cmap::{CmapSubtable, MapVariant};

    fn read(bytes: &[u8]) -> read_cmap::Cmap<'_> {
        read_cmap::Cmap::read(FontData::new(bytes)).unwrap()
    }

    #[test]
    fn plain_mappings_only() {
        let bytes = build(&[(0x41, GlyphId::new(1)), (0x43, GlyphId::new(3))], &[]).unwrap();
        let cmap = read(&bytes);
        assert_eq!(cmap.map_codepoint(0x41u32), Some(GlyphId::new(1)));
        assert_eq!(cmap.map_codepoint(0x42u32), None);
        assert_eq!(cmap.map_codepoint(0x43u32), Some(GlyphId::new(3)));
    }

    #[test]
    fn sequences_get_a_format14_record() {
        let variants = [
            (VariationSequence::new(0x4E00, 0xE0100), GlyphId::new(3)),
            (VariationSequence::new(0x4E00, 0xE0101), GlyphId::new(4)),
        ];
        let bytes = build(&[(0x4E00, GlyphId::new(1))], &variants).unwrap();
        let cmap = read(&bytes);
        assert_eq!(cmap.map_codepoint(0x4E00u32), Some(GlyphId::new(1)));

        let cmap14 = cmap
            .encoding_records()
            .iter()
            .filter_map(|record| record.subtable(cmap.offset_data()).ok())
            .find_map(|subtable| match subtable {
                CmapSubtable::Format14(cmap14) => Some(cmap14),
                _ => None,
            })
            .expect("spliced cmap has a format 14 subtable");
        assert_eq!(
            cmap14.map_variant(0x4E00u32, 0xE0100u32),
            Some(MapVariant::Variant(GlyphId::new(3)))
        );
        assert_eq!(
            cmap14.map_variant(0x4E00u32, 0xE0101u32),
            Some(MapVariant::Variant(GlyphId::new(4)))
        );
        assert_eq!(cmap14.map_variant(0x4E01u32, 0xE0100u32), None);
    }

    #[test]
    fn surrogate_keys_are_skipped() {
        let bytes = build(&[(0xD800, GlyphId::new(1)), (0x41, GlyphId::new(2))], &[]).unwrap();
        let cmap = read(&bytes);
        assert_eq!(cmap.map_codepoint(0x41u32), Some(GlyphId::new(2)));
        assert_eq!(cmap.map_codepoint(0xD800u32), None);
    }
}
