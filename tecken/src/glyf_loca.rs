//! Glyph closure and glyf/loca rebuild for a subset.
//!
//! Glyph ids are retained rather than renumbered: dropped glyphs serialize
//! as empty entries and the glyph count is cut at the highest retained id,
//! so composite references and cmap entries stay valid as stored.

use write_fonts::read::{
    collections::IntSet,
    tables::{
        glyf::{Glyf, Glyph},
        head::Head,
        loca::Loca,
    },
    FontRef, TableProvider, TopLevelTable,
};
use write_fonts::types::GlyphId;
use write_fonts::FontBuilder;

use crate::Error;

const MAX_COMPOSITE_OPERATIONS_PER_GLYPH: usize = 64;
const MAX_NESTING_LEVEL: u8 = 64;

/// Add `gid` and every composite component reachable from it to
/// `gids_to_retain`, spending from and returning the operation budget.
pub(crate) fn closure_glyphs(
    loca: &Loca,
    glyf: &Glyf,
    gid: GlyphId,
    gids_to_retain: &mut IntSet<GlyphId>,
    operation_count: i32,
    depth: u8,
) -> i32 {
    if gids_to_retain.contains(gid) {
        return operation_count;
    }
    gids_to_retain.insert(gid);

    if depth > MAX_NESTING_LEVEL {
        return operation_count;
    }
    let depth = depth + 1;

    let mut operation_count = operation_count - 1;
    if operation_count < 0 {
        return operation_count;
    }

    if let Some(Glyph::Composite(glyph)) = loca.get_glyf(gid, glyf).ok().flatten() {
        for component in glyph.components() {
            operation_count = closure_glyphs(
                loca,
                glyf,
                component.glyph.into(),
                gids_to_retain,
                operation_count,
                depth,
            );
        }
    }
    operation_count
}

/// The operation budget for a closure over `retained` starting points.
pub(crate) fn closure_budget(retained: usize) -> i32 {
    (retained * MAX_COMPOSITE_OPERATIONS_PER_GLYPH).min(i32::MAX as usize) as i32
}

/// Rebuild glyf and loca with the retained glyphs in place, and patch the
/// loca format into a copy of head. Returns the new glyph count.
pub(crate) fn rebuild(
    font: &FontRef,
    retained: &IntSet<GlyphId>,
    builder: &mut FontBuilder,
) -> Result<u16, Error> {
    let glyf = font.glyf().map_err(|_| Error::UnsupportedFontFlavor)?;
    let loca = font.loca(None).map_err(|_| Error::UnsupportedFontFlavor)?;
    let head = font.head().map_err(|_| Error::RebuildTable(Head::TAG))?;
    let glyf_bytes = glyf.offset_data().as_bytes();

    let num_glyphs = retained
        .last()
        .map(|gid| gid.to_u32() + 1)
        .unwrap_or(1)
        .min(u16::MAX as u32) as u16;

    let mut glyph_data: Vec<&[u8]> = Vec::with_capacity(num_glyphs as usize);
    let mut total_len: u32 = 0;
    for gid in 0..num_glyphs {
        let gid = GlyphId::new(gid as u32);
        if !retained.contains(gid) {
            glyph_data.push(&[]);
            continue;
        }
        let idx = gid.to_u32() as usize;
        let start = loca.get_raw(idx).ok_or(Error::RebuildTable(Loca::TAG))? as usize;
        let end = loca.get_raw(idx + 1).ok_or(Error::RebuildTable(Loca::TAG))? as usize;
        let data = glyf_bytes
            .get(start..end.max(start))
            .ok_or(Error::RebuildTable(Glyf::TAG))?;
        total_len += padded_size(data.len()) as u32;
        glyph_data.push(data);
    }

    let loca_format: u8 = if total_len < 0x1FFFF { 0 } else { 1 };
    let mut glyf_out = Vec::with_capacity(total_len as usize);
    let mut loca_out = Vec::with_capacity((num_glyphs as usize + 1) * 4);

    if loca_format == 0 {
        loca_out.extend_from_slice(&0u16.to_be_bytes());
        let mut offset: u32 = 0;
        for data in &glyph_data {
            let padded_len = padded_size(data.len());
            offset += padded_len as u32;
            loca_out.extend_from_slice(&((offset >> 1) as u16).to_be_bytes());
            glyf_out.extend_from_slice(data);
            if padded_len > data.len() {
                glyf_out.push(0);
            }
        }
    } else {
        loca_out.extend_from_slice(&0u32.to_be_bytes());
        let mut offset: u32 = 0;
        for data in &glyph_data {
            offset += data.len() as u32;
            loca_out.extend_from_slice(&offset.to_be_bytes());
            glyf_out.extend_from_slice(data);
        }
    }

    // keep a non-empty glyf so validators accept an all-empty subset
    if glyf_out.is_empty() {
        glyf_out.push(0);
    }

    let mut head_out = head.offset_data().as_bytes().to_vec();
    let loc_field = head_out
        .get_mut(50..52)
        .ok_or(Error::RebuildTable(Head::TAG))?;
    loc_field[0] = 0;
    loc_field[1] = loca_format;

    builder.add_raw(Glyf::TAG, glyf_out);
    builder.add_raw(Loca::TAG, loca_out);
    builder.add_raw(Head::TAG, head_out);
    Ok(num_glyphs)
}

fn padded_size(len: usize) -> usize {
    len + len % 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use write_fonts::read::FontRef;

    #[test]
    fn closure_includes_composite_components() {
        // gid 28 is a composite built from gid 1
        let font_bytes = tecken_test_fonts::basic_font();
        let font = FontRef::new(&font_bytes).unwrap();
        let loca = font.loca(None).unwrap();
        let glyf = font.glyf().unwrap();

        let mut gids = IntSet::empty();
        closure_glyphs(&loca, &glyf, GlyphId::new(28), &mut gids, 64, 0);
        assert_eq!(gids.len(), 2);
        assert!(gids.contains(GlyphId::new(28)));
        assert!(gids.contains(GlyphId::new(1)));
    }

    #[test]
    fn rebuild_keeps_only_retained_outlines() {
        let font_bytes = tecken_test_fonts::basic_font();
        let font = FontRef::new(&font_bytes).unwrap();

        let mut retained = IntSet::empty();
        retained.insert(GlyphId::new(0));
        retained.insert(GlyphId::new(3));
        let mut builder = FontBuilder::default();
        let num_glyphs = rebuild(&font, &retained, &mut builder).unwrap();
        assert_eq!(num_glyphs, 4);
        assert!(builder.contains(Glyf::TAG));
        assert!(builder.contains(Loca::TAG));
        assert!(builder.contains(Head::TAG));
    }
}
