//! Horizontal metrics rebuild for a subset.

use write_fonts::read::{
    tables::{hhea::Hhea, hmtx::Hmtx},
    FontRef, TableProvider, TopLevelTable,
};
use write_fonts::types::GlyphId;
use write_fonts::FontBuilder;

use crate::Error;

/// Rebuild hmtx for the first `num_glyphs` glyph ids and patch the metric
/// count into a copy of hhea.
pub(crate) fn rebuild(
    font: &FontRef,
    num_glyphs: u16,
    builder: &mut FontBuilder,
) -> Result<(), Error> {
    let hmtx = font.hmtx().map_err(|_| Error::RebuildTable(Hmtx::TAG))?;

    let mut metrics = Vec::with_capacity(num_glyphs as usize);
    for gid in 0..num_glyphs {
        let gid = GlyphId::new(gid as u32);
        let advance = hmtx.advance(gid).unwrap_or(0);
        let side_bearing = hmtx.side_bearing(gid).unwrap_or(0);
        metrics.push((advance, side_bearing));
    }
    let (num_h_metrics, hmtx_out) = serialize(&metrics);

    let hhea = font.hhea().map_err(|_| Error::RebuildTable(Hhea::TAG))?;
    let mut hhea_out = hhea.offset_data().as_bytes().to_vec();
    let count_field = hhea_out
        .get_mut(34..36)
        .ok_or(Error::RebuildTable(Hhea::TAG))?;
    count_field.copy_from_slice(&num_h_metrics.to_be_bytes());

    builder.add_raw(Hmtx::TAG, hmtx_out);
    builder.add_raw(Hhea::TAG, hhea_out);
    Ok(())
}

/// Serialize one (advance, side bearing) pair per glyph, trimming the
/// trailing run of equal advances into bare side bearings.
fn serialize(metrics: &[(u16, i16)]) -> (u16, Vec<u8>) {
    let last_advance = metrics.last().map(|(advance, _)| *advance).unwrap_or(0);
    let mut num_h_metrics = metrics.len().max(1);
    while num_h_metrics > 1 && metrics[num_h_metrics - 2].0 == last_advance {
        num_h_metrics -= 1;
    }

    let mut out = Vec::with_capacity(num_h_metrics * 4 + (metrics.len() - num_h_metrics) * 2);
    for (i, (advance, side_bearing)) in metrics.iter().enumerate() {
        if i < num_h_metrics {
            out.extend_from_slice(&advance.to_be_bytes());
        }
        out.extend_from_slice(&side_bearing.to_be_bytes());
    }
    (num_h_metrics as u16, out)
}
