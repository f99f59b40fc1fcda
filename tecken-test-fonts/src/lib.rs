//! Synthetic font binaries shared between tecken tests.
//!
//! Fonts are assembled programmatically: glyf/loca and name through
//! write-fonts, the small fixed-size tables and every cmap subtable by hand,
//! so tests can exercise subtable layouts (format 14, unsupported formats,
//! out-of-range glyph references) that no builder API produces.

mod bebuffer;

pub use bebuffer::BeBuffer;

use std::collections::BTreeMap;

use font_types::{GlyphId16, Tag, Uint24};
use write_fonts::{
    dump_table,
    tables::glyf::{
        Anchor, Bbox, Component, ComponentFlags, CompositeGlyph, GlyfLocaBuilder, SimpleGlyph,
        Transform,
    },
    tables::loca::LocaFormat,
    tables::name::{Name, NameRecord},
    types::NameId,
    FontBuilder,
};
use write_fonts::read::tables::glyf::CurvePoint;

/// Builder for a small TrueType font with exactly the coverage a test needs.
#[derive(Default)]
pub struct TestFont {
    mappings: Vec<(u32, u16)>,
    variants: Vec<(u32, u32, u16)>,
    default_variants: Vec<(u32, u32)>,
    composites: BTreeMap<u16, u16>,
    family_name: Option<String>,
    mac_names_only: bool,
    extra_cmap_subtables: Vec<(u16, u16, Vec<u8>)>,
    num_glyphs: Option<u16>,
}

impl TestFont {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a codepoint to a glyph id.
    pub fn map(mut self, codepoint: u32, gid: u16) -> Self {
        self.mappings.push((codepoint, gid));
        self
    }

    /// Map `count` consecutive codepoints starting at `start` to consecutive
    /// glyph ids starting at `first_gid`.
    pub fn map_range(mut self, start: u32, first_gid: u16, count: u32) -> Self {
        for i in 0..count {
            self.mappings.push((start + i, first_gid + i as u16));
        }
        self
    }

    /// Add a non-default variation sequence mapping to a variant glyph.
    pub fn variant(mut self, base: u32, selector: u32, gid: u16) -> Self {
        self.variants.push((base, selector, gid));
        self
    }

    /// Add a default variation sequence entry (no variant glyph).
    pub fn default_variant(mut self, base: u32, selector: u32) -> Self {
        self.default_variants.push((base, selector));
        self
    }

    /// Make `gid` a composite glyph referencing `component`.
    pub fn composite(mut self, gid: u16, component: u16) -> Self {
        self.composites.insert(gid, component);
        self
    }

    pub fn family_name(mut self, name: &str) -> Self {
        self.family_name = Some(name.to_string());
        self
    }

    /// Emit only Macintosh name records, leaving out the Windows Unicode
    /// family record that downstream consumers require.
    pub fn mac_names_only(mut self) -> Self {
        self.mac_names_only = true;
        self
    }

    /// Append a raw cmap subtable under the given platform/encoding ids.
    pub fn extra_cmap_subtable(mut self, platform: u16, encoding: u16, bytes: Vec<u8>) -> Self {
        self.extra_cmap_subtables.push((platform, encoding, bytes));
        self
    }

    /// Override the glyph count (default: highest referenced gid + 1).
    pub fn num_glyphs(mut self, n: u16) -> Self {
        self.num_glyphs = Some(n);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let num_glyphs = self.num_glyphs.unwrap_or_else(|| {
            let max_gid = self
                .mappings
                .iter()
                .map(|(_, gid)| *gid)
                .chain(self.variants.iter().map(|(_, _, gid)| *gid))
                .chain(self.composites.iter().flat_map(|(g, c)| [*g, *c]))
                .max()
                .unwrap_or(0);
            max_gid + 1
        });

        let (glyf, loca, loca_format) = self.build_glyf_loca(num_glyphs);
        let cmap = self.build_cmap();
        let name = self.build_name();

        let mut builder = FontBuilder::default();
        builder.add_raw(Tag::new(b"cmap"), cmap);
        builder.add_raw(Tag::new(b"glyf"), glyf);
        builder.add_raw(Tag::new(b"loca"), loca);
        builder.add_raw(Tag::new(b"head"), head(loca_format));
        builder.add_raw(Tag::new(b"hhea"), hhea(num_glyphs));
        builder.add_raw(Tag::new(b"hmtx"), hmtx(num_glyphs));
        builder.add_raw(Tag::new(b"maxp"), maxp(num_glyphs));
        builder.add_raw(Tag::new(b"post"), post());
        builder.add_raw(Tag::new(b"name"), name);
        builder.build()
    }

    fn build_glyf_loca(&self, num_glyphs: u16) -> (Vec<u8>, Vec<u8>, LocaFormat) {
        let mut builder = GlyfLocaBuilder::new();
        for gid in 0..num_glyphs {
            if let Some(component) = self.composites.get(&gid) {
                let glyph = CompositeGlyph::new(
                    Component::new(
                        GlyphId16::new(*component),
                        Anchor::Offset { x: 0, y: 0 },
                        Transform::default(),
                        ComponentFlags::default(),
                    ),
                    box_bbox(),
                );
                builder.add_glyph(&glyph).unwrap();
            } else {
                builder.add_glyph(&box_glyph()).unwrap();
            }
        }
        let (glyf, loca, format) = builder.build();
        (
            dump_table(&glyf).unwrap(),
            dump_table(&loca).unwrap(),
            format,
        )
    }

    fn build_cmap(&self) -> Vec<u8> {
        let mut records: Vec<(u16, u16, Vec<u8>)> = Vec::new();
        if !self.variants.is_empty() || !self.default_variants.is_empty() {
            records.push((0, 5, cmap14(&self.variants, &self.default_variants)));
        }
        records.push((3, 10, cmap12(&self.mappings)));
        records.extend(self.extra_cmap_subtables.iter().cloned());
        records.sort_by_key(|(platform, encoding, _)| (*platform, *encoding));

        let header_len = 4 + 8 * records.len() as u32;
        let mut buf = BeBuffer::new()
            .push(0u16) // version
            .push(records.len() as u16);
        let mut offset = header_len;
        for (platform, encoding, subtable) in &records {
            buf = buf.push(*platform).push(*encoding).push(offset);
            offset += subtable.len() as u32;
        }
        for (_, _, subtable) in &records {
            buf = buf.push_bytes(subtable);
        }
        buf.into_vec()
    }

    fn build_name(&self) -> Vec<u8> {
        let family = self.family_name.as_deref().unwrap_or("Tecken Sans");
        let mut name = Name::default();
        if self.mac_names_only {
            name.name_record
                .push(name_record(1, 0, 0, 1, family));
            name.name_record.push(name_record(1, 0, 0, 2, "Regular"));
        } else {
            name.name_record
                .push(name_record(3, 1, 0x409, 1, family));
            name.name_record.push(name_record(3, 1, 0x409, 2, "Regular"));
        }
        name.name_record.sort();
        dump_table(&name).unwrap()
    }
}

fn name_record(
    platform_id: u16,
    encoding_id: u16,
    language_id: u16,
    name_id: u16,
    value: &str,
) -> NameRecord {
    NameRecord {
        platform_id,
        encoding_id,
        language_id,
        name_id: NameId::new(name_id),
        string: value.to_string().into(),
    }
}

fn box_glyph() -> SimpleGlyph {
    let points = vec![
        CurvePoint::on_curve(50, 0),
        CurvePoint::on_curve(550, 0),
        CurvePoint::on_curve(550, 700),
        CurvePoint::on_curve(50, 700),
    ];
    SimpleGlyph {
        bbox: box_bbox(),
        contours: vec![points.into()],
        instructions: Vec::new(),
    }
}

fn box_bbox() -> Bbox {
    Bbox {
        x_min: 50,
        y_min: 0,
        x_max: 550,
        y_max: 700,
    }
}

/// Serialize a format 12 subtable, one segment per run of consecutive
/// codepoints with consecutive glyph ids.
fn cmap12(mappings: &[(u32, u16)]) -> Vec<u8> {
    let mut mappings = mappings.to_vec();
    mappings.sort();
    mappings.dedup();

    let mut groups: Vec<(u32, u32, u32)> = Vec::new();
    for (cp, gid) in mappings {
        match groups.last_mut() {
            Some((start, end, start_gid))
                if *end + 1 == cp && *start_gid + (cp - *start) == gid as u32 =>
            {
                *end = cp;
            }
            _ => groups.push((cp, cp, gid as u32)),
        }
    }

    let length = 16 + 12 * groups.len() as u32;
    let mut buf = BeBuffer::new()
        .push(12u16) // format
        .push(0u16) // reserved
        .push(length)
        .push(0u32) // language
        .push(groups.len() as u32);
    for (start, end, start_gid) in groups {
        buf = buf.push(start).push(end).push(start_gid);
    }
    buf.into_vec()
}

/// Serialize a format 14 subtable from non-default and default UVS entries.
fn cmap14(variants: &[(u32, u32, u16)], defaults: &[(u32, u32)]) -> Vec<u8> {
    // group by selector
    let mut non_default: BTreeMap<u32, Vec<(u32, u16)>> = BTreeMap::new();
    for (base, selector, gid) in variants {
        non_default.entry(*selector).or_default().push((*base, *gid));
    }
    let mut default: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (base, selector) in defaults {
        default.entry(*selector).or_default().push(*base);
    }
    let mut selectors: Vec<u32> = non_default.keys().chain(default.keys()).copied().collect();
    selectors.sort();
    selectors.dedup();

    let header_len = 10 + 11 * selectors.len() as u32;

    // lay out the UVS tables after the selector records
    let mut tables = BeBuffer::new();
    let mut records: Vec<(u32, u32, u32)> = Vec::new();
    for selector in &selectors {
        let mut default_offset = 0u32;
        let mut non_default_offset = 0u32;
        if let Some(bases) = default.get(selector) {
            let mut bases = bases.clone();
            bases.sort();
            default_offset = header_len + tables.len() as u32;
            tables = tables.push(bases.len() as u32);
            for base in bases {
                tables = tables.push(Uint24::new(base)).push(0u8);
            }
        }
        if let Some(mappings) = non_default.get(selector) {
            let mut mappings = mappings.clone();
            mappings.sort();
            non_default_offset = header_len + tables.len() as u32;
            tables = tables.push(mappings.len() as u32);
            for (base, gid) in mappings {
                tables = tables.push(Uint24::new(base)).push(gid);
            }
        }
        records.push((*selector, default_offset, non_default_offset));
    }

    let length = header_len + tables.len() as u32;
    let mut buf = BeBuffer::new()
        .push(14u16)
        .push(length)
        .push(selectors.len() as u32);
    for (selector, default_offset, non_default_offset) in records {
        buf = buf
            .push(Uint24::new(selector))
            .push(default_offset)
            .push(non_default_offset);
    }
    buf.push_bytes(&tables).into_vec()
}

/// A format 6 subtable; tecken treats the format as unsupported.
pub fn cmap6_subtable() -> Vec<u8> {
    BeBuffer::new()
        .push(6u16) // format
        .push(14u16) // length
        .push(0u16) // language
        .push(0x41u16) // firstCode
        .push(2u16) // entryCount
        .extend([1u16, 2u16])
        .into_vec()
}

fn head(loca_format: LocaFormat) -> Vec<u8> {
    BeBuffer::new()
        .push(0x00010000u32) // version
        .push(0x00010000u32) // fontRevision
        .push(0u32) // checkSumAdjustment
        .push(0x5F0F3CF5u32) // magicNumber
        .push(0x0003u16) // flags
        .push(1000u16) // unitsPerEm
        .push(0i64) // created
        .push(0i64) // modified
        .push(0i16) // xMin
        .push(0i16) // yMin
        .push(600i16) // xMax
        .push(800i16) // yMax
        .push(0u16) // macStyle
        .push(8u16) // lowestRecPPEM
        .push(2i16) // fontDirectionHint
        .push(match loca_format {
            LocaFormat::Short => 0i16,
            LocaFormat::Long => 1i16,
        })
        .push(0i16) // glyphDataFormat
        .into_vec()
}

fn hhea(num_glyphs: u16) -> Vec<u8> {
    BeBuffer::new()
        .push(0x00010000u32) // version
        .push(800i16) // ascender
        .push(-200i16) // descender
        .push(0i16) // lineGap
        .push(600u16) // advanceWidthMax
        .push(50i16) // minLeftSideBearing
        .push(50i16) // minRightSideBearing
        .push(550i16) // xMaxExtent
        .push(1i16) // caretSlopeRise
        .push(0i16) // caretSlopeRun
        .push(0i16) // caretOffset
        .extend([0i16; 4]) // reserved
        .push(0i16) // metricDataFormat
        .push(num_glyphs) // numberOfHMetrics
        .into_vec()
}

fn hmtx(num_glyphs: u16) -> Vec<u8> {
    let mut buf = BeBuffer::new();
    for _ in 0..num_glyphs {
        buf = buf.push(600u16).push(50i16);
    }
    buf.into_vec()
}

fn maxp(num_glyphs: u16) -> Vec<u8> {
    BeBuffer::new()
        .push(0x00010000u32) // version
        .push(num_glyphs)
        .push(4u16) // maxPoints
        .push(1u16) // maxContours
        .push(4u16) // maxCompositePoints
        .push(1u16) // maxCompositeContours
        .push(2u16) // maxZones
        .push(0u16) // maxTwilightPoints
        .push(0u16) // maxStorage
        .push(0u16) // maxFunctionDefs
        .push(0u16) // maxInstructionDefs
        .push(0u16) // maxStackElements
        .push(0u16) // maxSizeOfInstructions
        .push(1u16) // maxComponentElements
        .push(1u16) // maxComponentDepth
        .into_vec()
}

fn post() -> Vec<u8> {
    BeBuffer::new()
        .push(0x00030000u32) // version 3.0
        .push(0i32) // italicAngle
        .push(-75i16) // underlinePosition
        .push(50i16) // underlineThickness
        .push(0u32) // isFixedPitch
        .extend([0u32; 4]) // memory hints
        .into_vec()
}

/// Latin coverage: A-Z on gids 1-26, U+3042 on 27, and a composite U+00C5
/// built from the 'A' glyph on gid 28.
pub fn basic_font() -> Vec<u8> {
    TestFont::new()
        .map_range('A' as u32, 1, 26)
        .map(0x3042, 27)
        .map(0xC5, 28)
        .composite(28, 1)
        .family_name("Tecken Sans")
        .build()
}

/// CJK coverage with two non-default variation sequences on U+4E00 and a
/// default sequence entry on U+4E01.
pub fn variant_font() -> Vec<u8> {
    TestFont::new()
        .map(0x4E00, 1)
        .map(0x4E01, 2)
        .variant(0x4E00, 0xE0100, 3)
        .variant(0x4E00, 0xE0101, 4)
        .default_variant(0x4E01, 0xE0100)
        .family_name("Tecken Mincho")
        .build()
}

/// A font whose name table has no Windows Unicode family record.
pub fn no_family_name_font() -> Vec<u8> {
    TestFont::new()
        .map(0x41, 1)
        .mac_names_only()
        .build()
}

/// A font carrying a format 6 subtable next to its format 12 one.
pub fn unsupported_subtable_font() -> Vec<u8> {
    TestFont::new()
        .map(0x41, 1)
        .extra_cmap_subtable(3, 1, cmap6_subtable())
        .family_name("Tecken Sans")
        .build()
}

/// A format 14 subtable whose second sequence names a glyph past the end of
/// the glyph count.
pub fn unresolved_variant_font() -> Vec<u8> {
    TestFont::new()
        .map(0x4E00, 1)
        .variant(0x4E00, 0xE0100, 2)
        .variant(0x4E00, 0xE0101, 900)
        .num_glyphs(3)
        .family_name("Tecken Mincho")
        .build()
}
