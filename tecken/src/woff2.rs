//! The WOFF2 transport container used for embedding.
//!
//! Compression always applies the null preprocessing transform (glyf and
//! loca carry transform version 3), which every conforming decoder accepts.
//! Decompression reassembles an sfnt from the stored tables; tables written
//! by other encoders with a non-null transform are omitted rather than
//! reconstructed, since the character-mapping and metadata tables needed for
//! coverage extraction are never transformed.

use std::borrow::Cow;
use std::io::{Read, Write};

use brotlic::{CompressorWriter, DecompressorReader};
use write_fonts::read::FontRef;
use write_fonts::types::Tag;
use write_fonts::FontBuilder;

use crate::Error;

const SIGNATURE: [u8; 4] = *b"wOF2";
const TTC_FLAVOR: [u8; 4] = *b"ttcf";
const HEADER_LEN: usize = 48;

const GLYF: Tag = Tag::new(b"glyf");
const LOCA: Tag = Tag::new(b"loca");

/// Transform version bits within a directory entry's flags byte.
const TRANSFORM_SHIFT: u8 = 6;
const NULL_TRANSFORM_GLYF_LOCA: u8 = 3;

/// Known table tags in flag-byte order; a flags value of 63 means the entry
/// carries an explicit tag instead.
#[rustfmt::skip]
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post",
    b"cvt ", b"fpgm", b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT",
    b"EBLC", b"gasp", b"hdmx", b"kern", b"LTSH", b"PCLT", b"VDMX", b"vhea",
    b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC", b"JSTF", b"MATH",
    b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar",
    b"gvar", b"hsty", b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop",
    b"trak", b"Zapf", b"Silf", b"Glat", b"Gloc", b"Feat", b"Sill",
];

/// Returns `true` if `bytes` starts with the WOFF2 signature.
pub fn is_woff2(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == SIGNATURE
}

/// Decompress `bytes` if it is a WOFF2 container, otherwise pass it through
/// as a raw table directory.
pub fn ensure_sfnt(bytes: &[u8]) -> Result<Cow<'_, [u8]>, Error> {
    if is_woff2(bytes) {
        decompress(bytes).map(Cow::Owned)
    } else {
        Ok(Cow::Borrowed(bytes))
    }
}

/// Re-encode an sfnt binary as a WOFF2 container.
pub fn compress(sfnt: &[u8]) -> Result<Vec<u8>, Error> {
    let font = FontRef::new(sfnt)?;
    let mut tables: Vec<(Tag, &[u8])> = font
        .table_directory
        .table_records()
        .iter()
        .map(|record| {
            let tag = record.tag();
            font.table_data(tag)
                .map(|data| (tag, data.as_bytes()))
                .ok_or_else(|| Error::MalformedContainer(format!("table '{tag}' out of bounds")))
        })
        .collect::<Result<_, _>>()?;

    // loca must sit directly behind glyf in the physical table order
    if let (Some(glyf_ix), Some(loca_ix)) = (
        tables.iter().position(|(tag, _)| *tag == GLYF),
        tables.iter().position(|(tag, _)| *tag == LOCA),
    ) {
        let loca = tables.remove(loca_ix);
        let glyf_ix = if loca_ix < glyf_ix { glyf_ix - 1 } else { glyf_ix };
        tables.insert(glyf_ix + 1, loca);
    }

    let mut directory = Vec::new();
    let mut uncompressed = Vec::new();
    for (tag, data) in &tables {
        let mut flags = match KNOWN_TAGS.iter().position(|known| *tag == **known) {
            Some(index) => index as u8,
            None => 63,
        };
        if *tag == GLYF || *tag == LOCA {
            flags |= NULL_TRANSFORM_GLYF_LOCA << TRANSFORM_SHIFT;
        }
        directory.push(flags);
        if flags & 0x3F == 63 {
            directory.extend_from_slice(tag.as_ref());
        }
        write_base128(&mut directory, data.len() as u32);
        uncompressed.extend_from_slice(data);
    }

    let mut encoder = CompressorWriter::new(Vec::new());
    encoder.write_all(&uncompressed)?;
    let compressed = encoder
        .into_inner()
        .map_err(|_| Error::TransportEncoding("flushing the Brotli encoder failed".into()))?;

    let num_tables = tables.len() as u16;
    let total_sfnt_size: u32 = 12
        + 16 * num_tables as u32
        + tables
            .iter()
            .map(|(_, data)| (data.len() as u32 + 3) & !3)
            .sum::<u32>();
    let length = (HEADER_LEN + directory.len() + compressed.len()) as u32;

    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(&SIGNATURE);
    out.extend_from_slice(&sfnt[..4]); // flavor
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // reserved
    out.extend_from_slice(&total_sfnt_size.to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // majorVersion
    out.extend_from_slice(&0u16.to_be_bytes()); // minorVersion
    out.extend_from_slice(&0u32.to_be_bytes()); // metaOffset
    out.extend_from_slice(&0u32.to_be_bytes()); // metaLength
    out.extend_from_slice(&0u32.to_be_bytes()); // metaOrigLength
    out.extend_from_slice(&0u32.to_be_bytes()); // privOffset
    out.extend_from_slice(&0u32.to_be_bytes()); // privLength
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decompress a WOFF2 container back into an sfnt binary.
pub fn decompress(woff2: &[u8]) -> Result<Vec<u8>, Error> {
    let mut reader = ByteReader::new(woff2);
    let signature = reader.bytes(4)?;
    if signature != SIGNATURE {
        return Err(Error::MalformedContainer("not a WOFF2 container".into()));
    }
    let flavor = reader.bytes(4)?;
    if flavor == TTC_FLAVOR {
        return Err(Error::MalformedContainer(
            "font collections are not supported".into(),
        ));
    }
    let _length = reader.u32()?;
    let num_tables = reader.u16()?;
    let _reserved = reader.u16()?;
    let _total_sfnt_size = reader.u32()?;
    let total_compressed_size = reader.u32()? as usize;
    // version fields and the metadata/private block offsets
    reader.bytes(HEADER_LEN - reader.pos)?;

    let mut entries = Vec::with_capacity(num_tables as usize);
    for _ in 0..num_tables {
        let flags = reader.u8()?;
        let tag_index = flags & 0x3F;
        let transform = (flags >> TRANSFORM_SHIFT) & 0x03;
        let tag = if tag_index == 63 {
            Tag::new(reader.bytes(4)?.try_into().unwrap())
        } else {
            Tag::new(KNOWN_TAGS[tag_index as usize])
        };
        let orig_length = reader.base128()?;
        let transformed = if tag == GLYF || tag == LOCA {
            transform != NULL_TRANSFORM_GLYF_LOCA
        } else {
            transform != 0
        };
        let stored_length = if transformed {
            reader.base128()?
        } else {
            orig_length
        };
        entries.push((tag, stored_length as usize, transformed));
    }

    let compressed = reader.bytes(total_compressed_size)?;
    let mut decoder = DecompressorReader::new(compressed);
    let mut stream = Vec::new();
    decoder
        .read_to_end(&mut stream)
        .map_err(|_| Error::MalformedContainer("invalid Brotli stream".into()))?;

    let expected: usize = entries.iter().map(|(_, len, _)| *len).sum();
    if stream.len() != expected {
        return Err(Error::MalformedContainer(
            "decompressed stream length does not match directory".into(),
        ));
    }

    let mut builder = FontBuilder::default();
    let mut offset = 0usize;
    for (tag, stored_length, transformed) in entries {
        let data = &stream[offset..offset + stored_length];
        offset += stored_length;
        if transformed {
            log::warn!("omitting transformed '{tag}' table from reassembled font");
            continue;
        }
        builder.add_raw(tag, data.to_vec());
    }
    Ok(builder.build())
}

fn write_base128(out: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 5];
    let mut n = 0;
    let mut value = value;
    loop {
        bytes[n] = (value & 0x7F) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let mut byte = bytes[i];
        if i != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let slice = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| Error::MalformedContainer("truncated WOFF2 container".into()))?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.bytes(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.bytes(4)?.try_into().unwrap()))
    }

    /// UIntBase128: 1-5 bytes, big-endian 7-bit groups, no leading zeros.
    fn base128(&mut self) -> Result<u32, Error> {
        let mut value: u32 = 0;
        for i in 0..5 {
            let byte = self.u8()?;
            if i == 0 && byte == 0x80 {
                return Err(Error::MalformedContainer("base128 leading zero".into()));
            }
            if value & 0xFE00_0000 != 0 {
                return Err(Error::MalformedContainer("base128 overflow".into()));
            }
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::MalformedContainer("base128 too long".into()))
    }
}
