//! The character→font priority index and its on-disk table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use write_fonts::read::{collections::IntSet, FontRef};

use crate::{coverage, name, woff2, Error, VariationSequence, Warning};

const HEADER: &str = "Character,Font File";
const DEFAULT_TABLE: &str = "default";

/// One font's identity and coverage, parsed once per run.
pub struct FontRecord {
    pub id: String,
    pub family_name: String,
    pub codepoints: IntSet<u32>,
    pub sequences: BTreeSet<VariationSequence>,
}

impl FontRecord {
    /// Parse a font container into an immutable record.
    pub fn read(id: impl Into<String>, container: &[u8]) -> Result<(Self, Vec<Warning>), Error> {
        let sfnt = woff2::ensure_sfnt(container)?;
        let font = FontRef::new(&sfnt)?;
        let family_name = name::family_name(&font)?;
        let coverage = coverage::char_maps(&font)?.into_coverage();
        Ok((
            FontRecord {
                id: id.into(),
                family_name,
                codepoints: coverage.codepoints,
                sequences: coverage.sequences,
            },
            coverage.warnings,
        ))
    }
}

/// A lookup key: a plain character and a variation sequence never shadow
/// each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Codepoint(u32),
    Sequence(u32, u32),
}

/// First-wins mapping from character (or sequence) to the font that renders
/// it. Entries are fixed at build time and never overwritten.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CharacterIndex {
    entries: BTreeMap<IndexKey, String>,
}

impl CharacterIndex {
    /// Merge per-font coverage in caller order: the first font offering a
    /// key wins. Must run as a single pass over completed records.
    pub fn build(fonts: &[FontRecord]) -> Self {
        let mut entries = BTreeMap::new();
        for font in fonts {
            for codepoint in font.codepoints.iter() {
                entries
                    .entry(IndexKey::Codepoint(codepoint))
                    .or_insert_with(|| font.id.clone());
            }
            for sequence in &font.sequences {
                entries
                    .entry(IndexKey::Sequence(sequence.base, sequence.selector))
                    .or_insert_with(|| font.id.clone());
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &IndexKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// A miss is an unmapped character, not an error.
    pub fn font_for_codepoint(&self, codepoint: u32) -> Option<&str> {
        self.get(&IndexKey::Codepoint(codepoint))
    }

    pub fn font_for_sequence(&self, sequence: &VariationSequence) -> Option<&str> {
        self.get(&IndexKey::Sequence(sequence.base, sequence.selector))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, &str)> {
        self.entries.iter().map(|(key, font)| (key, font.as_str()))
    }

    /// Render the plain-text table: a header row, then one row per key with
    /// the literal character (or base+selector pair) and the font id.
    pub fn to_table(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 16);
        out.push_str(HEADER);
        out.push('\n');
        for (key, font) in &self.entries {
            let Some(field) = key_field(key) else {
                continue;
            };
            let _ = writeln!(out, "{},{}", quote(&field), quote(font));
        }
        out
    }

    /// Write the table in one shot, after all per-font results are merged.
    pub fn write_to_file(&self, path: &Path) -> Result<(), Error> {
        fs::write(path, self.to_table())?;
        Ok(())
    }

    /// Reload a persisted table. Row order carries no meaning; priority was
    /// fixed at build time.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut lines = text.lines();
        match lines.next() {
            Some(header) if header.replace(' ', "").trim_end() == HEADER.replace(' ', "") => {}
            _ => return Err(Error::MalformedIndexTable("missing header row".into())),
        }
        let mut entries = BTreeMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (key, font) = parse_row(line)?;
            entries.entry(key).or_insert(font);
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Resolve the index table for a grouping: each key in order, then the
    /// always-present default table. No table at all is fatal.
    pub fn load_with_fallback(dir: &Path, keys: &[&str]) -> Result<(Self, PathBuf), Error> {
        for key in keys.iter().copied().chain([DEFAULT_TABLE]) {
            let path = dir.join(format!("{key}.csv"));
            if path.is_file() {
                return Ok((Self::load(&path)?, path));
            }
        }
        Err(Error::IndexTableNotFound(dir.to_path_buf()))
    }
}

/// The literal character(s) of a key; `None` if it cannot survive a
/// line-oriented text table.
fn key_field(key: &IndexKey) -> Option<String> {
    let field: String = match key {
        IndexKey::Codepoint(codepoint) => char::from_u32(*codepoint)?.into(),
        IndexKey::Sequence(base, selector) => {
            [char::from_u32(*base)?, char::from_u32(*selector)?]
                .iter()
                .collect()
        }
    };
    if field.chars().any(|c| c == '\n' || c == '\r') {
        return None;
    }
    Some(field)
}

fn quote(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn parse_row(line: &str) -> Result<(IndexKey, String), Error> {
    let (first, rest) = parse_field(line)?;
    let rest = rest
        .strip_prefix(',')
        .ok_or_else(|| Error::MalformedIndexTable(format!("expected two fields in '{line}'")))?;
    let (second, rest) = parse_field(rest)?;
    if !rest.is_empty() {
        return Err(Error::MalformedIndexTable(format!(
            "trailing data in '{line}'"
        )));
    }

    let chars: Vec<char> = first.chars().collect();
    let key = match chars.as_slice() {
        [c] => IndexKey::Codepoint(*c as u32),
        [base, selector] => IndexKey::Sequence(*base as u32, *selector as u32),
        _ => {
            return Err(Error::MalformedIndexTable(format!(
                "key '{first}' is neither a character nor a sequence"
            )))
        }
    };
    Ok((key, second))
}

/// Read one field, plain or quoted with doubled inner quotes.
fn parse_field(input: &str) -> Result<(String, &str), Error> {
    let Some(rest) = input.strip_prefix('"') else {
        return match input.find(',') {
            Some(i) => Ok((input[..i].to_string(), &input[i..])),
            None => Ok((input.to_string(), "")),
        };
    };
    let mut out = String::new();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < rest.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                out.push('"');
                i += 2;
            } else {
                return Ok((out, &rest[i + 1..]));
            }
        } else {
            let c = rest[i..].chars().next().unwrap();
            out.push(c);
            i += c.len_utf8();
        }
    }
    Err(Error::MalformedIndexTable(format!(
        "unterminated quoted field in '{input}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, codepoints: &[u32], sequences: &[(u32, u32)]) -> FontRecord {
        FontRecord {
            id: id.to_string(),
            family_name: id.to_string(),
            codepoints: codepoints.iter().copied().collect(),
            sequences: sequences
                .iter()
                .map(|(base, selector)| VariationSequence::new(*base, *selector))
                .collect(),
        }
    }

    #[test]
    fn first_font_wins() {
        let a = record("a.ttf", &[0x3042, 0x41], &[]);
        let b = record("b.ttf", &[0x3042, 0x42], &[]);
        let index = CharacterIndex::build(&[a, b]);
        assert_eq!(index.font_for_codepoint(0x3042), Some("a.ttf"));
        assert_eq!(index.font_for_codepoint(0x41), Some("a.ttf"));
        assert_eq!(index.font_for_codepoint(0x42), Some("b.ttf"));
        assert_eq!(index.font_for_codepoint(0x43), None);
    }

    #[test]
    fn order_decides_not_file_listing() {
        let a = record("a.ttf", &[0x3042], &[]);
        let b = record("b.ttf", &[0x3042], &[]);
        let forward = CharacterIndex::build(&[a, b]);
        assert_eq!(forward.font_for_codepoint(0x3042), Some("a.ttf"));

        let a = record("a.ttf", &[0x3042], &[]);
        let b = record("b.ttf", &[0x3042], &[]);
        let reversed = CharacterIndex::build(&[b, a]);
        assert_eq!(reversed.font_for_codepoint(0x3042), Some("b.ttf"));
    }

    #[test]
    fn sequences_and_codepoints_never_shadow() {
        let a = record("a.ttf", &[], &[(0x4E00, 0xE0100)]);
        let b = record("b.ttf", &[0x4E00], &[]);
        let index = CharacterIndex::build(&[a, b]);
        assert_eq!(
            index.font_for_sequence(&VariationSequence::new(0x4E00, 0xE0100)),
            Some("a.ttf")
        );
        // the bare base codepoint resolves independently
        assert_eq!(index.font_for_codepoint(0x4E00), Some("b.ttf"));
        assert_eq!(
            index.font_for_sequence(&VariationSequence::new(0x4E00, 0xE0101)),
            None
        );
    }

    #[test]
    fn table_round_trip() {
        let font = record(
            "cjk.ttf",
            &[0x41, 0x2C, 0x22, 0x3042], // includes ',' and '"'
            &[(0x4E00, 0xE0100)],
        );
        let index = CharacterIndex::build(&[font]);
        let table = index.to_table();
        assert!(table.starts_with("Character,Font File\n"));
        let reloaded = CharacterIndex::parse(&table).unwrap();
        assert_eq!(reloaded, index);
        assert_eq!(reloaded.font_for_codepoint(0x2C), Some("cjk.ttf"));
        assert_eq!(reloaded.font_for_codepoint(0x22), Some("cjk.ttf"));
        assert_eq!(
            reloaded.font_for_sequence(&VariationSequence::new(0x4E00, 0xE0100)),
            Some("cjk.ttf")
        );
    }

    #[test]
    fn reload_from_disk_matches_build() {
        let dir = tempfile::tempdir().unwrap();
        let font = record("a.ttf", &[0x41, 0x42], &[]);
        let index = CharacterIndex::build(&[font]);
        let path = dir.path().join("default.csv");
        index.write_to_file(&path).unwrap();

        let (loaded, used) = CharacterIndex::load_with_fallback(dir.path(), &["missing"]).unwrap();
        assert_eq!(used, path);
        assert_eq!(loaded, index);
    }

    #[test]
    fn fallback_prefers_specific_tables() {
        let dir = tempfile::tempdir().unwrap();
        let h1 = CharacterIndex::build(&[record("h1.ttf", &[0x41], &[])]);
        let default = CharacterIndex::build(&[record("default.ttf", &[0x41], &[])]);
        h1.write_to_file(&dir.path().join("h1.csv")).unwrap();
        default.write_to_file(&dir.path().join("default.csv")).unwrap();

        let (loaded, _) = CharacterIndex::load_with_fallback(dir.path(), &["h1"]).unwrap();
        assert_eq!(loaded.font_for_codepoint(0x41), Some("h1.ttf"));
        let (loaded, _) = CharacterIndex::load_with_fallback(dir.path(), &["h2"]).unwrap();
        assert_eq!(loaded.font_for_codepoint(0x41), Some("default.ttf"));
    }

    #[test]
    fn no_table_at_all_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CharacterIndex::load_with_fallback(dir.path(), &["h1"]),
            Err(Error::IndexTableNotFound(_))
        ));
    }

    #[test]
    fn header_is_required() {
        assert!(matches!(
            CharacterIndex::parse("A,a.ttf\n"),
            Err(Error::MalformedIndexTable(_))
        ));
    }
}
