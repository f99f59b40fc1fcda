//! Parsing the character-set inputs accepted at the tool boundary.

use std::collections::BTreeSet;

use write_fonts::read::collections::IntSet;

use crate::{is_variation_selector, Error, VariationSequence};

const MAX_CODEPOINT: u32 = 0x10FFFF;

/// Parse a comma/whitespace-separated list of Unicode codepoints or ranges
/// as hex numbers, optionally prefixed with `U+` or `0x`. For example
/// `--unicodes=41-5a,61-7a` adds the ASCII letters, as does the more verbose
/// `--unicodes=U+0041-005A,U+0061-007A`. The special string `*` selects
/// every character the font maps.
pub fn parse_unicodes(input: &str) -> Result<IntSet<u32>, Error> {
    if input.trim() == "*" {
        return Ok(IntSet::all());
    }
    let mut result = IntSet::empty();
    for token in input
        .split([',', ';', ' ', '\t'])
        .filter(|token| !token.is_empty())
    {
        if let Some((start, end)) = token.split_once('-') {
            let start = parse_codepoint(start)?;
            let end = parse_codepoint(end)?;
            if start > end {
                return Err(Error::InvalidUnicodeRange { start, end });
            }
            result.extend(start..=end);
        } else {
            result.insert(parse_codepoint(token)?);
        }
    }
    Ok(result)
}

/// Parse a comma/whitespace-separated list of `base:selector` hex pairs,
/// e.g. `4E00:E0100,4E00:E0101`.
pub fn parse_sequences(input: &str) -> Result<BTreeSet<VariationSequence>, Error> {
    let mut result = BTreeSet::new();
    for token in input
        .split([',', ';', ' ', '\t'])
        .filter(|token| !token.is_empty())
    {
        let Some((base, selector)) = token.split_once(':') else {
            return Err(Error::InvalidSequence(token.to_string()));
        };
        let base = parse_codepoint(base)?;
        let selector = parse_codepoint(selector)?;
        if !is_variation_selector(selector) {
            return Err(Error::InvalidSequence(token.to_string()));
        }
        result.insert(VariationSequence::new(base, selector));
    }
    Ok(result)
}

fn parse_codepoint(token: &str) -> Result<u32, Error> {
    let hex = token
        .trim()
        .trim_start_matches("U+")
        .trim_start_matches("u+")
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let value =
        u32::from_str_radix(hex, 16).map_err(|_| Error::InvalidUnicode(token.to_string()))?;
    if value > MAX_CODEPOINT {
        return Err(Error::InvalidUnicode(token.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lists_and_ranges() {
        let set = parse_unicodes("61 62,63").unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains(0x61_u32));
        assert!(set.contains(0x63_u32));

        let set = parse_unicodes("u+61,U+65-67").unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.contains(0x61_u32));
        assert!(set.contains(0x65_u32));
        assert!(set.contains(0x67_u32));

        assert!(parse_unicodes("*").unwrap().contains(0x10FFFF_u32));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            parse_unicodes("zz"),
            Err(Error::InvalidUnicode(_))
        ));
        assert!(matches!(
            parse_unicodes("5A-41"),
            Err(Error::InvalidUnicodeRange { start: 0x5A, end: 0x41 })
        ));
        assert!(matches!(
            parse_unicodes("110000"),
            Err(Error::InvalidUnicode(_))
        ));
    }

    #[test]
    fn parses_sequences() {
        let set = parse_sequences("4E00:E0100, 4E00:E0101").unwrap();
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec![
                VariationSequence::new(0x4E00, 0xE0100),
                VariationSequence::new(0x4E00, 0xE0101),
            ]
        );
    }

    #[test]
    fn sequence_selector_must_be_a_selector() {
        assert!(matches!(
            parse_sequences("4E00:42"),
            Err(Error::InvalidSequence(_))
        ));
        assert!(matches!(
            parse_sequences("4E00-E0100"),
            Err(Error::InvalidSequence(_))
        ));
    }
}
