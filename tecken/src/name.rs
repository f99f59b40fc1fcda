//! Family name extraction and the name table rebuild for a subset.

use write_fonts::from_obj::FromTableRef;
use write_fonts::read::{tables::name::Name as ReadName, FontRef, TableProvider, TopLevelTable};
use write_fonts::tables::name::Name;
use write_fonts::types::NameId;
use write_fonts::{dump_table, FontBuilder};

use crate::Error;

/// Windows platform, Unicode BMP encoding, en-US: the record downstream
/// stylesheet deduplication keys on.
const WINDOWS_PLATFORM: u16 = 3;
const UNICODE_BMP_ENCODING: u16 = 1;
const EN_US: u16 = 0x409;

/// The font's family name, taken from the Windows Unicode en-US record.
///
/// A font without that record is a fatal
/// [`MissingFamilyName`](Error::MissingFamilyName).
pub fn family_name(font: &FontRef) -> Result<String, Error> {
    let name = font.name().map_err(|_| Error::MissingFamilyName)?;
    for record in name.name_record() {
        if record.platform_id() == WINDOWS_PLATFORM
            && record.encoding_id() == UNICODE_BMP_ENCODING
            && record.language_id() == EN_US
            && record.name_id() == NameId::FAMILY_NAME
        {
            let string = record
                .string(name.string_data())
                .map_err(|_| Error::MissingFamilyName)?;
            return Ok(string.chars().collect());
        }
    }
    Err(Error::MissingFamilyName)
}

/// Carry the name table into the subset: verbatim, or with the family name
/// string replaced in every family-name record.
pub(crate) fn rebuild(
    font: &FontRef,
    family_override: Option<&str>,
    builder: &mut FontBuilder,
) -> Result<(), Error> {
    let data = font
        .table_data(ReadName::TAG)
        .ok_or(Error::MissingFamilyName)?;
    let Some(family) = family_override else {
        builder.add_raw(ReadName::TAG, data.as_bytes().to_vec());
        return Ok(());
    };

    let read_name = font.name().map_err(|_| Error::MissingFamilyName)?;
    let mut name = Name::from_table_ref(&read_name);
    for record in name.name_record.iter_mut() {
        if record.name_id == NameId::FAMILY_NAME {
            record.string = family.to_string().into();
        }
    }
    name.name_record.sort();
    let bytes = dump_table(&name).map_err(|_| Error::RebuildTable(ReadName::TAG))?;
    builder.add_raw(ReadName::TAG, bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_windows_family_record() {
        let font_bytes = tecken_test_fonts::basic_font();
        let font = FontRef::new(&font_bytes).unwrap();
        assert_eq!(family_name(&font).unwrap(), "Tecken Sans");
    }

    #[test]
    fn mac_only_names_are_missing() {
        let font_bytes = tecken_test_fonts::no_family_name_font();
        let font = FontRef::new(&font_bytes).unwrap();
        assert!(matches!(
            family_name(&font),
            Err(Error::MissingFamilyName)
        ));
    }

    #[test]
    fn override_replaces_only_family_strings() {
        let font_bytes = tecken_test_fonts::basic_font();
        let font = FontRef::new(&font_bytes).unwrap();

        let mut builder = FontBuilder::default();
        rebuild(&font, Some("Tecken Sans Subset"), &mut builder).unwrap();
        let rebuilt = builder.build();
        let rebuilt = FontRef::new(&rebuilt).unwrap();
        assert_eq!(family_name(&rebuilt).unwrap(), "Tecken Sans Subset");

        // the subfamily record is untouched
        let name = rebuilt.name().unwrap();
        let subfamily = name
            .name_record()
            .iter()
            .find(|record| record.name_id() == NameId::SUBFAMILY_NAME)
            .unwrap();
        let string: String = subfamily.string(name.string_data()).unwrap().chars().collect();
        assert_eq!(string, "Regular");
    }
}
