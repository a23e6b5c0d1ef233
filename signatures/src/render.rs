//! Plain-text projections of the signature list, for pasting straight into
//! a static site. Anonymous records are left out of both formats.

use crate::types::MergedRecord;

const TITLE_FIELD: &str = "Title";
const AFFILIATION_FIELD: &str = "Professional_Affiliation";

/// One display name per line.
pub fn simple_list(records: &[MergedRecord]) -> String {
    records
        .iter()
        .map(MergedRecord::display_name)
        .filter(|name| name != MergedRecord::ANONYMOUS)
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per signer: name, then title and affiliation when known, then
/// the location in parentheses.
pub fn detailed_list(records: &[MergedRecord]) -> String {
    records
        .iter()
        .filter_map(detailed_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn detailed_line(record: &MergedRecord) -> Option<String> {
    let name = record.display_name();
    if name == MergedRecord::ANONYMOUS {
        return None;
    }

    let mut line = name;
    for field in [TITLE_FIELD, AFFILIATION_FIELD] {
        if let Some(value) = record.custom_field(field)
            && !value.is_empty()
        {
            line.push_str(", ");
            line.push_str(value);
        }
    }

    let location = record.location();
    if !location.is_empty() {
        line.push_str(&format!(" ({location})"));
    }

    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostalAddress;
    use serde_json::json;

    fn record(given: &str, family: &str) -> MergedRecord {
        MergedRecord {
            given_name: Some(given.into()),
            family_name: Some(family.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_list_skips_anonymous() {
        let records = vec![
            record("Ada", "Lovelace"),
            MergedRecord::default(),
            record("Grace", "Hopper"),
        ];

        assert_eq!(simple_list(&records), "Ada Lovelace\nGrace Hopper");
    }

    #[test]
    fn test_detailed_list_formats_titles_and_location() {
        let mut ada = record("Ada", "Lovelace");
        ada.custom_fields.insert(TITLE_FIELD.into(), json!("Countess"));
        ada.custom_fields
            .insert(AFFILIATION_FIELD.into(), json!("Analytical Engine Society"));
        ada.postal_addresses.push(PostalAddress {
            locality: Some("London".into()),
            region: None,
        });

        let mut grace = record("Grace", "Hopper");
        grace.custom_fields.insert(TITLE_FIELD.into(), json!("Rear Admiral"));

        let plain = record("Katherine", "Johnson");

        let rendered = detailed_list(&[ada, grace, plain]);
        assert_eq!(
            rendered,
            "Ada Lovelace, Countess, Analytical Engine Society (London)\n\
             Grace Hopper, Rear Admiral\n\
             Katherine Johnson"
        );
    }

    #[test]
    fn test_empty_custom_field_values_are_ignored() {
        let mut rec = record("Ada", "Lovelace");
        rec.custom_fields.insert(TITLE_FIELD.into(), json!(""));

        assert_eq!(detailed_list(&[rec]), "Ada Lovelace");
    }
}
