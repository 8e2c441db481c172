//! Entity construction.
//!
//! Pure: copies the kind's declared fields off the validated row,
//! canonicalizes dates, and computes derived attributes. Never touches the
//! store and never decides whether to run; the batch ingestor calls it only
//! after a NotFound resolution.

use crate::normalize::Row;
use labgraph_schema::descriptor::{DerivedField, EntityDescriptor};
use labgraph_schema::fields::{canonical_date, is_yes};

pub fn build_attrs(desc: &EntityDescriptor, row: &Row) -> Result<Vec<(String, String)>, String> {
    let mut attrs: Vec<(String, String)> = Vec::new();

    for field in &desc.stored {
        let Some(raw) = row.get(field) else {
            continue;
        };
        let value = if desc.rules.dates.contains(field) {
            canonical_date(raw)?
        } else {
            raw.to_string()
        };
        attrs.push((field.to_string(), value));
    }

    for derived in &desc.derived {
        match derived {
            DerivedField::Compose { attr, fields, sep } => {
                let parts: Vec<&str> = fields.iter().filter_map(|f| row.get(f)).collect();
                if !parts.is_empty() {
                    attrs.push((attr.to_string(), parts.join(&sep.to_string())));
                }
            }
            DerivedField::YesNoFlag { attr, field } => {
                let value = row.get(field).is_some_and(is_yes);
                attrs.push((attr.to_string(), value.to_string()));
            }
            DerivedField::Technology { attr } => {
                let technology = if row.get("barcode").is_some() {
                    "nanopore"
                } else {
                    "illumina"
                };
                attrs.push((attr.to_string(), technology.to_string()));
            }
        }
    }

    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgraph_schema::descriptor::descriptor;
    use labgraph_schema::EntityKind;

    fn attrs_map(attrs: Vec<(String, String)>) -> std::collections::BTreeMap<String, String> {
        attrs.into_iter().collect()
    }

    #[test]
    fn copies_stored_fields_and_canonicalizes_dates() {
        let desc = descriptor(EntityKind::Culture, false).unwrap();
        let row = Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
                ("culture_identifier", "c1"),
                ("date_cultured", "20/01/2021"),
            ],
        );
        let attrs = attrs_map(build_attrs(&desc, &row).unwrap());
        assert_eq!(attrs.get("culture_identifier").unwrap(), "c1");
        assert_eq!(attrs.get("date_cultured").unwrap(), "2021-01-20");
        // Scope-only fields are not persisted on the entity.
        assert!(!attrs.contains_key("sample_identifier"));
        assert!(!attrs.contains_key("group_name"));
    }

    #[test]
    fn readset_derives_technology_and_display_name() {
        let desc = descriptor(EntityKind::ReadSet, false).unwrap();
        let row = Row::from_pairs(
            2,
            &[
                ("readset_batch_name", "rb1"),
                ("raw_sequencing_batch_name", "b1"),
                ("sample_identifier", "s1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
                ("extraction_identifier", "e1"),
                ("date_extracted", "01/02/2021"),
                ("extraction_from", "whole_sample"),
                ("barcode", "barcode07"),
            ],
        );
        let attrs = attrs_map(build_attrs(&desc, &row).unwrap());
        assert_eq!(attrs.get("technology").unwrap(), "nanopore");
        assert_eq!(attrs.get("readset_name").unwrap(), "rb1.s1.e1");
        assert_eq!(attrs.get("barcode").unwrap(), "barcode07");
    }

    #[test]
    fn sample_request_flag_defaults_to_false() {
        let desc = descriptor(EntityKind::Sample, false).unwrap();
        let row = Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("sample_source_identifier", "ss1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
            ],
        );
        let attrs = attrs_map(build_attrs(&desc, &row).unwrap());
        assert_eq!(attrs.get("submitted_for_sequencing").unwrap(), "false");

        let requested = row.with("submitted_for_sequencing", "Yes");
        let attrs = attrs_map(build_attrs(&desc, &requested).unwrap());
        assert_eq!(attrs.get("submitted_for_sequencing").unwrap(), "true");
    }
}
