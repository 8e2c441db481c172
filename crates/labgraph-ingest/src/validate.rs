//! Field validation.
//!
//! Interprets a kind's declarative [`FieldRules`] against one normalized
//! row. The outcome is tri-state: Complete (proceed), Skip (the row
//! legitimately has no record of this kind), or Invalid (fatal; the batch
//! ingestor aborts the batch).

use crate::normalize::Row;
use labgraph_schema::fields::{is_yes, parse_date, well_label_ok, FieldRules};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Skip,
    Invalid(String),
}

pub fn validate(rules: &FieldRules, row: &Row) -> Outcome {
    // Mutually-defining pair: all blank means "no record of this kind";
    // a partial blank is an error, never a skip.
    if !rules.skip_when_blank.is_empty() {
        let present: Vec<&str> = rules
            .skip_when_blank
            .iter()
            .copied()
            .filter(|f| row.get(f).is_some())
            .collect();
        if present.is_empty() {
            return Outcome::Skip;
        }
        if present.len() < rules.skip_when_blank.len() {
            let missing: Vec<&str> = rules
                .skip_when_blank
                .iter()
                .copied()
                .filter(|f| row.get(f).is_none())
                .collect();
            return Outcome::Invalid(format!(
                "fields {present:?} are set but {missing:?} are blank; \
                 provide all of them or none"
            ));
        }
    }

    for field in &rules.required {
        if row.get(field).is_none() {
            return Outcome::Invalid(format!("required field `{field}` is missing or empty"));
        }
    }

    for rule in &rules.required_when {
        let active = row.get(rule.when_field) == Some(rule.equals);
        if active && row.get(rule.field).is_none() {
            return Outcome::Invalid(format!(
                "`{}` is required when `{}` is `{}`",
                rule.field, rule.when_field, rule.equals
            ));
        }
    }

    for rule in &rules.required_unless_prefix {
        let exempt = row
            .get(rule.unless_field)
            .is_some_and(|v| rule.unless_prefixes.iter().any(|p| v.starts_with(p)));
        if !exempt && row.get(rule.field).is_none() {
            return Outcome::Invalid(format!(
                "`{}` is required unless `{}` starts with one of {:?}",
                rule.field, rule.unless_field, rule.unless_prefixes
            ));
        }
    }

    for rule in &rules.enums {
        if let Some(value) = row.get(rule.field) {
            if !rule.allowed.contains(&value) {
                return Outcome::Invalid(format!(
                    "`{}` has illegal value `{value}`; allowed: {:?}",
                    rule.field, rule.allowed
                ));
            }
        }
    }

    for rule in &rules.prefixes {
        if let Some(value) = row.get(rule.field) {
            if !rule.prefixes.iter().any(|p| value.starts_with(p)) {
                return Outcome::Invalid(format!(
                    "`{}` value `{value}` must start with one of {:?}",
                    rule.field, rule.prefixes
                ));
            }
        }
    }

    for field in &rules.wells {
        if let Some(value) = row.get(field) {
            if !well_label_ok(value) {
                return Outcome::Invalid(format!(
                    "`{field}` value `{value}` is not a 96-well label (A1..H12)"
                ));
            }
        }
    }

    for field in &rules.dates {
        if let Some(value) = row.get(field) {
            if let Err(reason) = parse_date(value) {
                return Outcome::Invalid(format!("`{field}`: {reason}"));
            }
        }
    }

    for field in &rules.numerics {
        if let Some(value) = row.get(field) {
            if value.parse::<f64>().is_err() {
                return Outcome::Invalid(format!("`{field}` value `{value}` is not a number"));
            }
        }
    }

    for field in &rules.counts {
        if let Some(value) = row.get(field) {
            if value.parse::<u32>().is_err() {
                return Outcome::Invalid(format!("`{field}` value `{value}` is not a count"));
            }
        }
    }

    if !rules.one_of.is_empty() {
        let full: Vec<&Vec<&str>> = rules
            .one_of
            .iter()
            .filter(|group| group.iter().all(|f| row.get(f).is_some()))
            .collect();
        let partial: Vec<&Vec<&str>> = rules
            .one_of
            .iter()
            .filter(|group| {
                let present = group.iter().filter(|f| row.get(f).is_some()).count();
                present > 0 && present < group.len()
            })
            .collect();
        if !partial.is_empty() {
            return Outcome::Invalid(format!(
                "fields {:?} must be provided together",
                partial[0]
            ));
        }
        if full.len() != 1 {
            return Outcome::Invalid(format!(
                "exactly one of {:?} must be provided",
                rules.one_of
            ));
        }
    }

    Outcome::Complete
}

/// Truthy request flags share one spelling set with the builder.
pub fn flag_requested(row: &Row, field: &str) -> bool {
    row.get(field).is_some_and(is_yes)
}
