//! Field rules and value-level checks.
//!
//! A [`FieldRules`] is a declarative taxonomy, one per entity kind, that the
//! validator interprets against a normalized row. The small parsing helpers
//! here (dates, 96-well labels, yes/no flags) are also used by the entity
//! builder so both layers agree on what a legal value is.

use chrono::NaiveDate;

/// External day/month/year representation of every date column.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Legal submitter plate prefixes. `OUT` marks plates whose material was
/// sequenced externally (no concentration recorded in-house).
pub const PLATE_PREFIXES: [&str; 2] = ["EXT", "OUT"];
pub const EXTERNAL_PLATE_PREFIX: &str = "OUT";

pub const EXTRACTION_FROM_VALUES: [&str; 2] = ["whole_sample", "cultured_isolate"];
pub const SEQUENCING_TYPES: [&str; 2] = ["nanopore", "illumina"];
pub const PCR_RESULTS: [&str; 6] = [
    "Negative",
    "Negative - Followup",
    "Positive - Followup",
    "Positive",
    "Indeterminate",
    "Not Done",
];

/// Field required unless `unless_field` starts with one of the prefixes.
#[derive(Debug, Clone)]
pub struct RequiredUnlessPrefix {
    pub field: &'static str,
    pub unless_field: &'static str,
    pub unless_prefixes: &'static [&'static str],
}

/// Field required when `when_field` equals `equals`.
#[derive(Debug, Clone)]
pub struct RequiredWhen {
    pub field: &'static str,
    pub when_field: &'static str,
    pub equals: &'static str,
}

/// Enumerated legal values for a categorical field.
#[derive(Debug, Clone)]
pub struct EnumField {
    pub field: &'static str,
    pub allowed: &'static [&'static str],
}

/// Identifier prefix constraint.
#[derive(Debug, Clone)]
pub struct PrefixField {
    pub field: &'static str,
    pub prefixes: &'static [&'static str],
}

/// Declarative validation rules for one entity kind.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    pub required: Vec<&'static str>,
    pub optional: Vec<&'static str>,
    pub required_unless_prefix: Vec<RequiredUnlessPrefix>,
    pub required_when: Vec<RequiredWhen>,
    pub enums: Vec<EnumField>,
    pub prefixes: Vec<PrefixField>,
    /// 96-well plate labels (rows A-H, columns 1-12).
    pub wells: Vec<&'static str>,
    /// Day/month/year date fields.
    pub dates: Vec<&'static str>,
    /// f64 fields (concentrations, coordinates, scores).
    pub numerics: Vec<&'static str>,
    /// u32 fields (cycle counts, read counts).
    pub counts: Vec<&'static str>,
    /// Mutually-defining pair: all blank means the row legitimately has no
    /// record of this kind (Skip); a partial blank is Invalid.
    pub skip_when_blank: Vec<&'static str>,
    /// Exactly one of these field groups must be fully present.
    pub one_of: Vec<Vec<&'static str>>,
}

impl FieldRules {
    /// Every field the rules mention, for header diagnostics.
    pub fn known_fields(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        out.extend(&self.required);
        out.extend(&self.optional);
        out.extend(self.required_unless_prefix.iter().map(|r| r.field));
        out.extend(self.required_when.iter().map(|r| r.field));
        out.extend(&self.skip_when_blank);
        for group in &self.one_of {
            out.extend(group);
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Parse a day/month/year date into its canonical ISO form.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| format!("`{value}` is not a {DATE_FORMAT} date"))
}

/// Canonical stored form of a date: ISO `YYYY-MM-DD`, so lexicographic
/// equality is date equality.
pub fn canonical_date(value: &str) -> Result<String, String> {
    Ok(parse_date(value)?.format("%Y-%m-%d").to_string())
}

/// 96-well grid membership: rows A-H, columns 1-12. A leading zero on the
/// column is tolerated (`A1` and `A01` name the same well).
pub fn well_label_ok(label: &str) -> bool {
    let mut chars = label.chars();
    let Some(row) = chars.next() else {
        return false;
    };
    if !('A'..='H').contains(&row) {
        return false;
    }
    let column = chars.as_str();
    if column.is_empty() || column.len() > 2 {
        return false;
    }
    match column.parse::<u8>() {
        Ok(n) => (1..=12).contains(&n),
        Err(_) => false,
    }
}

/// Truthy spellings accepted for request flags like submitted_for_sequencing.
pub fn is_yes(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1"
    )
}
