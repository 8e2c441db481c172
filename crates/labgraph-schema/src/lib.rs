//! Declarative schema for the laboratory provenance graph.
//!
//! One [`descriptor::EntityDescriptor`] per entity kind carries everything
//! the generic ingestion loop needs:
//! - field rules (required / conditional / enumerated / well / date /
//!   numeric / skip pair / exactly-one-of),
//! - the scoped natural-key definition walked by the identity resolver,
//! - parent-link specs (fixed, row-discriminated tagged union, multi-valued
//!   list, or an explicit child-local key),
//! - the whitelist of after-the-fact updates,
//! - derived attributes computed by the entity builder.
//!
//! The engine interprets these descriptors; nothing in this crate touches
//! the store.

pub mod descriptor;
pub mod fields;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kinds of the provenance graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    Project,
    SampleSource,
    Sample,
    Culture,
    Extraction,
    TilingPcr,
    CovidConfirmatoryPcr,
    PcrAssay,
    PcrResult,
    RawSequencingBatch,
    RawSequencing,
    ReadSetBatch,
    ReadSet,
    ArticCovidResult,
    PangolinResult,
    MykrobeResult,
}

impl EntityKind {
    pub const ALL: [EntityKind; 17] = [
        EntityKind::Group,
        EntityKind::Project,
        EntityKind::SampleSource,
        EntityKind::Sample,
        EntityKind::Culture,
        EntityKind::Extraction,
        EntityKind::TilingPcr,
        EntityKind::CovidConfirmatoryPcr,
        EntityKind::PcrAssay,
        EntityKind::PcrResult,
        EntityKind::RawSequencingBatch,
        EntityKind::RawSequencing,
        EntityKind::ReadSetBatch,
        EntityKind::ReadSet,
        EntityKind::ArticCovidResult,
        EntityKind::PangolinResult,
        EntityKind::MykrobeResult,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Group => "group",
            EntityKind::Project => "project",
            EntityKind::SampleSource => "sample_source",
            EntityKind::Sample => "sample",
            EntityKind::Culture => "culture",
            EntityKind::Extraction => "extraction",
            EntityKind::TilingPcr => "tiling_pcr",
            EntityKind::CovidConfirmatoryPcr => "covid_confirmatory_pcr",
            EntityKind::PcrAssay => "pcr_assay",
            EntityKind::PcrResult => "pcr_result",
            EntityKind::RawSequencingBatch => "raw_sequencing_batch",
            EntityKind::RawSequencing => "raw_sequencing",
            EntityKind::ReadSetBatch => "readset_batch",
            EntityKind::ReadSet => "readset",
            EntityKind::ArticCovidResult => "artic_covid_result",
            EntityKind::PangolinResult => "pangolin_result",
            EntityKind::MykrobeResult => "mykrobe_result",
        }
    }

    /// Kinds an operator can load a file as. RawSequencing is implicit:
    /// created on demand during readset ingestion.
    pub fn loadable(self) -> bool {
        self != EntityKind::RawSequencing
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown entity kind `{s}`"))
    }
}

/// Relation kinds, child → parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelKind {
    /// Project → Group
    MemberOf,
    /// SampleSource → Project (one source can feed many projects)
    SourcedBy,
    /// Sample → SampleSource
    CollectedFrom,
    /// Culture → Sample
    CulturedFrom,
    /// Extraction → Sample (whole_sample) or Extraction → Culture (cultured_isolate)
    ExtractedFrom,
    /// TilingPcr / CovidConfirmatoryPcr → Extraction
    PcrOf,
    /// PcrResult → Sample
    ResultOfSample,
    /// PcrResult → PcrAssay
    ResultOfAssay,
    /// RawSequencing → RawSequencingBatch
    SequencedIn,
    /// RawSequencing → Extraction (standard) or RawSequencing → TilingPcr (covid)
    SequencingOf,
    /// ReadSetBatch → RawSequencingBatch
    BasecalledFrom,
    /// ReadSet → ReadSetBatch
    ReadsetIn,
    /// ReadSet → RawSequencing
    ReadsetOf,
    /// ArticCovidResult → ReadSet
    ArticOf,
    /// PangolinResult → ArticCovidResult
    PangolinOf,
    /// MykrobeResult → ReadSet
    MykrobeOf,
}

impl RelKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            RelKind::MemberOf => "member_of",
            RelKind::SourcedBy => "sourced_by",
            RelKind::CollectedFrom => "collected_from",
            RelKind::CulturedFrom => "cultured_from",
            RelKind::ExtractedFrom => "extracted_from",
            RelKind::PcrOf => "pcr_of",
            RelKind::ResultOfSample => "result_of_sample",
            RelKind::ResultOfAssay => "result_of_assay",
            RelKind::SequencedIn => "sequenced_in",
            RelKind::SequencingOf => "sequencing_of",
            RelKind::BasecalledFrom => "basecalled_from",
            RelKind::ReadsetIn => "readset_in",
            RelKind::ReadsetOf => "readset_of",
            RelKind::ArticOf => "artic_of",
            RelKind::PangolinOf => "pangolin_of",
            RelKind::MykrobeOf => "mykrobe_of",
        }
    }
}

impl fmt::Display for RelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("not_a_kind".parse::<EntityKind>().is_err());
    }

    #[test]
    fn only_raw_sequencing_is_implicit() {
        let implicit: Vec<_> = EntityKind::ALL.into_iter().filter(|k| !k.loadable()).collect();
        assert_eq!(implicit, vec![EntityKind::RawSequencing]);
    }
}
