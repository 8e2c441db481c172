//! Read-only provenance traversal.
//!
//! Reporting queries over the same entity/relation model the ingestion
//! engine maintains. The dual-parentage queries return the **union** of the
//! whole-sample and cultured-isolate routes, deduplicated, because
//! downstream consumers do not always know which path produced a given
//! sample's data.

use labgraph_graph::{GraphStore, NodeId};
use labgraph_schema::{EntityKind, RelKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("sample source {identifier} resolves to {count} groups; expected exactly one")]
    MultipleGroups { identifier: String, count: usize },
}

fn children(store: &GraphStore, parent: NodeId, rel: RelKind, kind: EntityKind) -> Vec<NodeId> {
    store.children_of(parent, rel.as_str(), kind.as_str())
}

/// Locate a sample by its scoped natural key.
pub fn find_sample(
    store: &GraphStore,
    group_name: &str,
    institution: &str,
    sample_identifier: &str,
) -> Option<NodeId> {
    let groups = store.find(
        EntityKind::Group.as_str(),
        &[("group_name", group_name), ("institution", institution)],
    );
    let candidates = store.find(
        EntityKind::Sample.as_str(),
        &[("sample_identifier", sample_identifier)],
    );
    candidates.into_iter().find(|&sample| {
        store
            .parents_of(sample, RelKind::CollectedFrom.as_str(), EntityKind::SampleSource.as_str())
            .into_iter()
            .flat_map(|source| {
                store.parents_of(source, RelKind::SourcedBy.as_str(), EntityKind::Project.as_str())
            })
            .flat_map(|project| {
                store.parents_of(project, RelKind::MemberOf.as_str(), EntityKind::Group.as_str())
            })
            .any(|group| groups.contains(&group))
    })
}

/// The one group of a sample source, enforced transitively through its
/// projects. More than one is a data-corruption condition.
pub fn group_of_sample_source(
    store: &GraphStore,
    source: NodeId,
) -> Result<Option<NodeId>, QueryError> {
    let mut groups: Vec<NodeId> = store
        .parents_of(source, RelKind::SourcedBy.as_str(), EntityKind::Project.as_str())
        .into_iter()
        .flat_map(|project| {
            store.parents_of(project, RelKind::MemberOf.as_str(), EntityKind::Group.as_str())
        })
        .collect();
    groups.sort_unstable();
    groups.dedup();
    match groups.len() {
        0 => Ok(None),
        1 => Ok(Some(groups[0])),
        count => Err(QueryError::MultipleGroups {
            identifier: store
                .attr(source, "sample_source_identifier")
                .unwrap_or("<unknown>")
                .to_string(),
            count,
        }),
    }
}

/// Union of the whole-sample and cultured-isolate extraction paths for one
/// sample, deduplicated, in creation order.
pub fn extractions_for_sample(store: &GraphStore, sample: NodeId) -> Vec<NodeId> {
    let mut out = children(store, sample, RelKind::ExtractedFrom, EntityKind::Extraction);
    for culture in children(store, sample, RelKind::CulturedFrom, EntityKind::Culture) {
        out.extend(children(store, culture, RelKind::ExtractedFrom, EntityKind::Extraction));
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Every raw sequencing record downstream of one sample, through either
/// extraction path, with or without a tiling PCR in between.
pub fn raw_sequencings_for_sample(store: &GraphStore, sample: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for extraction in extractions_for_sample(store, sample) {
        out.extend(children(store, extraction, RelKind::SequencingOf, EntityKind::RawSequencing));
        for pcr in children(store, extraction, RelKind::PcrOf, EntityKind::TilingPcr) {
            out.extend(children(store, pcr, RelKind::SequencingOf, EntityKind::RawSequencing));
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Every readset downstream of one sample (transitive dual-path union).
pub fn readsets_for_sample(store: &GraphStore, sample: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for raw in raw_sequencings_for_sample(store, sample) {
        out.extend(children(store, raw, RelKind::ReadsetOf, EntityKind::ReadSet));
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Indented textual provenance tree for operator reporting.
pub fn sample_lineage(store: &GraphStore, sample: NodeId) -> String {
    let mut out = String::new();
    let identifier = store.attr(sample, "sample_identifier").unwrap_or("<unknown>");
    out.push_str(&format!("sample {identifier}\n"));

    for culture in children(store, sample, RelKind::CulturedFrom, EntityKind::Culture) {
        out.push_str(&format!(
            "  culture {} ({})\n",
            store.attr(culture, "culture_identifier").unwrap_or("?"),
            store.attr(culture, "date_cultured").unwrap_or("?"),
        ));
        for extraction in children(store, culture, RelKind::ExtractedFrom, EntityKind::Extraction) {
            lineage_extraction(store, extraction, 4, &mut out);
        }
    }
    for extraction in children(store, sample, RelKind::ExtractedFrom, EntityKind::Extraction) {
        lineage_extraction(store, extraction, 2, &mut out);
    }
    out
}

fn lineage_extraction(store: &GraphStore, extraction: NodeId, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    out.push_str(&format!(
        "{pad}extraction {} ({})\n",
        store.attr(extraction, "extraction_identifier").unwrap_or("?"),
        store.attr(extraction, "date_extracted").unwrap_or("?"),
    ));
    let mut raws = children(store, extraction, RelKind::SequencingOf, EntityKind::RawSequencing);
    for pcr in children(store, extraction, RelKind::PcrOf, EntityKind::TilingPcr) {
        out.push_str(&format!(
            "{pad}  tiling_pcr {} ({})\n",
            store.attr(pcr, "pcr_identifier").unwrap_or("?"),
            store.attr(pcr, "date_pcred").unwrap_or("?"),
        ));
        raws.extend(children(store, pcr, RelKind::SequencingOf, EntityKind::RawSequencing));
    }
    raws.sort_unstable();
    raws.dedup();
    for raw in raws {
        let batch = store
            .parents_of(raw, RelKind::SequencedIn.as_str(), EntityKind::RawSequencingBatch.as_str())
            .first()
            .and_then(|&b| store.attr(b, "batch_name"))
            .unwrap_or("?")
            .to_string();
        out.push_str(&format!("{pad}  raw_sequencing in batch {batch}\n"));
        for readset in children(store, raw, RelKind::ReadsetOf, EntityKind::ReadSet) {
            out.push_str(&format!(
                "{pad}    readset {}\n",
                store.attr(readset, "readset_name").unwrap_or("?"),
            ));
        }
    }
}

/// Entity counts per kind, for the stats report.
pub fn kind_counts(store: &GraphStore) -> Vec<(EntityKind, usize)> {
    EntityKind::ALL
        .into_iter()
        .map(|kind| (kind, store.entities_of_kind(kind.as_str()).len()))
        .collect()
}
