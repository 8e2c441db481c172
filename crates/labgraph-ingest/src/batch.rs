//! Batch ingestion.
//!
//! One loop, every kind. The per-kind descriptor supplies the rules, the
//! key scope and the update whitelist; this module supplies the state
//! machine: `Pending -> {Skipped | Fatal | Created | Updated |
//! AlreadyExists}`, all terminal, no retries. Fatal conditions abort the
//! remaining rows; previously committed rows stay committed and the batch
//! is safe to re-run after repair.

use crate::link::{
    create_and_link, resolve_required, single_group_guard, split_list,
};
use crate::normalize::{read_rows_from_path, NormalizedBatch, Row};
use crate::resolve::{render_key, resolve, Resolution};
use crate::validate::{flag_requested, validate, Outcome};
use crate::IngestError;
use chrono::{DateTime, Utc};
use labgraph_graph::{GraphStore, NodeId};
use labgraph_schema::descriptor::{descriptor, EntityDescriptor, ParentSelector, UpdateRule};
use labgraph_schema::fields::canonical_date;
use labgraph_schema::{EntityKind, RelKind};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Covid pipeline: readsets hang off TilingPcr instead of Extraction.
    pub covid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    AlreadyExists,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowStatus {
    pub row: usize,
    pub outcome: RowOutcome,
}

/// Per-batch audit record, in the shape operators read and reports
/// serialize.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub kind: EntityKind,
    pub started: DateTime<Utc>,
    pub rows_total: usize,
    pub created: usize,
    pub already_exists: usize,
    pub updated: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
    pub statuses: Vec<RowStatus>,
}

impl BatchReport {
    fn new(kind: EntityKind, warnings: Vec<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            started: Utc::now(),
            rows_total: 0,
            created: 0,
            already_exists: 0,
            updated: 0,
            skipped: 0,
            warnings,
            statuses: Vec::new(),
        }
    }

    fn record(&mut self, row: usize, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created => self.created += 1,
            RowOutcome::AlreadyExists => self.already_exists += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Skipped => self.skipped += 1,
        }
        tracing::info!(kind = %self.kind, row, ?outcome, "row ingested");
        self.statuses.push(RowStatus { row, outcome });
    }
}

/// Load one file as one entity kind.
pub fn ingest_file(
    store: &mut GraphStore,
    kind: EntityKind,
    path: &Path,
    delimiter: u8,
    options: &IngestOptions,
) -> Result<BatchReport, IngestError> {
    let batch = read_rows_from_path(path, delimiter)?;
    ingest_batch(store, kind, batch, options)
}

/// Drive every row of a normalized batch through
/// validate -> resolve -> (skip | create | update | no-op).
pub fn ingest_batch(
    store: &mut GraphStore,
    kind: EntityKind,
    batch: NormalizedBatch,
    options: &IngestOptions,
) -> Result<BatchReport, IngestError> {
    let desc = descriptor(kind, options.covid).ok_or(IngestError::NotLoadable(kind))?;
    let mut report = BatchReport::new(kind, batch.warnings);
    report.rows_total = batch.rows.len();

    for row in &batch.rows {
        match validate(&desc.rules, row) {
            Outcome::Skip => {
                report.record(row.number, RowOutcome::Skipped);
                continue;
            }
            Outcome::Invalid(reason) => {
                return Err(IngestError::Validation {
                    kind,
                    row: row.number,
                    reason,
                    rendered: row.render(),
                });
            }
            Outcome::Complete => {}
        }

        match resolve(store, kind, &desc.key, row) {
            Resolution::Ambiguous(count) => {
                return Err(IngestError::AmbiguousIdentity {
                    kind,
                    row: row.number,
                    target: kind,
                    count,
                    key: render_key(&desc.key, row),
                });
            }
            Resolution::NotFound => {
                create_and_link(store, &desc, row, options)?;
                report.record(row.number, RowOutcome::Created);
            }
            Resolution::Found(id) => {
                let outcome = if apply_updates(store, &desc, id, row, options)? {
                    RowOutcome::Updated
                } else {
                    RowOutcome::AlreadyExists
                };
                report.record(row.number, outcome);
            }
        }
    }

    Ok(report)
}

/// Apply the kind's whitelisted updates to a resolved entity. Everything
/// outside the whitelist is a reported no-op.
fn apply_updates(
    store: &mut GraphStore,
    desc: &EntityDescriptor,
    id: NodeId,
    row: &Row,
    options: &IngestOptions,
) -> Result<bool, IngestError> {
    let mut txn = store.begin();
    let mut changed = false;

    for rule in &desc.updates {
        match rule {
            UpdateRule::FlipTrue { attr, field } => {
                if flag_requested(row, field) && store.attr(id, attr) != Some("true") {
                    txn.update_attr(id, attr, "true");
                    changed = true;
                }
            }
            UpdateRule::SetIfAbsent { attr, field } => {
                let Some(raw) = row.get(field) else {
                    continue;
                };
                if store.attr(id, attr).is_some() {
                    continue;
                }
                let value = if desc.rules.dates.contains(field) {
                    canonical_date(raw).map_err(|reason| IngestError::Validation {
                        kind: desc.kind,
                        row: row.number,
                        reason,
                        rendered: row.render(),
                    })?
                } else {
                    raw.to_string()
                };
                txn.update_attr(id, attr, &value);
                changed = true;
            }
            UpdateRule::ExtendMultiParents => {
                changed |= extend_multi_parents(store, &mut txn, desc, id, row, options)?;
            }
        }
    }

    if changed {
        txn.commit(store)?;
    }
    Ok(changed)
}

/// Stage links from an existing entity to newly-named Multi parents (a
/// sample source gaining a project on re-ingest). Every named parent must
/// already exist, and the addition must not span groups.
fn extend_multi_parents(
    store: &GraphStore,
    txn: &mut labgraph_graph::Txn,
    desc: &EntityDescriptor,
    id: NodeId,
    row: &Row,
    options: &IngestOptions,
) -> Result<bool, IngestError> {
    let Some((rel, field, parent, item_field)) =
        desc.parents.iter().find_map(|spec| match &spec.selector {
            ParentSelector::Multi {
                field,
                parent,
                item_field,
            } => Some((spec.rel, *field, *parent, *item_field)),
            _ => None,
        })
    else {
        return Ok(false);
    };
    let Some(list) = row.get(field) else {
        return Ok(false);
    };
    let parent_desc =
        descriptor(parent, options.covid).ok_or(IngestError::NotLoadable(parent))?;

    let mut changed = false;
    for item in split_list(list) {
        let item_row = row.with(item_field, item);
        let target = resolve_required(store, desc.kind, parent, &parent_desc.key, &item_row)?;
        if store.has_edge(rel.as_str(), id, target) {
            continue;
        }
        let target_groups = store.parents_of(
            target,
            RelKind::MemberOf.as_str(),
            EntityKind::Group.as_str(),
        );
        single_group_guard(store, desc.kind, row, id, &target_groups)?;
        txn.relate(rel.as_str(), id, target);
        changed = true;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(
        store: &mut GraphStore,
        kind: EntityKind,
        rows: Vec<Row>,
    ) -> Result<BatchReport, IngestError> {
        let batch = NormalizedBatch {
            rows,
            warnings: Vec::new(),
        };
        ingest_batch(store, kind, batch, &IngestOptions::default())
    }

    fn outcomes(report: &BatchReport) -> Vec<RowOutcome> {
        report.statuses.iter().map(|s| s.outcome).collect()
    }

    fn group_row() -> Row {
        Row::from_pairs(2, &[("group_name", "Grp"), ("institution", "MLW")])
    }

    fn project_row(name: &str) -> Row {
        Row::from_pairs(
            2,
            &[
                ("project_name", name),
                ("group_name", "Grp"),
                ("institution", "MLW"),
            ],
        )
    }

    fn sample_source_row(projects: &str) -> Row {
        Row::from_pairs(
            2,
            &[
                ("sample_source_identifier", "ss1"),
                ("sample_source_type", "patient"),
                ("projects", projects),
                ("group_name", "Grp"),
                ("institution", "MLW"),
            ],
        )
    }

    fn sample_row() -> Row {
        Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("sample_source_identifier", "ss1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
            ],
        )
    }

    fn seed_sample_chain(store: &mut GraphStore) {
        load(store, EntityKind::Group, vec![group_row()]).unwrap();
        load(store, EntityKind::Project, vec![project_row("Proj1")]).unwrap();
        load(store, EntityKind::SampleSource, vec![sample_source_row("Proj1")]).unwrap();
        load(store, EntityKind::Sample, vec![sample_row()]).unwrap();
    }

    #[test]
    fn chain_creates_then_reruns_as_already_exists() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);
        assert_eq!(store.entity_count(), 4);

        for (kind, row) in [
            (EntityKind::Group, group_row()),
            (EntityKind::Project, project_row("Proj1")),
            (EntityKind::SampleSource, sample_source_row("Proj1")),
            (EntityKind::Sample, sample_row()),
        ] {
            let report = load(&mut store, kind, vec![row]).unwrap();
            assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists], "{kind}");
        }
        assert_eq!(store.entity_count(), 4);
    }

    #[test]
    fn missing_sample_source_is_a_prerequisite_error() {
        let mut store = GraphStore::new();
        load(&mut store, EntityKind::Group, vec![group_row()]).unwrap();
        load(&mut store, EntityKind::Project, vec![project_row("Proj1")]).unwrap();

        let err = load(&mut store, EntityKind::Sample, vec![sample_row()]).unwrap_err();
        match err {
            IngestError::MissingPrerequisite { parent, .. } => {
                assert_eq!(parent, EntityKind::SampleSource);
            }
            other => panic!("unexpected error {other}"),
        }
        // The failed row persisted nothing.
        assert!(store.entities_of_kind("sample").is_empty());
    }

    #[test]
    fn extraction_waits_for_its_culture() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);

        let extraction = Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
                ("extraction_identifier", "e1"),
                ("date_extracted", "01/02/2021"),
                ("extraction_from", "cultured_isolate"),
                ("culture_identifier", "c1"),
                ("date_cultured", "20/01/2021"),
                ("submitter_plate_id", "EXT1"),
                ("submitter_plate_well", "A1"),
                ("nucleic_acid_concentration", "4.2"),
            ],
        );

        let err = load(&mut store, EntityKind::Extraction, vec![extraction.clone()]).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingPrerequisite {
                parent: EntityKind::Culture,
                ..
            }
        ));

        let culture = Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
                ("culture_identifier", "c1"),
                ("date_cultured", "20/01/2021"),
            ],
        );
        load(&mut store, EntityKind::Culture, vec![culture]).unwrap();

        let report = load(&mut store, EntityKind::Extraction, vec![extraction]).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::Created]);
    }

    #[test]
    fn submitted_for_sequencing_flips_exactly_once() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);
        let sample = store.entities_of_kind("sample")[0];
        assert_eq!(store.attr(sample, "submitted_for_sequencing"), Some("false"));

        let requested = sample_row().with("submitted_for_sequencing", "yes");
        let report = load(&mut store, EntityKind::Sample, vec![requested.clone()]).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::Updated]);
        assert_eq!(store.attr(sample, "submitted_for_sequencing"), Some("true"));

        let report = load(&mut store, EntityKind::Sample, vec![requested]).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);
    }

    #[test]
    fn sample_source_gains_projects_within_its_group() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);
        load(&mut store, EntityKind::Project, vec![project_row("Proj2")]).unwrap();

        let report = load(
            &mut store,
            EntityKind::SampleSource,
            vec![sample_source_row("Proj1;Proj2")],
        )
        .unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::Updated]);

        let source = store.entities_of_kind("sample_source")[0];
        assert_eq!(store.parents_of(source, "sourced_by", "project").len(), 2);
    }

    #[test]
    fn cross_group_project_extension_is_fatal() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);
        // A second group with its own project.
        load(
            &mut store,
            EntityKind::Group,
            vec![Row::from_pairs(2, &[("group_name", "Other"), ("institution", "MLW")])],
        )
        .unwrap();
        load(
            &mut store,
            EntityKind::Project,
            vec![Row::from_pairs(
                2,
                &[
                    ("project_name", "Elsewhere"),
                    ("group_name", "Other"),
                    ("institution", "MLW"),
                ],
            )],
        )
        .unwrap();

        // Naming the foreign project from this source's row cannot resolve
        // within the row's group.
        let err = load(
            &mut store,
            EntityKind::SampleSource,
            vec![sample_source_row("Proj1;Elsewhere")],
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MissingPrerequisite { .. }));
    }

    #[test]
    fn elution_fields_attach_after_the_fact_only_once() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);

        let base = Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
                ("extraction_identifier", "e1"),
                ("date_extracted", "01/02/2021"),
                ("extraction_from", "whole_sample"),
                ("submitter_plate_id", "EXT1"),
                ("submitter_plate_well", "A1"),
                ("nucleic_acid_concentration", "4.2"),
            ],
        );
        load(&mut store, EntityKind::Extraction, vec![base.clone()]).unwrap();
        let extraction = store.entities_of_kind("extraction")[0];
        assert_eq!(store.attr(extraction, "elution_plate_id"), None);

        let with_elution = base
            .with("elution_plate_id", "ELU1")
            .with("elution_plate_well", "B2");
        let report = load(&mut store, EntityKind::Extraction, vec![with_elution.clone()]).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::Updated]);
        assert_eq!(store.attr(extraction, "elution_plate_id"), Some("ELU1"));

        // Never overwritten: a different plate id on a later row is ignored.
        let conflicting = base
            .with("elution_plate_id", "ELU9")
            .with("elution_plate_well", "B2");
        let report = load(&mut store, EntityKind::Extraction, vec![conflicting]).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);
        assert_eq!(store.attr(extraction, "elution_plate_id"), Some("ELU1"));
    }

    #[test]
    fn invalid_row_aborts_and_persists_nothing() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);

        let missing_assay = Row::from_pairs(
            2,
            &[
                ("sample_identifier", "s1"),
                ("group_name", "Grp"),
                ("institution", "MLW"),
                ("pcr_identifier", "p1"),
                ("date_pcred", "05/03/2021"),
                ("pcr_result", "Positive"),
            ],
        );
        let err = load(&mut store, EntityKind::PcrResult, vec![missing_assay]).unwrap_err();
        assert!(matches!(err, IngestError::Validation { .. }));
        assert!(store.entities_of_kind("pcr_result").is_empty());
    }

    #[test]
    fn ambiguous_identity_aborts_the_batch() {
        let mut store = GraphStore::new();
        seed_sample_chain(&mut store);
        // Corrupt the store: duplicate the sample under the same source.
        let source = store.entities_of_kind("sample_source")[0];
        let mut txn = store.begin();
        let dup = txn.create("sample", vec![("sample_identifier", "s1")]);
        txn.relate("collected_from", dup, source);
        txn.commit(&mut store).unwrap();

        let err = load(&mut store, EntityKind::Sample, vec![sample_row()]).unwrap_err();
        assert!(matches!(
            err,
            IngestError::AmbiguousIdentity {
                target: EntityKind::Sample,
                count: 2,
                ..
            }
        ));
    }

    #[test]
    fn raw_sequencing_cannot_be_loaded_directly() {
        let mut store = GraphStore::new();
        let err = load(&mut store, EntityKind::RawSequencing, vec![]).unwrap_err();
        assert!(matches!(err, IngestError::NotLoadable(EntityKind::RawSequencing)));
    }
}
