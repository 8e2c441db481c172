//! Idempotent batch ingestion for the laboratory provenance graph.
//!
//! One generic loop drives every entity kind, parameterized by the
//! per-kind descriptor from `labgraph-schema`:
//!
//! ```text
//! normalize -> validate -> resolve -> { skip | create+link | update | no-op }
//! ```
//!
//! Re-running a batch that already succeeded is always safe: every row that
//! was created before reports AlreadyExists and nothing is duplicated.
//! Fatal conditions (invalid row, missing prerequisite, ambiguous identity,
//! broken graph invariant) abort the remaining rows of the batch; rows
//! committed before the fatal row stay committed, and the repaired batch can
//! simply be re-run.

pub mod batch;
pub mod build;
pub mod link;
pub mod normalize;
pub mod resolve;
pub mod validate;

pub use batch::{ingest_batch, ingest_file, BatchReport, IngestOptions, RowOutcome, RowStatus};
pub use normalize::{read_rows, read_rows_from_path, NormalizedBatch, Row};
pub use resolve::Resolution;
pub use validate::Outcome;

use labgraph_graph::GraphError;
use labgraph_schema::EntityKind;
use thiserror::Error;

/// Fatal ingestion conditions. All abort the batch; none is retried.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("row {row} ({kind}): validation failed: {reason}\n  row: {rendered}")]
    Validation {
        kind: EntityKind,
        row: usize,
        reason: String,
        rendered: String,
    },

    #[error(
        "row {row} ({kind}): missing prerequisite: no {parent} matching [{key}]; \
         run `labgraph load {parent}` with the ancestor records first"
    )]
    MissingPrerequisite {
        kind: EntityKind,
        row: usize,
        parent: EntityKind,
        key: String,
    },

    #[error(
        "row {row} ({kind}): {count} existing {target} records match natural key [{key}]; \
         the uniqueness invariant is broken and must be repaired before loading"
    )]
    AmbiguousIdentity {
        kind: EntityKind,
        row: usize,
        target: EntityKind,
        count: usize,
        key: String,
    },

    #[error("row {row} ({kind}): graph invariant violated: {detail}")]
    InvariantViolation {
        kind: EntityKind,
        row: usize,
        detail: String,
    },

    #[error("{0} records are created implicitly and cannot be loaded from a file")]
    NotLoadable(EntityKind),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
