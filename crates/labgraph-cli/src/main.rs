//! Labgraph CLI
//!
//! Operator front end for the provenance graph:
//! - `load`: ingest one delimited file as one entity kind
//! - `provenance`: print the lineage tree of one sample
//! - `stats`: entity counts per kind
//!
//! The graph lives in a single snapshot file (`--db`), loaded before and
//! saved after every command that mutates. On a fatal row the rows committed
//! before it are still saved; after repairing the input, re-running the
//! batch is safe because ingestion is idempotent.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use labgraph_graph::GraphStore;
use labgraph_ingest::{ingest_file, BatchReport, IngestOptions, RowOutcome};
use labgraph_schema::EntityKind;

#[derive(Parser)]
#[command(name = "labgraph")]
#[command(version, about = "Laboratory provenance graph ingestion")]
struct Cli {
    /// Graph snapshot file.
    #[arg(long, global = true, default_value = "labgraph.lgdb")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one delimited file as one entity kind.
    ///
    /// The kind is named explicitly; it is never inferred from column
    /// headers. Ancestors must already be loaded: the engine never creates
    /// a prerequisite implicitly.
    Load {
        /// Entity kind (e.g. group, project, sample, extraction, readset).
        kind: String,
        /// Input file (CSV with headers; a leading BOM is tolerated).
        #[arg(short, long)]
        input: PathBuf,
        /// Field delimiter: a single character, or `tab`.
        #[arg(long, default_value = ",")]
        delimiter: String,
        /// Covid pipeline: readsets hang off tiling PCRs instead of
        /// extractions.
        #[arg(long)]
        covid: bool,
    },

    /// Print the provenance tree of one sample.
    Provenance {
        #[arg(long)]
        group: String,
        #[arg(long)]
        institution: String,
        #[arg(long)]
        sample: String,
    },

    /// Entity counts per kind.
    Stats,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Load {
            kind,
            input,
            delimiter,
            covid,
        } => cmd_load(&cli.db, &kind, &input, &delimiter, covid),
        Commands::Provenance {
            group,
            institution,
            sample,
        } => cmd_provenance(&cli.db, &group, &institution, &sample),
        Commands::Stats => cmd_stats(&cli.db),
    }
}

fn parse_delimiter(raw: &str) -> Result<u8> {
    if raw.eq_ignore_ascii_case("tab") {
        return Ok(b'\t');
    }
    let bytes = raw.as_bytes();
    if bytes.len() != 1 {
        bail!("delimiter must be a single character or `tab`, got `{raw}`");
    }
    Ok(bytes[0])
}

fn cmd_load(db: &PathBuf, kind: &str, input: &PathBuf, delimiter: &str, covid: bool) -> Result<()> {
    let kind: EntityKind = kind
        .parse()
        .map_err(|e: String| anyhow!(e))
        .with_context(|| {
            let loadable: Vec<&str> = EntityKind::ALL
                .into_iter()
                .filter(|k| k.loadable())
                .map(EntityKind::as_str)
                .collect();
            format!("loadable kinds: {}", loadable.join(", "))
        })?;
    let delimiter = parse_delimiter(delimiter)?;
    let options = IngestOptions { covid };

    let mut store = GraphStore::load_or_new(db)
        .with_context(|| format!("opening graph snapshot {}", db.display()))?;

    match ingest_file(&mut store, kind, input, delimiter, &options) {
        Ok(report) => {
            store.save(db)?;
            tracing::info!(db = %db.display(), run_id = %report.run_id, "snapshot saved");
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            // Rows committed before the fatal row stay committed; the
            // repaired batch can simply be re-run.
            store.save(db)?;
            eprintln!("{} {}", "fatal:".red().bold(), err);
            bail!("batch aborted");
        }
    }
}

fn print_report(report: &BatchReport) {
    for status in &report.statuses {
        let label = match status.outcome {
            RowOutcome::Created => "created".green(),
            RowOutcome::AlreadyExists => "already exists".dimmed(),
            RowOutcome::Updated => "updated".cyan(),
            RowOutcome::Skipped => "skipped".yellow(),
        };
        println!("row {:>4}: {label}", status.row);
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }
    println!(
        "{} {}: {} rows, {} created, {} updated, {} already existed, {} skipped",
        "done".green().bold(),
        report.kind,
        report.rows_total,
        report.created,
        report.updated,
        report.already_exists,
        report.skipped,
    );
}

fn cmd_provenance(db: &PathBuf, group: &str, institution: &str, sample: &str) -> Result<()> {
    let store = GraphStore::load_or_new(db)?;
    let Some(id) = labgraph_query::find_sample(&store, group, institution, sample) else {
        bail!("no sample `{sample}` in group `{group}` ({institution})");
    };
    print!("{}", labgraph_query::sample_lineage(&store, id));
    let readsets = labgraph_query::readsets_for_sample(&store, id);
    println!("{} readset(s) across both extraction paths", readsets.len());
    Ok(())
}

fn cmd_stats(db: &PathBuf) -> Result<()> {
    let store = GraphStore::load_or_new(db)?;
    for (kind, count) in labgraph_query::kind_counts(&store) {
        if count > 0 {
            println!("{kind:>24}  {count}");
        }
    }
    println!(
        "{:>24}  {} entities, {} relations",
        "total".bold(),
        store.entity_count(),
        store.relation_count(),
    );
    Ok(())
}
