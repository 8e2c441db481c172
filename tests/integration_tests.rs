//! End-to-end ingestion scenarios over the whole workspace: CSV in, graph
//! out, idempotence on re-run, and the dual-path union downstream.

use labgraph_graph::GraphStore;
use labgraph_ingest::IngestError;
use labgraph_ingest::{ingest_batch, read_rows, BatchReport, IngestOptions, RowOutcome};
use labgraph_schema::EntityKind;

fn load_csv(
    store: &mut GraphStore,
    kind: EntityKind,
    csv: &str,
    covid: bool,
) -> Result<BatchReport, IngestError> {
    let batch = read_rows(csv.as_bytes(), b',')?;
    ingest_batch(store, kind, batch, &IngestOptions { covid })
}

fn outcomes(report: &BatchReport) -> Vec<RowOutcome> {
    report.statuses.iter().map(|s| s.outcome).collect()
}

const GROUPS: &str = "group_name,institution\nGrp,MLW\n";
const PROJECTS: &str = "project_name,group_name,institution\nProj1,Grp,MLW\n";
const SOURCES: &str = "sample_source_identifier,sample_source_type,projects,group_name,institution\n\
                       ss1,patient,Proj1,Grp,MLW\n";
const SAMPLES: &str = "sample_identifier,sample_source_identifier,group_name,institution\n\
                       s1,ss1,Grp,MLW\n";
const CULTURES: &str = "sample_identifier,group_name,institution,culture_identifier,date_cultured\n\
                        s1,Grp,MLW,c1,20/01/2021\n";

fn extraction_csv() -> String {
    [
        "sample_identifier,group_name,institution,extraction_identifier,date_extracted,\
         extraction_from,culture_identifier,date_cultured,submitter_plate_id,\
         submitter_plate_well,nucleic_acid_concentration",
        "s1,Grp,MLW,e1,01/02/2021,whole_sample,,,EXT1,A1,4.2",
        "s1,Grp,MLW,e2,01/02/2021,cultured_isolate,c1,20/01/2021,EXT1,A2,3.1",
    ]
    .join("\n")
}

fn seed_world(store: &mut GraphStore) {
    load_csv(store, EntityKind::Group, GROUPS, false).unwrap();
    load_csv(store, EntityKind::Project, PROJECTS, false).unwrap();
    load_csv(store, EntityKind::SampleSource, SOURCES, false).unwrap();
    load_csv(store, EntityKind::Sample, SAMPLES, false).unwrap();
    load_csv(store, EntityKind::Culture, CULTURES, false).unwrap();
    load_csv(store, EntityKind::Extraction, &extraction_csv(), false).unwrap();
}

#[test]
fn chain_ingest_is_idempotent() {
    let mut store = GraphStore::new();

    for (kind, csv) in [
        (EntityKind::Group, GROUPS),
        (EntityKind::Project, PROJECTS),
        (EntityKind::SampleSource, SOURCES),
        (EntityKind::Sample, SAMPLES),
    ] {
        let report = load_csv(&mut store, kind, csv, false).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::Created], "{kind}");
    }
    let entities = store.entity_count();
    let relations = store.relation_count();

    for (kind, csv) in [
        (EntityKind::Group, GROUPS),
        (EntityKind::Project, PROJECTS),
        (EntityKind::SampleSource, SOURCES),
        (EntityKind::Sample, SAMPLES),
    ] {
        let report = load_csv(&mut store, kind, csv, false).unwrap();
        assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists], "{kind}");
    }
    // Identical graph state after the second run.
    assert_eq!(store.entity_count(), entities);
    assert_eq!(store.relation_count(), relations);
}

#[test]
fn extraction_row_waits_for_its_culture() {
    let mut store = GraphStore::new();
    load_csv(&mut store, EntityKind::Group, GROUPS, false).unwrap();
    load_csv(&mut store, EntityKind::Project, PROJECTS, false).unwrap();
    load_csv(&mut store, EntityKind::SampleSource, SOURCES, false).unwrap();
    load_csv(&mut store, EntityKind::Sample, SAMPLES, false).unwrap();

    let err = load_csv(&mut store, EntityKind::Extraction, &extraction_csv(), false).unwrap_err();
    assert!(matches!(
        err,
        IngestError::MissingPrerequisite {
            parent: EntityKind::Culture,
            ..
        }
    ));
    // The whole-sample row on line 2 committed before the fatal row; the
    // cultured row did not.
    assert_eq!(store.entities_of_kind("extraction").len(), 1);

    load_csv(&mut store, EntityKind::Culture, CULTURES, false).unwrap();
    let report = load_csv(&mut store, EntityKind::Extraction, &extraction_csv(), false).unwrap();
    assert_eq!(
        outcomes(&report),
        vec![RowOutcome::AlreadyExists, RowOutcome::Created]
    );
    assert_eq!(store.entities_of_kind("extraction").len(), 2);
}

#[test]
fn externally_sequenced_plates_skip_concentration() {
    let mut store = GraphStore::new();
    seed_world(&mut store);

    let external = "sample_identifier,group_name,institution,extraction_identifier,\
                    date_extracted,extraction_from,submitter_plate_id,submitter_plate_well\n\
                    s1,Grp,MLW,e9,05/02/2021,whole_sample,OUT1,B1\n";
    let report = load_csv(&mut store, EntityKind::Extraction, external, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);

    let inhouse = "sample_identifier,group_name,institution,extraction_identifier,\
                   date_extracted,extraction_from,submitter_plate_id,submitter_plate_well\n\
                   s1,Grp,MLW,e10,05/02/2021,whole_sample,EXT9,B2\n";
    let err = load_csv(&mut store, EntityKind::Extraction, inhouse, false).unwrap_err();
    assert!(matches!(err, IngestError::Validation { .. }));
}

const SEQ_BATCHES: &str = "batch_name,sequencing_type,date_run\nb1,nanopore,10/02/2021\n";
const READSET_BATCH_RB1: &str =
    "readset_batch_name,raw_sequencing_batch_name,basecaller\nrb1,b1,guppy-5.0\n";
const READSET_BATCH_RB2: &str =
    "readset_batch_name,raw_sequencing_batch_name,basecaller\nrb2,b1,guppy-6.0\n";

fn readset_csv(batch: &str) -> String {
    format!(
        "readset_batch_name,raw_sequencing_batch_name,sample_identifier,group_name,\
         institution,extraction_identifier,date_extracted,extraction_from,barcode\n\
         {batch},b1,s1,Grp,MLW,e1,01/02/2021,whole_sample,barcode01\n"
    )
}

#[test]
fn rebasecalled_batches_reuse_the_raw_sequencing() {
    let mut store = GraphStore::new();
    seed_world(&mut store);
    load_csv(&mut store, EntityKind::RawSequencingBatch, SEQ_BATCHES, false).unwrap();
    load_csv(&mut store, EntityKind::ReadSetBatch, READSET_BATCH_RB1, false).unwrap();

    let report = load_csv(&mut store, EntityKind::ReadSet, &readset_csv("rb1"), false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);
    assert_eq!(store.entities_of_kind("raw_sequencing").len(), 1);

    // Same (batch, extraction) pair re-submitted under a new readset batch:
    // the run is reused, only a new readset attaches.
    load_csv(&mut store, EntityKind::ReadSetBatch, READSET_BATCH_RB2, false).unwrap();
    let report = load_csv(&mut store, EntityKind::ReadSet, &readset_csv("rb2"), false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);
    assert_eq!(store.entities_of_kind("raw_sequencing").len(), 1);
    assert_eq!(store.entities_of_kind("readset").len(), 2);

    // And the whole load is idempotent.
    let report = load_csv(&mut store, EntityKind::ReadSet, &readset_csv("rb2"), false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);
    assert_eq!(store.entities_of_kind("readset").len(), 2);
}

#[test]
fn covid_chain_end_to_end() {
    let mut store = GraphStore::new();
    seed_world(&mut store);

    let tiling = "sample_identifier,group_name,institution,extraction_identifier,\
                  date_extracted,pcr_identifier,date_pcred,protocol\n\
                  s1,Grp,MLW,e1,01/02/2021,tp1,03/02/2021,ARTIC-v3\n";
    load_csv(&mut store, EntityKind::TilingPcr, tiling, false).unwrap();

    load_csv(&mut store, EntityKind::RawSequencingBatch, SEQ_BATCHES, false).unwrap();
    load_csv(&mut store, EntityKind::ReadSetBatch, READSET_BATCH_RB1, false).unwrap();

    let readset = "readset_batch_name,raw_sequencing_batch_name,sample_identifier,group_name,\
                   institution,pcr_identifier,date_pcred,barcode\n\
                   rb1,b1,s1,Grp,MLW,tp1,03/02/2021,barcode01\n";
    let report = load_csv(&mut store, EntityKind::ReadSet, readset, true).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);
    assert_eq!(store.entities_of_kind("raw_sequencing").len(), 1);

    let artic = "readset_batch_name,barcode,artic_workflow,artic_profile,pct_covered_bases\n\
                 rb1,barcode01,medaka,default,97.3\n";
    let report = load_csv(&mut store, EntityKind::ArticCovidResult, artic, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);

    let pangolin = "readset_batch_name,barcode,artic_workflow,artic_profile,version,lineage\n\
                    rb1,barcode01,medaka,default,4.1.2,B.1.1.7\n";
    let report = load_csv(&mut store, EntityKind::PangolinResult, pangolin, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);

    // Re-running the result loads is a no-op.
    let report = load_csv(&mut store, EntityKind::ArticCovidResult, artic, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);
    let report = load_csv(&mut store, EntityKind::PangolinResult, pangolin, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);
}

#[test]
fn mykrobe_addresses_readsets_through_the_dual_path_union() {
    let mut store = GraphStore::new();
    seed_world(&mut store);
    load_csv(&mut store, EntityKind::RawSequencingBatch, SEQ_BATCHES, false).unwrap();
    load_csv(&mut store, EntityKind::ReadSetBatch, READSET_BATCH_RB1, false).unwrap();

    // One readset for the cultured-isolate extraction.
    let readset = "readset_batch_name,raw_sequencing_batch_name,sample_identifier,group_name,\
                   institution,extraction_identifier,date_extracted,extraction_from,barcode\n\
                   rb1,b1,s1,Grp,MLW,e2,01/02/2021,cultured_isolate,barcode02\n";
    load_csv(&mut store, EntityKind::ReadSet, readset, false).unwrap();

    let mykrobe = "readset_batch_name,sample_identifier,group_name,institution,\
                   mykrobe_version,drug,susceptibility\n\
                   rb1,s1,Grp,MLW,v0.12.1,isoniazid,S\n";
    let report = load_csv(&mut store, EntityKind::MykrobeResult, mykrobe, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);

    // A second readset for the same sample in the same batch makes the
    // sample-level address ambiguous, which is fatal by design.
    let second = "readset_batch_name,raw_sequencing_batch_name,sample_identifier,group_name,\
                  institution,extraction_identifier,date_extracted,extraction_from,barcode\n\
                  rb1,b1,s1,Grp,MLW,e1,01/02/2021,whole_sample,barcode01\n";
    load_csv(&mut store, EntityKind::ReadSet, second, false).unwrap();

    let other_drug = "readset_batch_name,sample_identifier,group_name,institution,\
                      mykrobe_version,drug,susceptibility\n\
                      rb1,s1,Grp,MLW,v0.12.1,rifampicin,R\n";
    let err = load_csv(&mut store, EntityKind::MykrobeResult, other_drug, false).unwrap_err();
    assert!(matches!(
        err,
        IngestError::AmbiguousIdentity {
            target: EntityKind::ReadSet,
            ..
        }
    ));
}

#[test]
fn downstream_queries_union_both_paths() {
    let mut store = GraphStore::new();
    seed_world(&mut store);
    load_csv(&mut store, EntityKind::RawSequencingBatch, SEQ_BATCHES, false).unwrap();
    load_csv(&mut store, EntityKind::ReadSetBatch, READSET_BATCH_RB1, false).unwrap();

    let readsets = "readset_batch_name,raw_sequencing_batch_name,sample_identifier,group_name,\
                    institution,extraction_identifier,date_extracted,extraction_from,barcode\n\
                    rb1,b1,s1,Grp,MLW,e1,01/02/2021,whole_sample,barcode01\n\
                    rb1,b1,s1,Grp,MLW,e2,01/02/2021,cultured_isolate,barcode02\n";
    load_csv(&mut store, EntityKind::ReadSet, readsets, false).unwrap();

    let sample = labgraph_query::find_sample(&store, "Grp", "MLW", "s1").unwrap();
    assert_eq!(labgraph_query::extractions_for_sample(&store, sample).len(), 2);
    assert_eq!(labgraph_query::readsets_for_sample(&store, sample).len(), 2);

    let lineage = labgraph_query::sample_lineage(&store, sample);
    assert!(lineage.contains("extraction e1"));
    assert!(lineage.contains("extraction e2"));
    assert!(lineage.contains("culture c1"));
}

#[test]
fn pcr_results_and_assays() {
    let mut store = GraphStore::new();
    seed_world(&mut store);

    load_csv(
        &mut store,
        EntityKind::PcrAssay,
        "assay_name\nCOVID qPCR\n",
        false,
    )
    .unwrap();

    let result = "sample_identifier,group_name,institution,assay_name,pcr_identifier,\
                  date_pcred,pcr_result,ct\n\
                  s1,Grp,MLW,COVID qPCR,p1,05/03/2021,Positive,21.4\n";
    let report = load_csv(&mut store, EntityKind::PcrResult, result, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::Created]);
    let report = load_csv(&mut store, EntityKind::PcrResult, result, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);

    let bad = "sample_identifier,group_name,institution,assay_name,pcr_identifier,\
               date_pcred,pcr_result\n\
               s1,Grp,MLW,COVID qPCR,p2,05/03/2021,Maybe\n";
    let err = load_csv(&mut store, EntityKind::PcrResult, bad, false).unwrap_err();
    assert!(matches!(err, IngestError::Validation { .. }));
    assert_eq!(store.entities_of_kind("pcr_result").len(), 1);
}

#[test]
fn snapshot_survives_between_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.lgdb");

    {
        let mut store = GraphStore::new();
        load_csv(&mut store, EntityKind::Group, GROUPS, false).unwrap();
        load_csv(&mut store, EntityKind::Project, PROJECTS, false).unwrap();
        store.save(&path).unwrap();
    }

    let mut store = GraphStore::load_or_new(&path).unwrap();
    let report = load_csv(&mut store, EntityKind::Project, PROJECTS, false).unwrap();
    assert_eq!(outcomes(&report), vec![RowOutcome::AlreadyExists]);
    load_csv(&mut store, EntityKind::SampleSource, SOURCES, false).unwrap();
    load_csv(&mut store, EntityKind::Sample, SAMPLES, false).unwrap();
    assert_eq!(store.entity_count(), 4);
}

#[test]
fn covid_confirmatory_pcr_blank_pair_skips() {
    let mut store = GraphStore::new();
    seed_world(&mut store);

    let rows = "sample_identifier,group_name,institution,extraction_identifier,\
                date_extracted,pcr_identifier,date_pcred,pcr_result\n\
                s1,Grp,MLW,e1,01/02/2021,,,\n\
                s1,Grp,MLW,e1,01/02/2021,cp1,04/02/2021,Positive\n";
    let report = load_csv(&mut store, EntityKind::CovidConfirmatoryPcr, rows, false).unwrap();
    assert_eq!(
        outcomes(&report),
        vec![RowOutcome::Skipped, RowOutcome::Created]
    );
    assert_eq!(store.entities_of_kind("covid_confirmatory_pcr").len(), 1);
}
