// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # End-to-End Pipeline Tests
//!
//! Drives the full DAG from source drops to the loaded graph: fixture
//! files in a dated inbox, the real extractors and engine (API disabled),
//! the in-memory graph store, and a second incremental run that must
//! observe every asset without rematerializing. A second scenario plants a
//! duplicate award id and asserts the quality gate keeps the graph
//! untouched.

use sbir_graph::application::assets::catalog::{self, GRAPH_LOAD};
use sbir_graph::application::services::PipelineRuntime;
use sbir_graph::application::use_cases::materialize;
use sbir_graph::infrastructure::config::EtlConfig;
use sbir_graph::infrastructure::extractors::stat_table::StatTableWriter;
use sbir_graph::infrastructure::graph::{schema, SqliteGraphStore};
use sbir_graph_bootstrap::{CancellationToken, ExitCode};
use sbir_graph_domain::entities::RunMode;
use sbir_graph_domain::repositories::{GraphRepository, NodeLabel, RelType};
use sbir_graph_domain::value_objects::{FieldType, FieldValue, Record};
use std::path::Path;
use std::sync::Arc;

const AWARD_HEADER: &str =
    "award_id,company_name,supplier_id,legacy_id,street,city,state,postcode,agency,program,phase,amount,award_date,naics,abstract";

fn write_award_fixtures(inbox: &Path, rows: &[&str]) {
    let dir = inbox.join("awards/2024-01-15");
    std::fs::create_dir_all(&dir).unwrap();
    let mut csv = String::from(AWARD_HEADER);
    csv.push('\n');
    for row in rows {
        csv.push_str(row);
        csv.push('\n');
    }
    std::fs::write(dir.join("awards.csv"), csv).unwrap();
}

fn write_contract_fixtures(inbox: &Path) {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let dir = inbox.join("contracts/2024-01-15");
    std::fs::create_dir_all(&dir).unwrap();
    let file = std::fs::File::create(dir.join("contracts.sql.gz")).unwrap();
    let mut enc = GzEncoder::new(file, Compression::fast());
    enc.write_all(b"-- contracts dump\n").unwrap();
    enc.write_all(
        b"INSERT INTO `contracts` VALUES \
          ('W911NF20C0001','0','Q1U2A3N4T5U6M',NULL,'Quantum Dynamics Incorporated',250000.0,'2022-03-01','AC13'),\
          ('FA875021P0042','P00001',NULL,NULL,'ACME ROBOTICS L.L.C.',80000.0,'2021-07-15','R425');\n",
    )
    .unwrap();
    enc.finish().unwrap();
}

fn write_supplier_fixtures(inbox: &Path) {
    let dir = inbox.join("suppliers/2024-01-15");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("entities.csv"),
        "supplier_id,legacy_id,legal_name,state,postcode\n\
         Q1U2A3N4T5U6M,123456789,Quantum Dynamics Incorporated,VA,22203\n\
         ,987654321,ACME ROBOTICS L.L.C.,CA,94103\n\
         ,,Gamma Materials Research,TX,73301\n",
    )
    .unwrap();
}

fn date(y: i32, m: u32, d: u32) -> FieldValue {
    FieldValue::Date(chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

fn write_assignment_fixtures(inbox: &Path) {
    let dir = inbox.join("assignments/2024-01-15");
    std::fs::create_dir_all(&dir).unwrap();

    let mut spine = StatTableWriter::create(
        &dir.join("assignment.stb"),
        "assignment",
        &[
            ("rf_id".to_string(), FieldType::Str),
            ("record_dt".to_string(), FieldType::Date),
            ("execution_dt".to_string(), FieldType::Date),
        ],
        2,
    )
    .unwrap();
    spine
        .write_row(
            &Record::new()
                .with("rf_id", FieldValue::Str("100-1".into()))
                .with("record_dt", date(2015, 3, 1))
                .with("execution_dt", date(2015, 2, 14)),
        )
        .unwrap();
    spine
        .write_row(
            &Record::new()
                .with("rf_id", FieldValue::Str("200-2".into()))
                .with("record_dt", date(2018, 5, 1)),
        )
        .unwrap();
    spine.finish().unwrap();

    let mut conveyance = StatTableWriter::create(
        &dir.join("assignment_conveyance.stb"),
        "assignment_conveyance",
        &[
            ("rf_id".to_string(), FieldType::Str),
            ("convey_text".to_string(), FieldType::Str),
            ("employer_assign".to_string(), FieldType::Bool),
        ],
        2,
    )
    .unwrap();
    conveyance
        .write_row(
            &Record::new()
                .with("rf_id", FieldValue::Str("100-1".into()))
                .with("convey_text", FieldValue::Str("ASSIGNMENT OF ASSIGNORS INTEREST".into()))
                .with("employer_assign", FieldValue::Bool(true)),
        )
        .unwrap();
    conveyance
        .write_row(
            &Record::new()
                .with("rf_id", FieldValue::Str("200-2".into()))
                .with("convey_text", FieldValue::Str("ASSIGNMENT".into()))
                .with("employer_assign", FieldValue::Bool(false)),
        )
        .unwrap();
    conveyance.finish().unwrap();

    let mut assignee = StatTableWriter::create(
        &dir.join("assignee.stb"),
        "assignee",
        &[
            ("rf_id".to_string(), FieldType::Str),
            ("ee_name".to_string(), FieldType::Str),
        ],
        2,
    )
    .unwrap();
    assignee
        .write_row(
            &Record::new()
                .with("rf_id", FieldValue::Str("100-1".into()))
                .with("ee_name", FieldValue::Str("Quantum Dynamics Incorporated".into())),
        )
        .unwrap();
    assignee
        .write_row(
            &Record::new()
                .with("rf_id", FieldValue::Str("200-2".into()))
                .with("ee_name", FieldValue::Str("ACME ROBOTICS L.L.C.".into())),
        )
        .unwrap();
    assignee.finish().unwrap();

    let mut assignor = StatTableWriter::create(
        &dir.join("assignor.stb"),
        "assignor",
        &[
            ("rf_id".to_string(), FieldType::Str),
            ("or_name".to_string(), FieldType::Str),
        ],
        2,
    )
    .unwrap();
    for (rf, name) in [("100-1", "JANE INVENTOR"), ("200-2", "Quantum Dynamics Incorporated")] {
        assignor
            .write_row(
                &Record::new()
                    .with("rf_id", FieldValue::Str(rf.into()))
                    .with("or_name", FieldValue::Str(name.into())),
            )
            .unwrap();
    }
    assignor.finish().unwrap();

    let mut documentid = StatTableWriter::create(
        &dir.join("documentid.stb"),
        "documentid",
        &[
            ("rf_id".to_string(), FieldType::Str),
            ("grant_doc_num".to_string(), FieldType::Str),
            ("appno_doc_num".to_string(), FieldType::Str),
        ],
        2,
    )
    .unwrap();
    for rf in ["100-1", "200-2"] {
        documentid
            .write_row(
                &Record::new()
                    .with("rf_id", FieldValue::Str(rf.into()))
                    .with("grant_doc_num", FieldValue::Str("11222333".into())),
            )
            .unwrap();
    }
    documentid.finish().unwrap();
}

fn write_classifier_artifact(path: &Path) {
    let artifact = serde_json::json!({
        "version": "2025-01",
        "categories": [
            {
                "cet_id": "quantum-information",
                "terms": { "quantum": 6.0, "qubit": 6.0 }
            },
            {
                "cet_id": "advanced-robotics",
                "terms": { "robotic": 6.0, "actuator": 4.0 }
            }
        ]
    });
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(&artifact).unwrap()).unwrap();
}

struct E2eHarness {
    _dir: tempfile::TempDir,
    config: EtlConfig,
    store: Arc<SqliteGraphStore>,
}

async fn harness(award_rows: &[&str]) -> E2eHarness {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("inbox");

    write_award_fixtures(&inbox, award_rows);
    write_supplier_fixtures(&inbox);
    write_contract_fixtures(&inbox);
    write_assignment_fixtures(&inbox);

    let mut config = EtlConfig::default();
    config.storage.root = dir.path().join("artifacts");
    config.sources.inbox = inbox;
    config.sources.chunk_size = 100;
    config.enrichment.api.enabled = false;
    config.classifier.artifact_path = dir.path().join("models/lexicon.json");
    config.runtime.retry.base_delay_ms = 1;
    config.runtime.retry.max_delay_ms = 2;
    write_classifier_artifact(&config.classifier.artifact_path);

    let store = SqliteGraphStore::in_memory().await.unwrap();
    schema::migrate_to(&store, schema::GRAPH_SCHEMA_VERSION).await.unwrap();

    E2eHarness {
        _dir: dir,
        config,
        store: Arc::new(store),
    }
}

fn clean_award_rows() -> Vec<&'static str> {
    vec![
        // A-1 predates the 2015 assignment recording, so patent provenance
        // can link it below.
        "A-1,Quantum Dynamics Inc,Q1U2A3N4T5U6M,,1 Electron Way,Arlington,VA,22203,DOD,SBIR,I,150000,2014-06-30,541715,Entangled qubit sensors for quantum navigation",
        "A-2,Acme Robotics LLC,,,9 Servo St,San Francisco,CA,94103,NSF,SBIR,II,750000,2020-02-10,,Robotic actuator arrays with adaptive control",
        "A-3,Gamma Materials Research,,,12 Kiln Rd,Austin,TX,73301,DOE,STTR,I,200000,2019-09-01,,Quantum dot coatings for photovoltaics",
    ]
}

#[tokio::test]
async fn test_full_pipeline_builds_graph_then_incremental_observes() {
    let h = harness(&clean_award_rows()).await;
    let runtime = PipelineRuntime::new(h.config.clone(), Some(h.store.clone())).unwrap();

    let (report, exit) = materialize::execute(
        &runtime,
        &[GRAPH_LOAD.to_string()],
        RunMode::Full,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(exit, ExitCode::Success, "summary:\n{}", report.console_summary());
    assert!(report.run.succeeded());

    // Graph shape: three award and two contract transactions, resolved
    // organizations plus the agencies and assignment parties, one patent,
    // two chained assignments.
    assert_eq!(h.store.node_count(NodeLabel::FinancialTransaction).await.unwrap(), 5);
    assert_eq!(h.store.node_count(NodeLabel::Patent).await.unwrap(), 1);
    assert_eq!(h.store.node_count(NodeLabel::PatentAssignment).await.unwrap(), 2);
    assert!(h.store.node_count(NodeLabel::Organization).await.unwrap() >= 5);
    assert!(h.store.node_count(NodeLabel::CetArea).await.unwrap() >= 1);

    assert_eq!(h.store.edge_count(RelType::RecipientOf).await.unwrap(), 5);
    assert_eq!(h.store.edge_count(RelType::FundedBy).await.unwrap(), 3);
    assert_eq!(h.store.edge_count(RelType::ParticipatedIn).await.unwrap(), 3);
    assert_eq!(h.store.edge_count(RelType::ChainOf).await.unwrap(), 1);
    assert_eq!(h.store.edge_count(RelType::AssignedVia).await.unwrap(), 2);
    // A-1 (2014) predates the first recording (2015) of the patent held by
    // the same company; the later awards do not.
    assert_eq!(h.store.edge_count(RelType::GeneratedFrom).await.unwrap(), 1);
    assert!(h.store.edge_count(RelType::ApplicableTo).await.unwrap() >= 3);

    // Incremental rerun with identical config and inputs: every asset
    // observed, zero rematerializations, graph unchanged.
    let runtime = PipelineRuntime::new(h.config.clone(), Some(h.store.clone())).unwrap();
    let (report, exit) = materialize::execute(
        &runtime,
        &[GRAPH_LOAD.to_string()],
        RunMode::Incremental,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(exit, ExitCode::Success);
    assert_eq!(report.run.metrics.assets_materialized, 0);
    assert_eq!(
        report.run.metrics.assets_observed as usize,
        report.run.outcomes.len()
    );
    assert_eq!(h.store.edge_count(RelType::RecipientOf).await.unwrap(), 5);
}

#[tokio::test]
async fn test_duplicate_award_id_blocks_load_and_graph_stays_empty() {
    let mut rows = clean_award_rows();
    rows.push(
        "A-1,Quantum Dynamics Inc,Q1U2A3N4T5U6M,,1 Electron Way,Arlington,VA,22203,DOD,SBIR,I,150000,2021-06-30,541715,Duplicate row",
    );
    let h = harness(&rows).await;
    let runtime = PipelineRuntime::new(h.config.clone(), Some(h.store.clone())).unwrap();

    let (report, exit) = materialize::execute(
        &runtime,
        &[GRAPH_LOAD.to_string()],
        RunMode::Full,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(exit, ExitCode::GateBlocked, "summary:\n{}", report.console_summary());
    assert!(report.run.had_gate_block());
    assert_eq!(h.store.node_count(NodeLabel::FinancialTransaction).await.unwrap(), 0);
    assert_eq!(h.store.edge_count(RelType::RecipientOf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_config_change_triggers_descendant_rematerialization() {
    let h = harness(&clean_award_rows()).await;
    let runtime = PipelineRuntime::new(h.config.clone(), Some(h.store.clone())).unwrap();
    materialize::execute(
        &runtime,
        &[catalog::AWARDS_ENRICHED.to_string()],
        RunMode::Full,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    // Touch the enrichment config: the enriched asset (and only the assets
    // that fingerprint that section) must rematerialize.
    let mut config = h.config.clone();
    config.enrichment.stop_threshold = 0.85;
    let runtime = PipelineRuntime::new(config, Some(h.store.clone())).unwrap();
    let (report, _) = materialize::execute(
        &runtime,
        &[catalog::AWARDS_ENRICHED.to_string()],
        RunMode::Incremental,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(matches!(
        report.run.outcomes[catalog::AWARDS_ENRICHED],
        sbir_graph_domain::entities::AssetOutcome::Materialized
    ));
    assert!(matches!(
        report.run.outcomes[catalog::AWARDS_RAW],
        sbir_graph_domain::entities::AssetOutcome::Observed
    ));
}
