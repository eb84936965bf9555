// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Engine Integration Tests
//!
//! Drives the engine with the protected registry wired to a scripted
//! transport: transient-then-success retries, breaker opening under
//! sustained failure with degradation to the fuzzy fallback, and the
//! end-to-end confidence outcomes of the identifier and fuzzy scenarios.

use async_trait::async_trait;
use parking_lot::Mutex;
use sbir_graph::infrastructure::config::{ApiConfig, BreakerConfig, EnrichmentConfig, RetryConfig};
use sbir_graph::infrastructure::enrichment::{
    BreakerState, EnrichmentEngine, ProtectedRegistry, RegistryClient, RegistryMatch, RegistryQuery,
    FIELD_RECIPIENT,
};
use sbir_graph::infrastructure::lookup::index::{IndexEntry, LookupIndex};
use sbir_graph_bootstrap::CancellationToken;
use sbir_graph_domain::entities::{Award, AwardCompanyRef, AttemptOutcome, EnrichmentSource};
use sbir_graph_domain::services::normalizer::normalize_name;
use sbir_graph_domain::value_objects::{AwardPhase, ConfidenceBand, SupplierId};
use sbir_graph_domain::EtlError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct ScriptedClient {
    script: Mutex<Vec<Result<Vec<Option<RegistryMatch>>, EtlError>>>,
    calls: AtomicU64,
}

impl ScriptedClient {
    fn new(script: Vec<Result<Vec<Option<RegistryMatch>>, EtlError>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RegistryClient for ScriptedClient {
    async fn lookup_batch(&self, queries: &[RegistryQuery]) -> Result<Vec<Option<RegistryMatch>>, EtlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.is_empty() {
            Ok(vec![None; queries.len()])
        } else {
            script.remove(0)
        }
    }
}

fn fast_api_config() -> ApiConfig {
    ApiConfig {
        requests_per_second: 10_000.0,
        burst: 1_000,
        batch_size: 100,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        },
        breaker: BreakerConfig {
            failure_threshold: 2,
            cooldown_secs: 60,
        },
        ..ApiConfig::default()
    }
}

fn index_with(entries: Vec<(&str, Option<&str>, &str, &str)>) -> Arc<LookupIndex> {
    Arc::new(LookupIndex::build(
        entries
            .into_iter()
            .map(|(name, supplier, state, postcode)| IndexEntry {
                supplier_id: supplier.map(|s| SupplierId::parse(s).unwrap()),
                legacy_id: None,
                name: name.to_string(),
                normalized_name: normalize_name(name),
                state: Some(state.to_string()),
                postcode: Some(postcode.to_string()),
            })
            .collect(),
    ))
}

fn award(id: &str, name: &str, supplier: Option<&str>, state: &str) -> Award {
    Award {
        award_id: id.into(),
        company: AwardCompanyRef {
            raw_name: name.into(),
            supplier_id: supplier.map(|s| SupplierId::parse(s).unwrap()),
            legacy_id: None,
            street: None,
            city: None,
            state: Some(state.into()),
            postcode: None,
        },
        agency: "DOD".into(),
        program: "SBIR".into(),
        phase: AwardPhase::One,
        amount: 150_000.0,
        award_date: chrono::NaiveDate::from_ymd_opt(2021, 6, 30).unwrap(),
        naics: None,
        abstract_text: None,
    }
}

fn registry_match(name: &str) -> Option<RegistryMatch> {
    Some(RegistryMatch {
        supplier_id: None,
        legal_name: name.to_string(),
        state: Some("VA".into()),
        naics: None,
    })
}

#[tokio::test]
async fn test_exact_identifier_high_confidence_scenario() {
    let index = index_with(vec![(
        "Quantum Dynamics Incorporated",
        Some("Q1U2A3N4T5U6M"),
        "VA",
        "22203",
    )]);
    let engine = EnrichmentEngine::new(EnrichmentConfig::default(), index, None);

    let out = engine
        .enrich_chunk(
            vec![award("A-1", "Quantum Dynamics Inc", Some("Q1U2A3N4T5U6M"), "VA")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let recipient = out[0].result_for(FIELD_RECIPIENT).unwrap();
    assert_eq!(recipient.source, EnrichmentSource::IdentifierExact);
    assert_eq!(recipient.confidence.value(), 0.90);
    assert_eq!(
        recipient.enriched_value.as_ref().unwrap().as_str(),
        Some("Quantum Dynamics Incorporated")
    );
}

#[tokio::test]
async fn test_fuzzy_fallback_medium_band_with_competing_evidence() {
    let index = index_with(vec![("ACME ROBOTICS L.L.C.", None, "CA", "94103")]);
    let engine = EnrichmentEngine::new(EnrichmentConfig::default(), index, None);

    let out = engine
        .enrich_chunk(
            vec![award("A-2", "Acme Robotics LLC", None, "CA")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let recipient = out[0].result_for(FIELD_RECIPIENT).unwrap();
    assert_eq!(recipient.source, EnrichmentSource::NameFuzzy);
    assert_eq!(recipient.confidence.band(), ConfidenceBand::Medium);
    // Evidence keeps the similarity score and competing candidates.
    let fuzzy_attempt = recipient
        .evidence
        .iter()
        .find(|a| a.source == EnrichmentSource::NameFuzzy)
        .unwrap();
    assert!(fuzzy_attempt.detail["similarity"].as_f64().unwrap() > 0.95);
    assert!(fuzzy_attempt.detail.get("competing").is_some());
}

#[tokio::test]
async fn test_api_transient_503_then_success() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(EtlError::external_transient("status 503")),
        Err(EtlError::external_transient("status 503")),
        Ok(vec![registry_match("Quantum Dynamics Incorporated")]),
    ]));
    let protected = Arc::new(ProtectedRegistry::new(client.clone(), fast_api_config()));
    let engine = EnrichmentEngine::new(EnrichmentConfig::default(), index_with(vec![]), Some(protected.clone()));

    let out = engine
        .enrich_chunk(
            vec![award("A-3", "Quantum Dynamics", None, "VA")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let recipient = out[0].result_for(FIELD_RECIPIENT).unwrap();
    assert_eq!(recipient.source, EnrichmentSource::ApiLookup);
    assert_eq!(recipient.confidence.value(), 0.85);
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert_eq!(protected.transient_retries(), 2);
    assert_eq!(protected.breaker().state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_breaker_opens_and_chunk_degrades_to_fallbacks() {
    // Every call fails; threshold 2 opens the breaker during the first
    // batch's retries. A later chunk skips the API without a request.
    let client = Arc::new(ScriptedClient::new(vec![
        Err(EtlError::external_transient("status 500")),
        Err(EtlError::external_transient("status 500")),
        Err(EtlError::external_transient("status 500")),
    ]));
    let protected = Arc::new(ProtectedRegistry::new(client.clone(), fast_api_config()));
    let index = index_with(vec![("ACME ROBOTICS L.L.C.", None, "CA", "94103")]);
    let engine = EnrichmentEngine::new(EnrichmentConfig::default(), index, Some(protected.clone()));

    let first = engine
        .enrich_chunk(
            vec![award("B-1", "Acme Robotics LLC", None, "CA")],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    // API errored, engine degraded to fuzzy.
    let recipient = first[0].result_for(FIELD_RECIPIENT).unwrap();
    assert_eq!(recipient.source, EnrichmentSource::NameFuzzy);
    assert_eq!(protected.breaker().state(), BreakerState::Open);

    let calls_before = client.calls.load(Ordering::SeqCst);
    let second = engine
        .enrich_chunk(
            vec![
                award("B-2", "Acme Robotics LLC", None, "CA"),
                award("B-3", "No Such Company At All", None, "CA"),
            ],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    // Breaker open: no new transport calls, attempts recorded as skipped.
    assert_eq!(client.calls.load(Ordering::SeqCst), calls_before);
    let skipped = second[0]
        .result_for(FIELD_RECIPIENT)
        .unwrap()
        .evidence
        .iter()
        .find(|a| a.source == EnrichmentSource::ApiLookup)
        .unwrap();
    assert_eq!(skipped.outcome, AttemptOutcome::Skipped);

    // The unmatched award falls through to the NAICS-style defaults on its
    // naics field and a structured no_match on the recipient field.
    let miss = second[1].result_for(FIELD_RECIPIENT).unwrap();
    assert!(miss.is_miss());
}
