// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Engine
//!
//! The hierarchical per-field fallback engine. For each award and each
//! output field, strategies are attempted in priority order; the first
//! candidate at or above the stop threshold wins immediately, otherwise all
//! candidates are ranked by confidence with a deterministic tie-break
//! (source priority, then chain order). Every attempt (hit, miss, skip, or
//! error) lands in the evidence trail.
//!
//! ## Fields and Chains
//!
//! - `recipient_ref`: identifier exact → legacy identifier → API lookup →
//!   fuzzy name → proximity-accepted fuzzy
//! - `naics`: keep original → agency domain default → sector fallback
//!
//! ## Concurrency Contract
//!
//! CPU-bound phases run across the chunk on the Rayon pool; the API phase
//! batches unresolved awards (≤ configured batch size per request) through
//! the shared [`ProtectedRegistry`], which owns the token bucket, retry
//! schedule, and circuit breaker. A single strategy failure never fails a
//! record: the engine records the error as evidence and degrades down the
//! chain. Cancellation is cooperative: the token is checked between phases
//! and between API batches; a cancelled chunk is discarded whole, completed
//! chunks are kept by the caller.
//!
//! ## Determinism
//!
//! With a fixed configuration and index, enrichment of the same award
//! yields the same winner and confidence. Output order follows input order;
//! callers needing a different order sort by record id.

use crate::infrastructure::config::EnrichmentConfig;
use crate::infrastructure::enrichment::api_client::{ProtectedRegistry, RegistryQuery};
use crate::infrastructure::enrichment::strategies::{
    self, Candidate, BASE_API,
};
use crate::infrastructure::lookup::index::LookupIndex;
use parking_lot::Mutex;
use rayon::prelude::*;
use sbir_graph_domain::entities::{
    AttemptOutcome, Award, EnrichmentResult, EnrichmentSource, StrategyAttempt,
};
use sbir_graph_domain::value_objects::{Confidence, ConfidenceBand, FieldValue};
use sbir_graph_domain::EtlError;
use sbir_graph_bootstrap::CancellationToken;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Field enriched with the recipient organization resolution.
pub const FIELD_RECIPIENT: &str = "recipient_ref";
/// Field enriched with the industry classification.
pub const FIELD_NAICS: &str = "naics";

/// An award with its winning enrichment results.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedAward {
    pub award: Award,
    pub results: Vec<EnrichmentResult>,
}

impl EnrichedAward {
    pub fn result_for(&self, field: &str) -> Option<&EnrichmentResult> {
        self.results.iter().find(|r| r.field_name == field)
    }
}

/// Per-field quality counters, aggregated across the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStats {
    pub total: u64,
    pub matched: u64,
    pub high_band: u64,
    pub medium_band: u64,
    pub low_band: u64,
    pub fallback: u64,
}

impl FieldStats {
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }

    pub fn fallback_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.fallback as f64 / self.total as f64
        }
    }
}

/// Snapshot of engine quality, fed to the gate framework and run report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineQuality {
    pub fields: BTreeMap<String, FieldStats>,
    pub api_transient_retries: u64,
}

/// Tracks one award's progress down the recipient chain.
struct RecipientState {
    attempts: Vec<StrategyAttempt>,
    winner: Option<Candidate>,
    /// Index into the chunk, for API result alignment.
    position: usize,
}

/// The enrichment engine. Share one instance per run.
pub struct EnrichmentEngine {
    config: EnrichmentConfig,
    index: Arc<LookupIndex>,
    registry: Option<Arc<ProtectedRegistry>>,
    stats: Mutex<BTreeMap<String, FieldStats>>,
    /// Dedicated worker pool when `workers > 0`; the global pool otherwise.
    workers: Option<rayon::ThreadPool>,
}

impl EnrichmentEngine {
    pub fn new(
        config: EnrichmentConfig,
        index: Arc<LookupIndex>,
        registry: Option<Arc<ProtectedRegistry>>,
    ) -> Self {
        let workers = if config.workers > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .thread_name(|i| format!("enrich-{}", i))
                .build()
                .ok()
        } else {
            None
        };
        Self {
            config,
            index,
            registry,
            stats: Mutex::new(BTreeMap::new()),
            workers,
        }
    }

    fn on_pool<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.workers {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Enriches one chunk of awards. Output order matches input order.
    pub async fn enrich_chunk(
        &self,
        awards: Vec<Award>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnrichedAward>, EtlError> {
        self.check_cancel(cancel)?;
        let now = chrono::Utc::now();

        // Phase A (CPU, parallel): index-backed strategies per award.
        let mut recipient_states: Vec<RecipientState> = self.on_pool(|| {
            awards
                .par_iter()
                .enumerate()
                .map(|(position, award)| self.recipient_phase_index(award, position))
                .collect::<Result<Vec<_>, EtlError>>()
        })?;

        // Phase B (IO, batched): API lookups for chains that have not stopped.
        self.check_cancel(cancel)?;
        self.api_phase(&awards, &mut recipient_states, cancel).await?;

        // Phase C (CPU, parallel): fuzzy and proximity for the remainder,
        // then ranking, plus the full NAICS chain.
        self.check_cancel(cancel)?;
        let enriched: Vec<EnrichedAward> = self.on_pool(|| {
            awards
                .into_par_iter()
                .zip(recipient_states.into_par_iter())
                .map(|(award, state)| {
                    let recipient = self.recipient_finish(&award, state, now)?;
                    let naics = self.resolve_naics(&award, now)?;
                    Ok(EnrichedAward {
                        award,
                        results: vec![recipient, naics],
                    })
                })
                .collect::<Result<Vec<_>, EtlError>>()
        })?;

        self.record_stats(&enriched);
        Ok(enriched)
    }

    /// Run-level quality snapshot.
    pub fn quality(&self) -> EngineQuality {
        EngineQuality {
            fields: self.stats.lock().clone(),
            api_transient_retries: self.registry.as_ref().map(|r| r.transient_retries()).unwrap_or(0),
        }
    }

    fn check_cancel(&self, cancel: &CancellationToken) -> Result<(), EtlError> {
        if cancel.is_cancelled() {
            Err(EtlError::Cancelled("enrichment chunk abandoned".to_string()))
        } else {
            Ok(())
        }
    }

    fn stops(&self, candidate: &Candidate) -> bool {
        candidate.confidence.meets(self.config.stop_threshold)
    }

    fn recipient_phase_index(&self, award: &Award, position: usize) -> Result<RecipientState, EtlError> {
        let mut state = RecipientState {
            attempts: Vec::new(),
            winner: None,
            position,
        };

        for step in [EnrichmentSource::IdentifierExact, EnrichmentSource::LegacyIdentifier] {
            if state.winner.is_some() {
                state.attempts.push(StrategyAttempt::skipped(step, "stopped_earlier"));
                continue;
            }
            let candidate = match step {
                EnrichmentSource::IdentifierExact => strategies::identifier_exact(award, &self.index)?,
                EnrichmentSource::LegacyIdentifier => strategies::legacy_identifier(award, &self.index)?,
                _ => unreachable!("recipient index phase covers exactly two steps"),
            };
            match candidate {
                Some(c) => {
                    state.attempts.push(attempt_from(&c, AttemptOutcome::Hit));
                    if self.stops(&c) {
                        state.winner = Some(c);
                    }
                    // A below-threshold hit stays ranked via its attempt; the
                    // exact strategies never produce one today, but the rank
                    // step handles it uniformly.
                }
                None => state.attempts.push(StrategyAttempt::miss(step)),
            }
        }
        Ok(state)
    }

    async fn api_phase(
        &self,
        awards: &[Award],
        states: &mut [RecipientState],
        cancel: &CancellationToken,
    ) -> Result<(), EtlError> {
        let Some(registry) = &self.registry else {
            for state in states.iter_mut().filter(|s| s.winner.is_none()) {
                state
                    .attempts
                    .push(StrategyAttempt::skipped(EnrichmentSource::ApiLookup, "disabled"));
            }
            return Ok(());
        };

        let unresolved: Vec<usize> = states
            .iter()
            .filter(|s| s.winner.is_none())
            .map(|s| s.position)
            .collect();
        // Winners skip the API step entirely.
        for state in states.iter_mut().filter(|s| s.winner.is_some()) {
            state
                .attempts
                .push(StrategyAttempt::skipped(EnrichmentSource::ApiLookup, "stopped_earlier"));
        }
        if unresolved.is_empty() {
            return Ok(());
        }

        for batch in unresolved.chunks(self.config.api.batch_size.max(1)) {
            self.check_cancel(cancel)?;
            let queries: Vec<RegistryQuery> = batch
                .iter()
                .map(|i| RegistryQuery {
                    name: awards[*i].company.raw_name.clone(),
                    state: awards[*i].company.state.clone(),
                })
                .collect();

            match registry.lookup_batch(&queries).await {
                Ok(results) => {
                    for (i, result) in batch.iter().zip(results) {
                        let state = &mut states[*i];
                        match result {
                            Some(m) => {
                                let candidate = Candidate {
                                    value: FieldValue::Str(m.legal_name.clone()),
                                    confidence: Confidence::new(BASE_API)?,
                                    source: EnrichmentSource::ApiLookup,
                                    method: "registry_batch_lookup".to_string(),
                                    detail: json!({
                                        "supplier_id": m.supplier_id.as_ref().map(|s| s.as_str()),
                                        "state": m.state,
                                    }),
                                };
                                state.attempts.push(attempt_from(&candidate, AttemptOutcome::Hit));
                                if self.stops(&candidate) {
                                    state.winner = Some(candidate);
                                }
                            }
                            None => state.attempts.push(StrategyAttempt::miss(EnrichmentSource::ApiLookup)),
                        }
                    }
                }
                Err(EtlError::Cancelled(msg)) => return Err(EtlError::Cancelled(msg)),
                Err(e) => {
                    // Degrade this batch to the next strategy; the chain
                    // continues per record.
                    let outcome = if matches!(e, EtlError::CircuitOpen(_)) {
                        AttemptOutcome::Skipped
                    } else {
                        AttemptOutcome::Error
                    };
                    debug!("api phase degraded for batch of {}: {}", batch.len(), e);
                    for i in batch {
                        states[*i].attempts.push(StrategyAttempt {
                            source: EnrichmentSource::ApiLookup,
                            outcome,
                            confidence: None,
                            candidate: None,
                            detail: json!({ "error": e.to_string(), "category": e.category() }),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn recipient_finish(
        &self,
        award: &Award,
        mut state: RecipientState,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<EnrichmentResult, EtlError> {
        if state.winner.is_none() {
            let (fuzzy, proximity, competing) =
                strategies::fuzzy_with_proximity(award, &self.index, &self.config)?;
            match &fuzzy {
                Some(c) => state.attempts.push(attempt_from(c, AttemptOutcome::Hit)),
                None => state.attempts.push(StrategyAttempt {
                    source: EnrichmentSource::NameFuzzy,
                    outcome: AttemptOutcome::Miss,
                    confidence: None,
                    candidate: None,
                    detail: json!({ "competing": competing }),
                }),
            }
            match &proximity {
                Some(c) => state.attempts.push(attempt_from(c, AttemptOutcome::Hit)),
                None => state.attempts.push(StrategyAttempt::miss(EnrichmentSource::Proximity)),
            }
        } else {
            state
                .attempts
                .push(StrategyAttempt::skipped(EnrichmentSource::NameFuzzy, "stopped_earlier"));
            state
                .attempts
                .push(StrategyAttempt::skipped(EnrichmentSource::Proximity, "stopped_earlier"));
        }

        let winner = match state.winner {
            Some(w) => Some(w),
            None => rank_attempts(&state.attempts),
        };

        let original = Some(FieldValue::Str(award.company.raw_name.clone()));
        Ok(match winner {
            Some(c) => EnrichmentResult {
                target_record_id: award.award_id.clone(),
                field_name: FIELD_RECIPIENT.to_string(),
                enriched_value: Some(c.value),
                original_value: original,
                confidence: c.confidence,
                source: c.source,
                method: c.method,
                evidence: state.attempts,
                timestamp: now,
            },
            None => EnrichmentResult::no_match(
                award.award_id.clone(),
                FIELD_RECIPIENT,
                original,
                state.attempts,
                now,
            ),
        })
    }

    fn resolve_naics(
        &self,
        award: &Award,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<EnrichmentResult, EtlError> {
        let mut attempts = Vec::new();
        let mut winner: Option<Candidate> = None;

        let chain: [(EnrichmentSource, Option<Candidate>); 3] = [
            (EnrichmentSource::Original, strategies::keep_original_naics(award)?),
            (
                EnrichmentSource::DomainDefault,
                strategies::domain_default_naics(award, &self.config)?,
            ),
            (
                EnrichmentSource::SectorFallback,
                Some(strategies::sector_fallback(&self.config)?),
            ),
        ];

        for (source, candidate) in chain {
            if winner.is_some() {
                attempts.push(StrategyAttempt::skipped(source, "stopped_earlier"));
                continue;
            }
            match candidate {
                Some(c) => {
                    attempts.push(attempt_from(&c, AttemptOutcome::Hit));
                    if self.stops(&c) {
                        winner = Some(c);
                    }
                }
                None => attempts.push(StrategyAttempt::miss(source)),
            }
        }

        // Below-threshold candidates (domain default, sector fallback) rank.
        let winner = winner.or_else(|| rank_attempts(&attempts));

        let original = award.naics.as_ref().map(|n| FieldValue::Str(n.as_str().to_string()));
        Ok(match winner {
            Some(c) => EnrichmentResult {
                target_record_id: award.award_id.clone(),
                field_name: FIELD_NAICS.to_string(),
                enriched_value: Some(c.value),
                original_value: original,
                confidence: c.confidence,
                source: c.source,
                method: c.method,
                evidence: attempts,
                timestamp: now,
            },
            None => EnrichmentResult::no_match(award.award_id.clone(), FIELD_NAICS, original, attempts, now),
        })
    }

    fn record_stats(&self, enriched: &[EnrichedAward]) {
        let mut stats = self.stats.lock();
        for e in enriched {
            for result in &e.results {
                let field = stats.entry(result.field_name.clone()).or_default();
                field.total += 1;
                if !result.is_miss() {
                    field.matched += 1;
                }
                match result.confidence.band() {
                    ConfidenceBand::High => field.high_band += 1,
                    ConfidenceBand::Medium => field.medium_band += 1,
                    ConfidenceBand::Low => field.low_band += 1,
                }
                if result.source.is_fallback() {
                    field.fallback += 1;
                }
            }
        }
    }
}

fn attempt_from(candidate: &Candidate, outcome: AttemptOutcome) -> StrategyAttempt {
    StrategyAttempt {
        source: candidate.source,
        outcome,
        confidence: Some(candidate.confidence),
        candidate: Some(candidate.value.clone()),
        detail: candidate.detail.clone(),
    }
}

/// Ranks recorded hits: maximum confidence, ties broken by source priority
/// then attempt order. Reconstructs the candidate from the attempt trail.
fn rank_attempts(attempts: &[StrategyAttempt]) -> Option<Candidate> {
    attempts
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Hit)
        .filter_map(|a| {
            Some(Candidate {
                value: a.candidate.clone()?,
                confidence: a.confidence?,
                source: a.source,
                method: format!("ranked_{}", a.source.as_str()),
                detail: a.detail.clone(),
            })
        })
        .max_by(|a, b| {
            a.confidence
                .cmp(&b.confidence)
                // Lower priority value wins a tie, so compare reversed.
                .then_with(|| b.source.priority().cmp(&a.source.priority()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::lookup::index::IndexEntry;
    use sbir_graph_domain::entities::AwardCompanyRef;
    use sbir_graph_domain::services::normalizer::normalize_name;
    use sbir_graph_domain::value_objects::{AwardPhase, SupplierId};

    fn index() -> Arc<LookupIndex> {
        Arc::new(LookupIndex::build(vec![IndexEntry {
            supplier_id: Some(SupplierId::parse("Q1U2A3N4T5U6M").unwrap()),
            legacy_id: None,
            name: "Quantum Dynamics Incorporated".into(),
            normalized_name: normalize_name("Quantum Dynamics Incorporated"),
            state: Some("VA".into()),
            postcode: Some("22203".into()),
        }]))
    }

    fn award(id: &str, name: &str, supplier: Option<&str>) -> Award {
        Award {
            award_id: id.into(),
            company: AwardCompanyRef {
                raw_name: name.into(),
                supplier_id: supplier.map(|s| SupplierId::parse(s).unwrap()),
                legacy_id: None,
                street: None,
                city: None,
                state: Some("VA".into()),
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

    fn engine() -> EnrichmentEngine {
        EnrichmentEngine::new(EnrichmentConfig::default(), index(), None)
    }

    #[tokio::test]
    async fn test_exact_identifier_wins_and_skips_rest() {
        let e = engine();
        let cancel = CancellationToken::new();
        let out = e
            .enrich_chunk(vec![award("A-1", "Quantum Dynamics Inc", Some("Q1U2A3N4T5U6M"))], &cancel)
            .await
            .unwrap();

        let recipient = out[0].result_for(FIELD_RECIPIENT).unwrap();
        assert_eq!(recipient.source, EnrichmentSource::IdentifierExact);
        assert_eq!(recipient.confidence.value(), 0.90);
        assert_eq!(
            recipient.enriched_value.as_ref().unwrap().as_str(),
            Some("Quantum Dynamics Incorporated")
        );
        // Later strategies are recorded as skipped evidence.
        assert!(recipient
            .evidence
            .iter()
            .any(|a| a.source == EnrichmentSource::NameFuzzy && a.outcome == AttemptOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_fuzzy_fallback_after_identifier_miss() {
        let e = engine();
        let cancel = CancellationToken::new();
        let out = e
            .enrich_chunk(vec![award("A-2", "Quantum Dynamics Incorporated", None)], &cancel)
            .await
            .unwrap();

        let recipient = out[0].result_for(FIELD_RECIPIENT).unwrap();
        assert_eq!(recipient.source, EnrichmentSource::NameFuzzy);
        assert_eq!(recipient.confidence.band(), ConfidenceBand::Medium);
        // Evidence records the identifier misses ahead of the fuzzy hit.
        assert!(recipient
            .evidence
            .iter()
            .any(|a| a.source == EnrichmentSource::IdentifierExact && a.outcome == AttemptOutcome::Miss));
    }

    #[tokio::test]
    async fn test_no_match_produces_zero_confidence_record() {
        let e = engine();
        let cancel = CancellationToken::new();
        let out = e
            .enrich_chunk(vec![award("A-3", "Completely Unrelated Name", None)], &cancel)
            .await
            .unwrap();

        let recipient = out[0].result_for(FIELD_RECIPIENT).unwrap();
        assert!(recipient.is_miss());
        assert_eq!(recipient.confidence, Confidence::ZERO);
        assert!(recipient.enriched_value.is_none());
        assert!(!recipient.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_naics_chain_falls_back_by_rank() {
        let e = engine();
        let cancel = CancellationToken::new();
        let out = e
            .enrich_chunk(vec![award("A-4", "Quantum Dynamics Inc", None)], &cancel)
            .await
            .unwrap();

        let naics = out[0].result_for(FIELD_NAICS).unwrap();
        // No original, DOD default (0.50) outranks sector fallback (0.30).
        assert_eq!(naics.source, EnrichmentSource::DomainDefault);
        assert_eq!(naics.enriched_value.as_ref().unwrap().as_str(), Some("330000"));
    }

    #[tokio::test]
    async fn test_cancelled_chunk_is_discarded() {
        let e = engine();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = e
            .enrich_chunk(vec![award("A-5", "X", None)], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_determinism() {
        let e = engine();
        let cancel = CancellationToken::new();
        let a = vec![award("A-6", "Quantum Dynamics Incorporated", None)];
        let first = e.enrich_chunk(a.clone(), &cancel).await.unwrap();
        let second = e.enrich_chunk(a, &cancel).await.unwrap();
        let f = first[0].result_for(FIELD_RECIPIENT).unwrap();
        let s = second[0].result_for(FIELD_RECIPIENT).unwrap();
        assert_eq!(f.enriched_value, s.enriched_value);
        assert_eq!(f.confidence, s.confidence);
        assert_eq!(f.source, s.source);
    }

    #[tokio::test]
    async fn test_quality_snapshot_accumulates() {
        let e = engine();
        let cancel = CancellationToken::new();
        e.enrich_chunk(
            vec![
                award("A-7", "Quantum Dynamics Inc", Some("Q1U2A3N4T5U6M")),
                award("A-8", "Unmatched Name Co", None),
            ],
            &cancel,
        )
        .await
        .unwrap();

        let quality = e.quality();
        let recipient = &quality.fields[FIELD_RECIPIENT];
        assert_eq!(recipient.total, 2);
        assert_eq!(recipient.matched, 1);
        let naics = &quality.fields[FIELD_NAICS];
        assert_eq!(naics.fallback, 2);
    }
}
