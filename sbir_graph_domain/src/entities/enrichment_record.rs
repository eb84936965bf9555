// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Results
//!
//! The output of one enrichment decision: for a `(target_record_id, field)`
//! pair, the winning value with its source tag, method, confidence, and the
//! full evidence trail of every strategy attempt: hits, misses, skips, and
//! errors alike. Losing candidates stay in the evidence as alternates so a
//! reviewer can audit near-misses without re-running the engine.
//!
//! ## Invariant
//!
//! At most one winning result per `(record, field)` per run. A field no
//! strategy could resolve still produces a result: `NoMatch` source,
//! confidence zero, empty value.

use crate::value_objects::{Confidence, FieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag of an enrichment value, in fallback-chain priority order.
///
/// The discriminant order doubles as the deterministic tie-break when two
/// strategies produce equal confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    Original,
    IdentifierExact,
    LegacyIdentifier,
    ApiLookup,
    NameFuzzy,
    Proximity,
    DomainDefault,
    SectorFallback,
    NoMatch,
}

impl EnrichmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentSource::Original => "original",
            EnrichmentSource::IdentifierExact => "identifier_exact",
            EnrichmentSource::LegacyIdentifier => "legacy_identifier",
            EnrichmentSource::ApiLookup => "api_lookup",
            EnrichmentSource::NameFuzzy => "name_fuzzy",
            EnrichmentSource::Proximity => "proximity",
            EnrichmentSource::DomainDefault => "domain_default",
            EnrichmentSource::SectorFallback => "sector_fallback",
            EnrichmentSource::NoMatch => "no_match",
        }
    }

    /// Lower value = higher priority in tie-breaks.
    pub fn priority(&self) -> u8 {
        *self as u8
    }

    /// True for the last-resort strategies counted into the fallback rate.
    pub fn is_fallback(&self) -> bool {
        matches!(self, EnrichmentSource::DomainDefault | EnrichmentSource::SectorFallback)
    }
}

/// Outcome of a single strategy attempt, kept as evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Strategy produced a candidate value.
    Hit,
    /// Strategy ran but found nothing.
    Miss,
    /// Strategy was disabled, circuit-open, or preempted by an earlier stop.
    Skipped,
    /// Strategy failed (e.g. API error); engine degraded to the next one.
    Error,
}

/// One entry in the evidence trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub source: EnrichmentSource,
    pub outcome: AttemptOutcome,
    pub confidence: Option<Confidence>,
    pub candidate: Option<FieldValue>,
    /// Free-form supporting detail: similarity scores, competing candidates,
    /// HTTP status, retry counts.
    pub detail: serde_json::Value,
}

impl StrategyAttempt {
    pub fn miss(source: EnrichmentSource) -> Self {
        Self {
            source,
            outcome: AttemptOutcome::Miss,
            confidence: None,
            candidate: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn skipped(source: EnrichmentSource, reason: &str) -> Self {
        Self {
            source,
            outcome: AttemptOutcome::Skipped,
            confidence: None,
            candidate: None,
            detail: serde_json::json!({ "reason": reason }),
        }
    }
}

/// The winning enrichment decision for one `(record, field)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub target_record_id: String,
    pub field_name: String,
    pub enriched_value: Option<FieldValue>,
    pub original_value: Option<FieldValue>,
    pub confidence: Confidence,
    pub source: EnrichmentSource,
    /// Human-readable method description, e.g. `token_sort_ratio>=0.80`.
    pub method: String,
    /// Full attempt trail, winners and losers alike.
    pub evidence: Vec<StrategyAttempt>,
    pub timestamp: DateTime<Utc>,
}

impl EnrichmentResult {
    /// The structured result for a field nothing could resolve.
    pub fn no_match(
        target_record_id: impl Into<String>,
        field_name: impl Into<String>,
        original_value: Option<FieldValue>,
        evidence: Vec<StrategyAttempt>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            target_record_id: target_record_id.into(),
            field_name: field_name.into(),
            enriched_value: None,
            original_value,
            confidence: Confidence::ZERO,
            source: EnrichmentSource::NoMatch,
            method: "no_match".to_string(),
            evidence,
            timestamp,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.source == EnrichmentSource::NoMatch
    }
}
