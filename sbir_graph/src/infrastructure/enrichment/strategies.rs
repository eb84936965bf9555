// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Strategies
//!
//! The individual match strategies of the fallback chain, as pure functions
//! from an award plus resources to an optional candidate. The engine owns
//! ordering, stop thresholds, batching, and evidence; strategies only
//! produce candidates with their base confidence.
//!
//! Base confidences (scaled where noted):
//!
//! | Strategy | Base |
//! |---|---|
//! | keep original | 0.95 |
//! | identifier exact | 0.90 |
//! | legacy identifier | 0.85 |
//! | API lookup | 0.85 |
//! | fuzzy name | 0.70 × similarity |
//! | proximity-accepted fuzzy | 0.70 × similarity + 0.05 |
//! | domain default | 0.50 |
//! | sector fallback | 0.30 |

use crate::infrastructure::config::EnrichmentConfig;
use crate::infrastructure::lookup::index::{IndexEntry, LookupIndex};
use sbir_graph_domain::entities::{Award, EnrichmentSource};
use sbir_graph_domain::services::normalizer::{normalize_name, zip5};
use sbir_graph_domain::services::similarity::{jaro_winkler, token_sort_ratio};
use sbir_graph_domain::value_objects::{Confidence, FieldValue};
use sbir_graph_domain::EtlError;
use serde_json::json;

pub const BASE_ORIGINAL: f64 = 0.95;
pub const BASE_IDENTIFIER_EXACT: f64 = 0.90;
pub const BASE_LEGACY: f64 = 0.85;
pub const BASE_API: f64 = 0.85;
pub const BASE_FUZZY: f64 = 0.70;
pub const PROXIMITY_BONUS: f64 = 0.05;
pub const BASE_DOMAIN_DEFAULT: f64 = 0.50;
pub const BASE_SECTOR_FALLBACK: f64 = 0.30;

/// Names below this length also consult Jaro-Winkler, which behaves better
/// than edit distance on short strings.
const SHORT_NAME_LEN: usize = 8;

/// One candidate value produced by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub value: FieldValue,
    pub confidence: Confidence,
    pub source: EnrichmentSource,
    pub method: String,
    pub detail: serde_json::Value,
}

/// Strategy 1 for the NAICS field: keep the award's own code when present
/// and format-valid.
pub fn keep_original_naics(award: &Award) -> Result<Option<Candidate>, EtlError> {
    match &award.naics {
        Some(code) => Ok(Some(Candidate {
            value: FieldValue::Str(code.as_str().to_string()),
            confidence: Confidence::new(BASE_ORIGINAL)?,
            source: EnrichmentSource::Original,
            method: "original_naics_format_valid".to_string(),
            detail: json!({ "code": code.as_str() }),
        })),
        None => Ok(None),
    }
}

/// Strategy 2: exact supplier-id match against the lookup index.
pub fn identifier_exact(award: &Award, index: &LookupIndex) -> Result<Option<Candidate>, EtlError> {
    let Some(sid) = &award.company.supplier_id else {
        return Ok(None);
    };
    let Some(entry) = index.by_supplier_id(sid) else {
        return Ok(None);
    };
    Ok(Some(Candidate {
        value: FieldValue::Str(entry.name.clone()),
        confidence: Confidence::new(BASE_IDENTIFIER_EXACT)?,
        source: EnrichmentSource::IdentifierExact,
        method: "supplier_id_exact".to_string(),
        detail: json!({
            "supplier_id": sid.as_str(),
            "registered_state": entry.state,
        }),
    }))
}

/// Strategy 3: exact 9-digit legacy identifier match.
pub fn legacy_identifier(award: &Award, index: &LookupIndex) -> Result<Option<Candidate>, EtlError> {
    let Some(lid) = &award.company.legacy_id else {
        return Ok(None);
    };
    let Some(entry) = index.by_legacy_id(lid) else {
        return Ok(None);
    };
    Ok(Some(Candidate {
        value: FieldValue::Str(entry.name.clone()),
        confidence: Confidence::new(BASE_LEGACY)?,
        source: EnrichmentSource::LegacyIdentifier,
        method: "legacy_id_exact".to_string(),
        detail: json!({
            "legacy_id": lid.as_str(),
            "registered_state": entry.state,
        }),
    }))
}

/// Scored fuzzy candidate retained for evidence even when it loses.
#[derive(Debug, Clone)]
struct ScoredEntry<'a> {
    entry: &'a IndexEntry,
    score: f64,
}

fn score_name(query_normalized: &str, entry: &IndexEntry) -> f64 {
    let token_sort = token_sort_ratio(query_normalized, &entry.normalized_name);
    if query_normalized.len() < SHORT_NAME_LEN {
        token_sort.max(jaro_winkler(query_normalized, &entry.normalized_name))
    } else {
        token_sort
    }
}

/// Strategies 5 and 6: fuzzy name match, with the proximity filter accepting
/// near-misses whose addresses agree.
///
/// Returns `(fuzzy_candidate, proximity_candidate, competing)`: at most one
/// of the two candidates is `Some`, and `competing` is the evidence list of
/// runner-up scores.
pub fn fuzzy_with_proximity(
    award: &Award,
    index: &LookupIndex,
    config: &EnrichmentConfig,
) -> Result<(Option<Candidate>, Option<Candidate>, serde_json::Value), EtlError> {
    let query = normalize_name(&award.company.raw_name);
    if query.is_empty() {
        return Ok((None, None, serde_json::Value::Null));
    }

    // Restrict the scan by state when the award carries one.
    let pool: Vec<&IndexEntry> = match award.company.state.as_deref() {
        Some(state) => index.entries_in_state(state),
        None => index.entries().iter().collect(),
    };

    let mut scored: Vec<ScoredEntry<'_>> = pool
        .into_iter()
        .map(|entry| ScoredEntry {
            score: score_name(&query, entry),
            entry,
        })
        .filter(|s| s.score >= config.fuzzy_medium_threshold)
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let competing = json!(scored
        .iter()
        .take(3)
        .map(|s| json!({ "name": s.entry.name, "score": s.score }))
        .collect::<Vec<_>>());

    let Some(best) = scored.first() else {
        return Ok((None, None, competing));
    };

    if best.score >= config.fuzzy_high_threshold {
        let candidate = Candidate {
            value: FieldValue::Str(best.entry.name.clone()),
            confidence: Confidence::scaled(BASE_FUZZY, best.score)?,
            source: EnrichmentSource::NameFuzzy,
            method: format!("token_sort_ratio>={:.2}", config.fuzzy_high_threshold),
            detail: json!({
                "similarity": best.score,
                "competing": competing,
            }),
        };
        return Ok((Some(candidate), None, competing));
    }

    // Near-miss: accept only when postcodes agree on the configured prefix.
    let zip_agrees = match (award.company.postcode.as_deref(), best.entry.postcode.as_deref()) {
        (Some(a), Some(b)) => {
            let n = config.proximity_zip_prefix;
            zip5(a).len() >= n && zip5(b).len() >= n && zip5(a)[..n] == zip5(b)[..n]
        }
        _ => false,
    };
    if zip_agrees {
        let confidence = Confidence::new((BASE_FUZZY * best.score + PROXIMITY_BONUS).min(1.0))?;
        let candidate = Candidate {
            value: FieldValue::Str(best.entry.name.clone()),
            confidence,
            source: EnrichmentSource::Proximity,
            method: format!("fuzzy>={:.2}+zip{}", config.fuzzy_medium_threshold, config.proximity_zip_prefix),
            detail: json!({
                "similarity": best.score,
                "award_zip": award.company.postcode,
                "candidate_zip": best.entry.postcode,
                "competing": competing,
            }),
        };
        return Ok((None, Some(candidate), competing));
    }

    Ok((None, None, competing))
}

/// Strategy 7 for NAICS: agency → default sector family.
pub fn domain_default_naics(award: &Award, config: &EnrichmentConfig) -> Result<Option<Candidate>, EtlError> {
    let Some(sector) = config.agency_sector_defaults.get(&award.agency) else {
        return Ok(None);
    };
    Ok(Some(Candidate {
        value: FieldValue::Str(format!("{:0<6}", sector)),
        confidence: Confidence::new(BASE_DOMAIN_DEFAULT)?,
        source: EnrichmentSource::DomainDefault,
        method: "agency_sector_default".to_string(),
        detail: json!({ "agency": award.agency, "sector": sector }),
    }))
}

/// Strategy 8: the catch-all sector code.
pub fn sector_fallback(config: &EnrichmentConfig) -> Result<Candidate, EtlError> {
    Ok(Candidate {
        value: FieldValue::Str(config.sector_fallback_code.clone()),
        confidence: Confidence::new(BASE_SECTOR_FALLBACK)?,
        source: EnrichmentSource::SectorFallback,
        method: "sector_catch_all".to_string(),
        detail: json!({ "code": config.sector_fallback_code }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_graph_domain::entities::AwardCompanyRef;
    use sbir_graph_domain::value_objects::{AwardPhase, NaicsCode, SupplierId};

    fn index() -> LookupIndex {
        LookupIndex::build(vec![
            IndexEntry {
                supplier_id: Some(SupplierId::parse("Q1U2A3N4T5U6M").unwrap()),
                legacy_id: None,
                name: "Quantum Dynamics Incorporated".into(),
                normalized_name: normalize_name("Quantum Dynamics Incorporated"),
                state: Some("VA".into()),
                postcode: Some("22203".into()),
            },
            IndexEntry {
                supplier_id: None,
                legacy_id: None,
                name: "ACME ROBOTICS L.L.C.".into(),
                normalized_name: normalize_name("ACME ROBOTICS L.L.C."),
                state: Some("CA".into()),
                postcode: Some("94103".into()),
            },
        ])
    }

    fn award(name: &str, supplier: Option<&str>, state: Option<&str>) -> Award {
        Award {
            award_id: "A-1".into(),
            company: AwardCompanyRef {
                raw_name: name.into(),
                supplier_id: supplier.map(|s| SupplierId::parse(s).unwrap()),
                legacy_id: None,
                street: None,
                city: None,
                state: state.map(String::from),
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

    #[test]
    fn test_identifier_exact_hits_registry() {
        let idx = index();
        let a = award("Quantum Dynamics Inc", Some("Q1U2A3N4T5U6M"), Some("VA"));
        let candidate = identifier_exact(&a, &idx).unwrap().unwrap();
        assert_eq!(candidate.value.as_str(), Some("Quantum Dynamics Incorporated"));
        assert_eq!(candidate.confidence.value(), BASE_IDENTIFIER_EXACT);
        assert_eq!(candidate.source, EnrichmentSource::IdentifierExact);
    }

    #[test]
    fn test_fuzzy_match_scales_confidence() {
        let idx = index();
        let cfg = EnrichmentConfig::default();
        let a = award("Acme Robotics LLC", None, Some("CA"));
        let (fuzzy, proximity, _) = fuzzy_with_proximity(&a, &idx, &cfg).unwrap();
        assert!(proximity.is_none());
        let candidate = fuzzy.unwrap();
        assert_eq!(candidate.source, EnrichmentSource::NameFuzzy);
        // Normalized forms are identical, so similarity is 1.0.
        assert!((candidate.confidence.value() - BASE_FUZZY).abs() < 1e-9);
        assert!(candidate.detail["similarity"].as_f64().unwrap() > 0.99);
    }

    #[test]
    fn test_proximity_accepts_near_miss_when_zip_agrees() {
        let idx = index();
        let mut cfg = EnrichmentConfig::default();
        cfg.fuzzy_high_threshold = 0.999; // force the exact-name case below high
        let mut a = award("Acme Robotic", None, Some("CA"));
        a.company.postcode = Some("94105".into());
        let (fuzzy, proximity, _) = fuzzy_with_proximity(&a, &idx, &cfg).unwrap();
        assert!(fuzzy.is_none());
        let candidate = proximity.expect("zip prefix 941 agrees");
        assert_eq!(candidate.source, EnrichmentSource::Proximity);
    }

    #[test]
    fn test_domain_default_and_sector_fallback() {
        let cfg = EnrichmentConfig::default();
        let a = award("Unknown Corp", None, None);
        let dd = domain_default_naics(&a, &cfg).unwrap().unwrap();
        assert_eq!(dd.value.as_str(), Some("330000"));
        assert_eq!(dd.confidence.value(), BASE_DOMAIN_DEFAULT);

        let sf = sector_fallback(&cfg).unwrap();
        assert_eq!(sf.value.as_str(), Some("541715"));
        assert_eq!(sf.confidence.value(), BASE_SECTOR_FALLBACK);
    }

    #[test]
    fn test_keep_original_naics() {
        let mut a = award("X", None, None);
        a.naics = Some(NaicsCode::parse("541715").unwrap());
        let c = keep_original_naics(&a).unwrap().unwrap();
        assert_eq!(c.confidence.value(), BASE_ORIGINAL);
        assert_eq!(c.source, EnrichmentSource::Original);
    }
}
