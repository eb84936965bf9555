// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Benchmarks
//!
//! Historical baselines for the enrichment engine over the fixed sample.
//! `benchmark --baseline <path>` re-runs the engine and compares match
//! rates per field against the stored baseline; a drop beyond the
//! configured tolerance is a regression and fails the command.

use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Stored baseline: match rate per enriched field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkBaseline {
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    pub sample_rows: u64,
    pub match_rates: BTreeMap<String, f64>,
}

impl BenchmarkBaseline {
    pub async fn load(path: &Path) -> Result<Self, EtlError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            EtlError::source_unavailable(format!("baseline {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn save(&self, path: &Path) -> Result<(), EtlError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(self)?).await?;
        Ok(())
    }
}

/// One field's comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field: String,
    pub baseline: f64,
    pub observed: f64,
    pub regressed: bool,
}

/// Outcome of a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkOutcome {
    pub comparisons: Vec<FieldComparison>,
}

impl BenchmarkOutcome {
    pub fn has_regression(&self) -> bool {
        self.comparisons.iter().any(|c| c.regressed)
    }
}

/// Compares observed match rates against the baseline. Only drops count;
/// improvements never fail, and fields new since the baseline are reported
/// without a regression flag.
pub fn compare_against_baseline(
    baseline: &BenchmarkBaseline,
    observed: &BTreeMap<String, f64>,
    tolerance: f64,
) -> BenchmarkOutcome {
    let mut comparisons = Vec::new();
    for (field, observed_rate) in observed {
        let baseline_rate = baseline.match_rates.get(field).copied();
        match baseline_rate {
            Some(base) => comparisons.push(FieldComparison {
                field: field.clone(),
                baseline: base,
                observed: *observed_rate,
                regressed: *observed_rate < base - tolerance,
            }),
            None => comparisons.push(FieldComparison {
                field: field.clone(),
                baseline: f64::NAN,
                observed: *observed_rate,
                regressed: false,
            }),
        }
    }
    BenchmarkOutcome { comparisons }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(rate: f64) -> BenchmarkBaseline {
        let mut match_rates = BTreeMap::new();
        match_rates.insert("recipient_ref".to_string(), rate);
        BenchmarkBaseline {
            recorded_at: chrono::Utc::now(),
            sample_rows: 500,
            match_rates,
        }
    }

    fn observed(rate: f64) -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("recipient_ref".to_string(), rate);
        m
    }

    #[test]
    fn test_drop_beyond_tolerance_is_regression() {
        let outcome = compare_against_baseline(&baseline(0.85), &observed(0.80), 0.02);
        assert!(outcome.has_regression());
    }

    #[test]
    fn test_drop_within_tolerance_passes() {
        let outcome = compare_against_baseline(&baseline(0.85), &observed(0.84), 0.02);
        assert!(!outcome.has_regression());
    }

    #[test]
    fn test_improvement_never_regresses() {
        let outcome = compare_against_baseline(&baseline(0.85), &observed(0.95), 0.02);
        assert!(!outcome.has_regression());
    }

    #[tokio::test]
    async fn test_baseline_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        baseline(0.85).save(&path).await.unwrap();
        let loaded = BenchmarkBaseline::load(&path).await.unwrap();
        assert_eq!(loaded.match_rates["recipient_ref"], 0.85);
    }
}
