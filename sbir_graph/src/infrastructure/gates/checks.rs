// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Check Definitions and Evaluation
//!
//! A check is `(check_name, severity, metric, comparison, threshold,
//! description)`, bound to an asset in its definition. Materializers expose
//! named metrics; the runtime injects `row_count` itself, so every asset can
//! gate on emptiness without custom metric plumbing.

use sbir_graph_domain::entities::{CheckResult, CheckSeverity};
use std::collections::BTreeMap;

/// Metric key the runtime injects for every asset.
pub const ROW_COUNT_METRIC: &str = "row_count";

/// Direction of the threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Observed must be ≥ threshold (match rates, row counts).
    AtLeast,
    /// Observed must be ≤ threshold (error fractions, fallback rates).
    AtMost,
}

/// One declarative check.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheck {
    pub name: String,
    pub severity: CheckSeverity,
    pub metric: String,
    pub comparison: Comparison,
    pub threshold: f64,
    pub description: String,
}

impl QualityCheck {
    pub fn error(
        name: impl Into<String>,
        metric: impl Into<String>,
        comparison: Comparison,
        threshold: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            severity: CheckSeverity::Error,
            metric: metric.into(),
            comparison,
            threshold,
            description: description.into(),
        }
    }

    pub fn warn(
        name: impl Into<String>,
        metric: impl Into<String>,
        comparison: Comparison,
        threshold: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            severity: CheckSeverity::Warn,
            metric: metric.into(),
            comparison,
            threshold,
            description: description.into(),
        }
    }
}

/// Evaluates checks against the materialized metrics. A metric the
/// materializer never emitted evaluates as a failure; a check against a
/// missing metric is a wiring bug that must surface, not pass silently.
pub fn evaluate_checks(checks: &[QualityCheck], metrics: &BTreeMap<String, f64>) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|check| {
            let observed = metrics.get(&check.metric).copied();
            let passed = match (observed, check.comparison) {
                (None, _) => false,
                (Some(v), Comparison::AtLeast) => v >= check.threshold,
                (Some(v), Comparison::AtMost) => v <= check.threshold,
            };
            CheckResult {
                check_name: check.name.clone(),
                severity: check.severity,
                passed,
                observed: observed.unwrap_or(f64::NAN),
                threshold: check.threshold,
                description: check.description.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_at_least_and_at_most() {
        let checks = vec![
            QualityCheck::error("non_empty", ROW_COUNT_METRIC, Comparison::AtLeast, 1.0, "output has rows"),
            QualityCheck::warn("low_fallback", "fallback_rate", Comparison::AtMost, 0.2, "fallbacks bounded"),
        ];
        let results = evaluate_checks(&checks, &metrics(&[(ROW_COUNT_METRIC, 10.0), ("fallback_rate", 0.35)]));
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(!results[1].is_blocking_failure()); // WARN never blocks
    }

    #[test]
    fn test_error_failure_blocks() {
        let checks = vec![QualityCheck::error(
            "match_rate_floor",
            "recipient_match_rate",
            Comparison::AtLeast,
            0.70,
            "enrichment match rate acceptable",
        )];
        let results = evaluate_checks(&checks, &metrics(&[("recipient_match_rate", 0.55)]));
        assert!(results[0].is_blocking_failure());
    }

    #[test]
    fn test_missing_metric_fails() {
        let checks = vec![QualityCheck::error("x", "absent_metric", Comparison::AtLeast, 0.0, "")];
        let results = evaluate_checks(&checks, &metrics(&[]));
        assert!(!results[0].passed);
        assert!(results[0].observed.is_nan());
    }
}
