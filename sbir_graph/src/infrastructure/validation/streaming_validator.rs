// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Validator Implementation
//!
//! Chunk-at-a-time validation with bounded state. Uniqueness tracking holds
//! one hash set per tracked key field; completeness holds two counters per
//! tracked field. Nothing else accumulates, so validation memory stays flat
//! regardless of stream size.

use sbir_graph_domain::services::validation::{
    evaluate_record_rule, FiredRule, RecordTag, RuleKind, RuleSeverity, ValidatedRecord,
    ValidationRule,
};
use sbir_graph_domain::value_objects::{Record, RecordChunk};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Aggregate outcome of one validated stream, fed to the gate framework.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    pub records_seen: u64,
    pub records_ok: u64,
    pub records_warn: u64,
    pub records_error: u64,
    /// Aggregate rules that fired at stream end.
    pub aggregate_failures: Vec<FiredRule>,
}

impl StreamSummary {
    /// True when any ERROR-severity rule fired, per record or aggregate.
    pub fn has_blocking_failure(&self) -> bool {
        self.records_error > 0
            || self
                .aggregate_failures
                .iter()
                .any(|f| f.severity == RuleSeverity::Error)
    }

    /// Fraction of records tagged ERROR.
    pub fn error_fraction(&self) -> f64 {
        if self.records_seen == 0 {
            0.0
        } else {
            self.records_error as f64 / self.records_seen as f64
        }
    }
}

struct UniquenessState {
    rule_name: String,
    severity: RuleSeverity,
    field: String,
    seen: HashSet<String>,
    duplicates: Vec<String>,
}

struct CompletenessState {
    rule_name: String,
    severity: RuleSeverity,
    field: String,
    min_fraction: f64,
    present: u64,
    total: u64,
}

/// Validates chunks against a declared rule set.
pub struct StreamingValidator {
    record_rules: Vec<ValidationRule>,
    uniqueness: Vec<UniquenessState>,
    completeness: Vec<CompletenessState>,
    summary: StreamSummary,
}

impl StreamingValidator {
    /// Duplicate keys retained for the failure report.
    const MAX_DUPLICATE_SAMPLES: usize = 20;

    pub fn new(rules: Vec<ValidationRule>) -> Self {
        let mut record_rules = Vec::new();
        let mut uniqueness = Vec::new();
        let mut completeness = Vec::new();

        for rule in rules {
            match &rule.kind {
                RuleKind::Uniqueness { field } => uniqueness.push(UniquenessState {
                    rule_name: rule.name.clone(),
                    severity: rule.severity,
                    field: field.clone(),
                    seen: HashSet::new(),
                    duplicates: Vec::new(),
                }),
                RuleKind::Completeness { field, min_fraction } => {
                    completeness.push(CompletenessState {
                        rule_name: rule.name.clone(),
                        severity: rule.severity,
                        field: field.clone(),
                        min_fraction: *min_fraction,
                        present: 0,
                        total: 0,
                    })
                }
                _ => record_rules.push(rule),
            }
        }

        Self {
            record_rules,
            uniqueness,
            completeness,
            summary: StreamSummary::default(),
        }
    }

    /// Validates one chunk, preserving record order.
    pub fn validate_chunk(&mut self, chunk: &RecordChunk) -> Vec<ValidatedRecord> {
        chunk.records.iter().map(|r| self.validate_record(r)).collect()
    }

    fn validate_record(&mut self, record: &Record) -> ValidatedRecord {
        let mut fired: Vec<FiredRule> = self
            .record_rules
            .iter()
            .filter_map(|rule| evaluate_record_rule(rule, record))
            .collect();

        // Uniqueness fires on the duplicate occurrence, not the first.
        for state in &mut self.uniqueness {
            if let Some(value) = record.get(&state.field).filter(|v| !v.is_null()) {
                let key = value.to_string();
                if !state.seen.insert(key.clone()) {
                    if state.duplicates.len() < Self::MAX_DUPLICATE_SAMPLES {
                        state.duplicates.push(key.clone());
                    }
                    fired.push(FiredRule {
                        rule_name: state.rule_name.clone(),
                        severity: state.severity,
                        message: format!("duplicate {} '{}'", state.field, key),
                    });
                }
            }
        }

        for state in &mut self.completeness {
            state.total += 1;
            if !record.is_null_or_missing(&state.field) {
                state.present += 1;
            }
        }

        let validated = ValidatedRecord::from_fired(record.clone(), fired);
        self.summary.records_seen += 1;
        match validated.tag {
            RecordTag::Ok => self.summary.records_ok += 1,
            RecordTag::Warn => self.summary.records_warn += 1,
            RecordTag::Error => self.summary.records_error += 1,
        }
        validated
    }

    /// Finalizes aggregate rules and returns the stream summary.
    pub fn finish(mut self) -> StreamSummary {
        for state in &self.uniqueness {
            if !state.duplicates.is_empty() {
                self.summary.aggregate_failures.push(FiredRule {
                    rule_name: state.rule_name.clone(),
                    severity: state.severity,
                    message: format!(
                        "{} duplicate values in '{}'; samples: {:?}",
                        state.duplicates.len(),
                        state.field,
                        state.duplicates
                    ),
                });
            }
        }
        for state in &self.completeness {
            let fraction = if state.total == 0 {
                1.0
            } else {
                state.present as f64 / state.total as f64
            };
            if fraction < state.min_fraction {
                self.summary.aggregate_failures.push(FiredRule {
                    rule_name: state.rule_name.clone(),
                    severity: state.severity,
                    message: format!(
                        "'{}' non-null fraction {:.3} below {:.3}",
                        state.field, fraction, state.min_fraction
                    ),
                });
            }
        }
        debug!(
            seen = self.summary.records_seen,
            errors = self.summary.records_error,
            aggregate_failures = self.summary.aggregate_failures.len(),
            "validation stream finished"
        );
        self.summary
    }

    /// Per-severity counts by rule name, for the run report.
    pub fn fired_counts(validated: &[ValidatedRecord]) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for v in validated {
            for f in &v.fired {
                *counts.entry(f.rule_name.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_graph_domain::value_objects::FieldValue;

    fn rules() -> Vec<ValidationRule> {
        vec![
            ValidationRule {
                name: "award_id_unique".into(),
                severity: RuleSeverity::Error,
                kind: RuleKind::Uniqueness {
                    field: "award_id".into(),
                },
            },
            ValidationRule {
                name: "amount_non_negative".into(),
                severity: RuleSeverity::Error,
                kind: RuleKind::Range {
                    field: "amount".into(),
                    min: Some(0.0),
                    max: None,
                },
            },
            ValidationRule {
                name: "abstract_mostly_present".into(),
                severity: RuleSeverity::Warn,
                kind: RuleKind::Completeness {
                    field: "abstract".into(),
                    min_fraction: 0.5,
                },
            },
        ]
    }

    fn record(id: &str, amount: f64) -> Record {
        Record::new()
            .with("award_id", FieldValue::Str(id.into()))
            .with("amount", FieldValue::Float(amount))
            .with("abstract", FieldValue::Null)
    }

    #[test]
    fn test_duplicate_award_id_fires_error() {
        let mut validator = StreamingValidator::new(rules());
        let chunk = RecordChunk::new(0, vec![record("A-9", 100.0), record("A-9", 200.0)]);
        let validated = validator.validate_chunk(&chunk);

        assert_eq!(validated[0].tag, RecordTag::Ok);
        assert_eq!(validated[1].tag, RecordTag::Error);

        let summary = validator.finish();
        assert!(summary.has_blocking_failure());
        assert_eq!(summary.aggregate_failures.len(), 2); // uniqueness + completeness
    }

    #[test]
    fn test_uniqueness_tracks_across_chunks() {
        let mut validator = StreamingValidator::new(rules());
        validator.validate_chunk(&RecordChunk::new(0, vec![record("A-1", 1.0)]));
        let second = validator.validate_chunk(&RecordChunk::new(1, vec![record("A-1", 2.0)]));
        assert_eq!(second[0].tag, RecordTag::Error);
    }

    #[test]
    fn test_negative_amount_fires_range_rule() {
        let mut validator = StreamingValidator::new(rules());
        let validated = validator.validate_chunk(&RecordChunk::new(0, vec![record("A-1", -5.0)]));
        assert_eq!(validated[0].tag, RecordTag::Error);
        assert_eq!(validated[0].fired[0].rule_name, "amount_non_negative");
    }

    #[test]
    fn test_clean_stream_has_no_blocking_failure() {
        let mut validator = StreamingValidator::new(rules());
        let mut records = Vec::new();
        for i in 0..4 {
            let mut r = record(&format!("A-{}", i), 100.0);
            r.set("abstract", FieldValue::Str("laser widgets".into()));
            records.push(r);
        }
        validator.validate_chunk(&RecordChunk::new(0, records));
        let summary = validator.finish();
        assert!(!summary.has_blocking_failure());
        assert_eq!(summary.records_ok, 4);
    }
}
