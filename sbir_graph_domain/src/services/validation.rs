// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Validation Rules
//!
//! Declarative, configuration-driven rules applied to record streams. Rules
//! are data, not code: each names a severity and a kind, and the validator
//! evaluates them while streaming.
//!
//! ## Rule Kinds
//!
//! - **Completeness**: non-null fraction of a field ≥ threshold (aggregate)
//! - **Uniqueness**: primary key values appear at most once (aggregate)
//! - **Range / DateRange**: numeric or date within bounds (per record)
//! - **Format**: canonical identifier forms or a custom regex (per record)
//! - **CrossField**: e.g. phase amount within the configured phase cap
//!   (per record)
//! - **CrossSource**: enriched NAICS consistent with the agency default
//!   (per record, deferred to the post-enrichment validator)
//!
//! Per-record kinds are evaluated here; aggregate kinds need stream state and
//! are evaluated by the streaming validator, which reports them through the
//! gate framework.

use crate::value_objects::{AwardPhase, FieldValue, LegacyId, NaicsCode, Record, SupplierId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity a rule fires with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleSeverity {
    Warn,
    Error,
}

/// Per-record validation tag, the maximum severity of fired rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordTag {
    Ok,
    Warn,
    Error,
}

/// Built-in canonical formats checkable without a custom regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    SupplierId,
    LegacyId,
    Naics,
    /// Custom regular expression, full-match semantics.
    Pattern(String),
}

/// What a rule checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    Completeness {
        field: String,
        min_fraction: f64,
    },
    Uniqueness {
        field: String,
    },
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    DateRange {
        field: String,
        min: Option<NaiveDate>,
        max: Option<NaiveDate>,
    },
    Format {
        field: String,
        format: FormatKind,
    },
    /// Award amount must not exceed the configured cap for its phase.
    PhaseAmountCap {
        phase_field: String,
        amount_field: String,
        caps: BTreeMap<String, f64>,
    },
    /// Enriched NAICS sector must agree with the agency's default sector
    /// when one is configured. Post-enrichment only.
    AgencyNaicsConsistency {
        agency_field: String,
        naics_field: String,
        agency_sectors: BTreeMap<String, String>,
    },
}

impl RuleKind {
    /// Aggregate kinds need stream-level state and cannot fire per record.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, RuleKind::Completeness { .. } | RuleKind::Uniqueness { .. })
    }
}

/// One declared rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub name: String,
    pub severity: RuleSeverity,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// A rule that fired on a specific record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredRule {
    pub rule_name: String,
    pub severity: RuleSeverity,
    pub message: String,
}

/// A record tagged with its validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub record: Record,
    pub tag: RecordTag,
    pub fired: Vec<FiredRule>,
}

impl ValidatedRecord {
    pub fn from_fired(record: Record, fired: Vec<FiredRule>) -> Self {
        let tag = fired
            .iter()
            .map(|f| match f.severity {
                RuleSeverity::Error => RecordTag::Error,
                RuleSeverity::Warn => RecordTag::Warn,
            })
            .max()
            .unwrap_or(RecordTag::Ok);
        Self { record, tag, fired }
    }
}

/// Evaluates one per-record rule. Aggregate kinds return `None` here.
pub fn evaluate_record_rule(rule: &ValidationRule, record: &Record) -> Option<FiredRule> {
    let fire = |message: String| {
        Some(FiredRule {
            rule_name: rule.name.clone(),
            severity: rule.severity,
            message,
        })
    };

    match &rule.kind {
        RuleKind::Completeness { .. } | RuleKind::Uniqueness { .. } => None,

        RuleKind::Range { field, min, max } => {
            let value = record.get_float(field)?;
            if let Some(lo) = min {
                if value < *lo {
                    return fire(format!("{} = {} below minimum {}", field, value, lo));
                }
            }
            if let Some(hi) = max {
                if value > *hi {
                    return fire(format!("{} = {} above maximum {}", field, value, hi));
                }
            }
            None
        }

        RuleKind::DateRange { field, min, max } => {
            let value = record.get_date(field)?;
            if let Some(lo) = min {
                if value < *lo {
                    return fire(format!("{} = {} before {}", field, value, lo));
                }
            }
            if let Some(hi) = max {
                if value > *hi {
                    return fire(format!("{} = {} after {}", field, value, hi));
                }
            }
            None
        }

        RuleKind::Format { field, format } => {
            let raw = record.get_str(field)?;
            let ok = match format {
                FormatKind::SupplierId => SupplierId::is_valid(raw),
                FormatKind::LegacyId => LegacyId::is_valid(raw),
                FormatKind::Naics => NaicsCode::is_valid(raw),
                FormatKind::Pattern(pattern) => regex::Regex::new(pattern)
                    .map(|re| re.is_match(raw))
                    .unwrap_or(false),
            };
            if ok {
                None
            } else {
                fire(format!("{} = '{}' fails format check", field, raw))
            }
        }

        RuleKind::PhaseAmountCap {
            phase_field,
            amount_field,
            caps,
        } => {
            let phase_raw = record.get_str(phase_field)?;
            let amount = record.get_float(amount_field)?;
            let phase = AwardPhase::parse(phase_raw).ok()?;
            let cap = caps.get(phase.as_str())?;
            if amount > *cap {
                fire(format!(
                    "phase {} amount {} exceeds cap {}",
                    phase.as_str(),
                    amount,
                    cap
                ))
            } else {
                None
            }
        }

        RuleKind::AgencyNaicsConsistency {
            agency_field,
            naics_field,
            agency_sectors,
        } => {
            let agency = record.get_str(agency_field)?;
            let naics_raw = record.get_str(naics_field)?;
            let expected = agency_sectors.get(agency)?;
            let naics = NaicsCode::parse(naics_raw).ok()?;
            if naics.sector_prefix() != expected {
                fire(format!(
                    "agency {} default sector {} disagrees with NAICS {}",
                    agency, expected, naics
                ))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn award_record(phase: &str, amount: f64) -> Record {
        Record::new()
            .with("phase", FieldValue::Str(phase.to_string()))
            .with("amount", FieldValue::Float(amount))
    }

    fn phase_cap_rule() -> ValidationRule {
        let mut caps = BTreeMap::new();
        caps.insert("I".to_string(), 250_000.0);
        caps.insert("II".to_string(), 1_500_000.0);
        ValidationRule {
            name: "phase_amount_cap".into(),
            severity: RuleSeverity::Error,
            kind: RuleKind::PhaseAmountCap {
                phase_field: "phase".into(),
                amount_field: "amount".into(),
                caps,
            },
        }
    }

    #[test]
    fn test_phase_cap_fires_over_limit() {
        let rule = phase_cap_rule();
        assert!(evaluate_record_rule(&rule, &award_record("I", 300_000.0)).is_some());
        assert!(evaluate_record_rule(&rule, &award_record("I", 150_000.0)).is_none());
        assert!(evaluate_record_rule(&rule, &award_record("II", 1_400_000.0)).is_none());
    }

    #[test]
    fn test_format_rule_supplier_id() {
        let rule = ValidationRule {
            name: "supplier_format".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Format {
                field: "supplier_id".into(),
                format: FormatKind::SupplierId,
            },
        };
        let good = Record::new().with("supplier_id", FieldValue::Str("Q1U2A3N4T5U6M".into()));
        let bad = Record::new().with("supplier_id", FieldValue::Str("NOPE".into()));
        assert!(evaluate_record_rule(&rule, &good).is_none());
        assert!(evaluate_record_rule(&rule, &bad).is_some());
    }

    #[test]
    fn test_record_tag_is_max_severity() {
        let fired = vec![
            FiredRule {
                rule_name: "a".into(),
                severity: RuleSeverity::Warn,
                message: String::new(),
            },
            FiredRule {
                rule_name: "b".into(),
                severity: RuleSeverity::Error,
                message: String::new(),
            },
        ];
        let v = ValidatedRecord::from_fired(Record::new(), fired);
        assert_eq!(v.tag, RecordTag::Error);
    }

    #[test]
    fn test_missing_field_does_not_fire_range() {
        let rule = ValidationRule {
            name: "amount_range".into(),
            severity: RuleSeverity::Error,
            kind: RuleKind::Range {
                field: "amount".into(),
                min: Some(0.0),
                max: None,
            },
        };
        assert!(evaluate_record_rule(&rule, &Record::new()).is_none());
    }
}
