// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Validate Materializer
//!
//! The validated-stage asset: streams the raw artifact through the
//! streaming validator, passes OK and WARN records through, drops ERROR
//! records, and surfaces the counts as metrics. The asset's ERROR-severity
//! gate on `error_records` is what blocks downstream materialization when a
//! strict rule fired.

use crate::application::assets::schemas;
use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::runtime::{AssetContext, ChunkSink, Materializer};
use crate::infrastructure::storage::ColumnarReader;
use crate::infrastructure::validation::StreamingValidator;
use async_trait::async_trait;
use sbir_graph_domain::services::validation::{
    FormatKind, RecordTag, RuleKind, RuleSeverity, ValidationRule,
};
use sbir_graph_domain::value_objects::{RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::collections::BTreeMap;

/// The configuration-driven rule set for the awards stream.
pub fn award_rules(config: &EtlConfig) -> Vec<ValidationRule> {
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
            name: "award_date_in_program_range".into(),
            severity: RuleSeverity::Error,
            kind: RuleKind::DateRange {
                field: "award_date".into(),
                min: Some(config.validation.min_award_date),
                max: Some(config.validation.max_award_date),
            },
        },
        ValidationRule {
            name: "phase_amount_cap".into(),
            severity: RuleSeverity::Error,
            kind: RuleKind::PhaseAmountCap {
                phase_field: "phase".into(),
                amount_field: "amount".into(),
                caps: config.validation.phase_caps.clone(),
            },
        },
        ValidationRule {
            name: "supplier_id_format".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Format {
                field: "supplier_id".into(),
                format: FormatKind::SupplierId,
            },
        },
        ValidationRule {
            name: "naics_format".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Format {
                field: "naics".into(),
                format: FormatKind::Naics,
            },
        },
        ValidationRule {
            name: "abstract_completeness".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Completeness {
                field: "abstract".into(),
                min_fraction: config.validation.completeness_min_fraction,
            },
        },
    ]
}

/// Rule set for the federal contracts stream. Contract amounts may be
/// negative (de-obligations), so no non-negative range rule applies.
pub fn contract_rules(config: &EtlConfig) -> Vec<ValidationRule> {
    vec![
        ValidationRule {
            name: "action_date_plausible".into(),
            severity: RuleSeverity::Error,
            kind: RuleKind::DateRange {
                field: "action_date".into(),
                min: Some(config.validation.min_award_date),
                max: Some(config.validation.max_award_date),
            },
        },
        ValidationRule {
            name: "recipient_uei_format".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Format {
                field: "recipient_uei".into(),
                format: FormatKind::SupplierId,
            },
        },
        ValidationRule {
            name: "recipient_duns_format".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Format {
                field: "recipient_duns".into(),
                format: FormatKind::LegacyId,
            },
        },
        ValidationRule {
            name: "recipient_name_completeness".into(),
            severity: RuleSeverity::Warn,
            kind: RuleKind::Completeness {
                field: "recipient_name".into(),
                min_fraction: config.validation.completeness_min_fraction,
            },
        },
    ]
}

/// Post-enrichment rule set (cross-source consistency).
pub fn post_enrichment_rules(config: &EtlConfig) -> Vec<ValidationRule> {
    vec![ValidationRule {
        name: "agency_naics_consistency".into(),
        severity: RuleSeverity::Warn,
        kind: RuleKind::AgencyNaicsConsistency {
            agency_field: "agency".into(),
            naics_field: "naics_enriched".into(),
            agency_sectors: config.enrichment.agency_sector_defaults.clone(),
        },
    }]
}

/// Validates one upstream artifact against a rule set.
pub struct ValidateMaterializer {
    upstream_key: String,
    schema: RecordSchema,
    rules: fn(&EtlConfig) -> Vec<ValidationRule>,
}

impl ValidateMaterializer {
    pub fn new(upstream_key: impl Into<String>, schema: RecordSchema, rules: fn(&EtlConfig) -> Vec<ValidationRule>) -> Self {
        Self {
            upstream_key: upstream_key.into(),
            schema,
            rules,
        }
    }

    /// The awards validator.
    pub fn awards(upstream_key: impl Into<String>) -> Self {
        Self::new(upstream_key, schemas::award_schema(), award_rules)
    }

    /// The federal contracts validator.
    pub fn contracts(upstream_key: impl Into<String>) -> Self {
        Self::new(upstream_key, schemas::contract_schema(), contract_rules)
    }
}

#[async_trait]
impl Materializer for ValidateMaterializer {
    fn schema(&self) -> RecordSchema {
        self.schema.clone()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let upstream = ctx.upstream_artifact(&self.upstream_key)?;
        let mut reader = ColumnarReader::open(&upstream.data_path).await?;
        let mut validator = StreamingValidator::new((self.rules)(&ctx.config));

        let mut out_index = 0u64;
        let mut buffered = Vec::with_capacity(ctx.chunk_size);
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            let validated = validator.validate_chunk(&RecordChunk::new(out_index, group));
            for v in validated {
                if v.tag != RecordTag::Error {
                    buffered.push(v.record);
                }
                if buffered.len() >= ctx.chunk_size {
                    sink.write_chunk(RecordChunk::new(out_index, std::mem::take(&mut buffered)))
                        .await?;
                    out_index += 1;
                    buffered.reserve(ctx.chunk_size);
                }
            }
        }
        if !buffered.is_empty() {
            sink.write_chunk(RecordChunk::new(out_index, buffered)).await?;
        }

        let summary = validator.finish();
        let mut metrics = BTreeMap::new();
        metrics.insert("records_seen".to_string(), summary.records_seen as f64);
        metrics.insert("records_ok".to_string(), summary.records_ok as f64);
        metrics.insert("records_warn".to_string(), summary.records_warn as f64);
        metrics.insert("error_records".to_string(), summary.records_error as f64);
        metrics.insert("error_record_fraction".to_string(), summary.error_fraction());
        metrics.insert(
            "aggregate_rule_failures".to_string(),
            summary
                .aggregate_failures
                .iter()
                .filter(|f| f.severity == RuleSeverity::Error)
                .count() as f64,
        );
        Ok(metrics)
    }
}
