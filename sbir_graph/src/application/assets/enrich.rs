// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrich Materializer
//!
//! The enriched-stage asset. Builds the shared lookup index from the
//! reference corpora (supplier registry first, then federal contract
//! recipients) on first demand, runs every validated award chunk through
//! the enrichment engine, and serializes the winning results with their
//! evidence next to the award fields. Engine quality counters land in the
//! asset metrics, where the match-rate gate reads them.

use crate::application::assets::schemas;
use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::enrichment::{
    EnrichedAward, EnrichmentEngine, ProtectedRegistry, FIELD_NAICS, FIELD_RECIPIENT,
};
use crate::infrastructure::lookup::index::IndexEntry;
use crate::infrastructure::lookup::SharedLookupIndex;
use crate::infrastructure::runtime::{AssetContext, ChunkSink, Materializer};
use crate::infrastructure::storage::ColumnarReader;
use async_trait::async_trait;
use sbir_graph_domain::entities::EnrichmentResult;
use sbir_graph_domain::services::normalizer::{normalize_name, normalize_postcode, normalize_state};
use sbir_graph_domain::services::validation::evaluate_record_rule;
use sbir_graph_domain::value_objects::{
    Confidence, FieldValue, LegacyId, Record, RecordChunk, RecordSchema, SupplierId,
};
use sbir_graph_domain::EtlError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Serializes one enriched award into the artifact record.
pub fn enriched_to_record(enriched: &EnrichedAward) -> Result<Record, EtlError> {
    let mut record = schemas::award_to_record(&enriched.award);
    for (prefix, field) in [("recipient", FIELD_RECIPIENT), ("naics", FIELD_NAICS)] {
        let Some(result) = enriched.result_for(field) else {
            continue;
        };
        let value_field = if field == FIELD_NAICS {
            "naics_enriched".to_string()
        } else {
            field.to_string()
        };
        record.set(
            value_field,
            result
                .enriched_value
                .clone()
                .unwrap_or(FieldValue::Null),
        );
        record.set(
            format!("{}_confidence", prefix),
            FieldValue::Float(result.confidence.value()),
        );
        record.set(
            format!("{}_source", prefix),
            FieldValue::Str(result.source.as_str().to_string()),
        );
        if field == FIELD_RECIPIENT {
            record.set("recipient_method", FieldValue::Str(result.method.clone()));
        }
        record.set(
            format!("{}_evidence", prefix),
            FieldValue::Str(serde_json::to_string(&result.evidence)?),
        );
    }
    Ok(record)
}

/// Reconstructs the enriched award from its artifact record.
pub fn enriched_from_record(record: &Record) -> Result<EnrichedAward, EtlError> {
    let award = schemas::award_from_record(record)?;
    let mut results = Vec::new();

    for (prefix, field, value_field) in [
        ("recipient", FIELD_RECIPIENT, FIELD_RECIPIENT),
        ("naics", FIELD_NAICS, "naics_enriched"),
    ] {
        let Some(confidence) = record.get_float(&format!("{}_confidence", prefix)) else {
            continue;
        };
        let source_tag = record
            .get_str(&format!("{}_source", prefix))
            .unwrap_or("no_match")
            .to_string();
        let evidence = record
            .get_str(&format!("{}_evidence", prefix))
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default();

        results.push(EnrichmentResult {
            target_record_id: award.award_id.clone(),
            field_name: field.to_string(),
            enriched_value: record.get(value_field).filter(|v| !v.is_null()).cloned(),
            original_value: None,
            confidence: Confidence::new(confidence)?,
            source: serde_json::from_value(serde_json::Value::String(source_tag))?,
            method: record
                .get_str("recipient_method")
                .filter(|_| field == FIELD_RECIPIENT)
                .unwrap_or("")
                .to_string(),
            evidence,
            timestamp: chrono::Utc::now(),
        });
    }

    Ok(EnrichedAward { award, results })
}

/// Builds index entries from the supplier registry artifact.
async fn supplier_index_entries(path: &PathBuf) -> Result<Vec<IndexEntry>, EtlError> {
    let mut reader = ColumnarReader::open(path).await?;
    let mut entries = Vec::new();
    while let Some(group) = reader.next_group().await? {
        for record in group {
            let Some(name) = record.get_str("legal_name") else {
                continue;
            };
            entries.push(IndexEntry {
                supplier_id: record.get_str("supplier_id").and_then(|s| SupplierId::parse(s).ok()),
                legacy_id: record.get_str("legacy_id").and_then(|s| LegacyId::parse(s).ok()),
                name: name.to_string(),
                normalized_name: normalize_name(name),
                state: record.get_str("state").and_then(normalize_state),
                postcode: record.get_str("postcode").and_then(normalize_postcode),
            });
        }
    }
    Ok(entries)
}

/// Builds index entries from the federal contracts recipient table. The
/// dump carries no address block, so these entries join the name buckets
/// and exact-id maps only.
async fn contract_index_entries(path: &PathBuf) -> Result<Vec<IndexEntry>, EtlError> {
    let mut reader = ColumnarReader::open(path).await?;
    let mut entries = Vec::new();
    let mut seen_names: std::collections::HashSet<String> = std::collections::HashSet::new();
    while let Some(group) = reader.next_group().await? {
        for record in group {
            let Some(name) = record.get_str("recipient_name") else {
                continue;
            };
            let supplier_id = record.get_str("recipient_uei").and_then(|s| SupplierId::parse(s).ok());
            let legacy_id = record.get_str("recipient_duns").and_then(|s| LegacyId::parse(s).ok());
            // One entry per distinct recipient, not per contract action.
            let dedup_key = format!(
                "{}|{}|{}",
                supplier_id.as_ref().map(|s| s.as_str()).unwrap_or(""),
                legacy_id.as_ref().map(|l| l.as_str()).unwrap_or(""),
                normalize_name(name)
            );
            if !seen_names.insert(dedup_key) {
                continue;
            }
            entries.push(IndexEntry {
                supplier_id,
                legacy_id,
                name: name.to_string(),
                normalized_name: normalize_name(name),
                state: None,
                postcode: None,
            });
        }
    }
    Ok(entries)
}

/// The enrichment asset.
pub struct EnrichMaterializer {
    awards_key: String,
    suppliers_key: String,
    contracts_key: String,
    shared_index: SharedLookupIndex,
    registry: Option<Arc<ProtectedRegistry>>,
}

impl EnrichMaterializer {
    pub fn new(
        awards_key: impl Into<String>,
        suppliers_key: impl Into<String>,
        contracts_key: impl Into<String>,
        shared_index: SharedLookupIndex,
        registry: Option<Arc<ProtectedRegistry>>,
    ) -> Self {
        Self {
            awards_key: awards_key.into(),
            suppliers_key: suppliers_key.into(),
            contracts_key: contracts_key.into(),
            shared_index,
            registry,
        }
    }
}

#[async_trait]
impl Materializer for EnrichMaterializer {
    fn schema(&self) -> RecordSchema {
        schemas::enriched_award_schema()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let suppliers = ctx.upstream_artifact(&self.suppliers_key)?.data_path.clone();
        let contracts = ctx.upstream_artifact(&self.contracts_key)?.data_path.clone();
        let index = self
            .shared_index
            .get_or_build(|| async move {
                // Registry first: it wins exact-key collisions in the index.
                let mut entries = supplier_index_entries(&suppliers).await?;
                entries.extend(contract_index_entries(&contracts).await?);
                Ok(entries)
            })
            .await?;

        let engine = EnrichmentEngine::new(
            ctx.config.enrichment.clone(),
            index,
            self.registry.clone(),
        );

        let awards_artifact = ctx.upstream_artifact(&self.awards_key)?;
        let mut reader = ColumnarReader::open(&awards_artifact.data_path).await?;
        let cross_source_rules = crate::application::assets::validate::post_enrichment_rules(&ctx.config);
        let mut cross_source_warnings = 0u64;
        let mut out_index = 0u64;
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            let awards = group
                .iter()
                .map(schemas::award_from_record)
                .collect::<Result<Vec<_>, _>>()?;

            let enriched = engine.enrich_chunk(awards, &ctx.cancel).await?;
            // Stable output: chunks are sorted by award id before write.
            let mut records = enriched
                .iter()
                .map(enriched_to_record)
                .collect::<Result<Vec<_>, _>>()?;
            records.sort_by(|a, b| a.get_str("award_id").cmp(&b.get_str("award_id")));

            // Cross-source consistency runs post-enrichment by definition:
            // it compares enriched values against source-side expectations.
            for record in &records {
                for rule in &cross_source_rules {
                    if evaluate_record_rule(rule, record).is_some() {
                        cross_source_warnings += 1;
                    }
                }
            }

            sink.write_chunk(RecordChunk::new(out_index, records)).await?;
            out_index += 1;
        }

        let quality = engine.quality();
        let mut metrics = BTreeMap::new();
        for (field, stats) in &quality.fields {
            metrics.insert(format!("{}_match_rate", field), stats.match_rate());
            metrics.insert(format!("{}_fallback_rate", field), stats.fallback_rate());
            let total = stats.total.max(1) as f64;
            metrics.insert(format!("{}_high_fraction", field), stats.high_band as f64 / total);
            metrics.insert(format!("{}_medium_fraction", field), stats.medium_band as f64 / total);
            metrics.insert(format!("{}_low_fraction", field), stats.low_band as f64 / total);
        }
        metrics.insert("api_transient_retries".to_string(), quality.api_transient_retries as f64);
        metrics.insert("cross_source_warnings".to_string(), cross_source_warnings as f64);
        Ok(metrics)
    }
}

/// Builds the protected registry client from configuration, reading the API
/// key from its named environment variable. Returns `None` when the API
/// strategy is disabled or the key is absent (offline run).
pub fn registry_from_config(config: &EtlConfig) -> Option<Arc<ProtectedRegistry>> {
    if !config.enrichment.api.enabled {
        return None;
    }
    let api_key = EtlConfig::secret_from_env(&config.enrichment.api.api_key_env).ok()?;
    let client = crate::infrastructure::enrichment::HttpRegistryClient::new(&config.enrichment.api, api_key).ok()?;
    Some(Arc::new(ProtectedRegistry::new(
        Arc::new(client),
        config.enrichment.api.clone(),
    )))
}
