// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transform Materializers
//!
//! Transformed-stage assets: assignment chain construction, award
//! categorization through the classifier contract, and the company rollup.

use crate::application::assets::enrich::enriched_from_record;
use crate::application::assets::schemas;
use crate::infrastructure::classify::LexiconClassifier;
use crate::infrastructure::runtime::{AssetContext, ChunkSink, Materializer};
use crate::infrastructure::storage::ColumnarReader;
use crate::infrastructure::transform::{
    build_chains, categorize_awards, AwardCategories, CompanyAggregator, OrganizationResolver,
    sector_for,
};
use async_trait::async_trait;
use sbir_graph_domain::value_objects::{FieldValue, NaicsCode, Record, RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::collections::BTreeMap;
use tokio::sync::OnceCell;
use tracing::warn;

/// Chain-construction asset: joined assignments in, linked chains out.
pub struct ChainMaterializer {
    assignments_key: String,
}

impl ChainMaterializer {
    pub fn new(assignments_key: impl Into<String>) -> Self {
        Self {
            assignments_key: assignments_key.into(),
        }
    }
}

#[async_trait]
impl Materializer for ChainMaterializer {
    fn schema(&self) -> RecordSchema {
        schemas::chain_schema()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let upstream = ctx.upstream_artifact(&self.assignments_key)?;
        let mut reader = ColumnarReader::open(&upstream.data_path).await?;

        // Chain construction needs the full per-patent grouping; the input
        // is bounded by the assignment corpus, not the awards volume.
        let mut assignments = Vec::new();
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            for record in &group {
                assignments.push(schemas::assignment_from_record(record)?);
            }
        }
        let total_input = assignments.len();

        let (chains, warnings) = build_chains(assignments);
        for warning in &warnings {
            warn!(patent = %warning.patent_key, "chain rejected: {}", warning.reason);
        }

        // Global record-date order survives into the artifact so the loader
        // can batch sequentially with predecessors first.
        let mut out_index = 0u64;
        let mut buffered = Vec::with_capacity(ctx.chunk_size);
        let chain_count = chains.len();
        for chain in &chains {
            ctx.check_cancelled()?;
            for assignment in &chain.assignments {
                buffered.push(schemas::assignment_to_chain_record(
                    assignment,
                    (chain.span_start, chain.span_end),
                    &chain.current_owner,
                    &chain.last_known_assignee,
                ));
                if buffered.len() >= ctx.chunk_size {
                    sink.write_chunk(RecordChunk::new(out_index, std::mem::take(&mut buffered)))
                        .await?;
                    out_index += 1;
                }
            }
        }
        if !buffered.is_empty() {
            sink.write_chunk(RecordChunk::new(out_index, buffered)).await?;
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("assignments_in".to_string(), total_input as f64);
        metrics.insert("chains_built".to_string(), chain_count as f64);
        metrics.insert("chains_rejected".to_string(), warnings.len() as f64);
        Ok(metrics)
    }
}

/// Categorization asset: enriched awards through the classifier.
pub struct CategorizeMaterializer {
    enriched_key: String,
    classifier: OnceCell<LexiconClassifier>,
}

impl CategorizeMaterializer {
    pub fn new(enriched_key: impl Into<String>) -> Self {
        Self {
            enriched_key: enriched_key.into(),
            classifier: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Materializer for CategorizeMaterializer {
    fn schema(&self) -> RecordSchema {
        schemas::category_schema()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let artifact_path = ctx.config.classifier.artifact_path.clone();
        let classifier = self
            .classifier
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || LexiconClassifier::load(&artifact_path))
                    .await
                    .map_err(|e| EtlError::internal_error(format!("classifier load task: {}", e)))?
            })
            .await?;

        let upstream = ctx.upstream_artifact(&self.enriched_key)?;
        let mut reader = ColumnarReader::open(&upstream.data_path).await?;

        let mut out_index = 0u64;
        let mut classified = 0u64;
        let mut seen = 0u64;
        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            let enriched = group
                .iter()
                .map(enriched_from_record)
                .collect::<Result<Vec<_>, _>>()?;
            seen += enriched.len() as u64;

            let categories = categorize_awards(
                classifier,
                &enriched,
                ctx.config.classifier.batch_size,
                ctx.config.classifier.top_k,
            )?;
            classified += categories.len() as u64;

            let records: Vec<Record> = categories
                .iter()
                .map(|c| {
                    Record::new()
                        .with("award_id", FieldValue::Str(c.award_id.clone()))
                        .with("primary_category", FieldValue::Str(c.primary_category.clone()))
                        .with(
                            "supporting_categories",
                            FieldValue::Str(c.supporting_categories.join(";")),
                        )
                })
                .collect();
            if !records.is_empty() {
                sink.write_chunk(RecordChunk::new(out_index, records)).await?;
                out_index += 1;
            }
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("awards_seen".to_string(), seen as f64);
        metrics.insert("awards_classified".to_string(), classified as f64);
        metrics.insert(
            "classified_fraction".to_string(),
            if seen == 0 { 0.0 } else { classified as f64 / seen as f64 },
        );
        Ok(metrics)
    }
}

/// Company rollup asset: grouped single pass over enriched awards plus the
/// categorization output.
pub struct RollupMaterializer {
    enriched_key: String,
    categories_key: String,
}

impl RollupMaterializer {
    pub fn new(enriched_key: impl Into<String>, categories_key: impl Into<String>) -> Self {
        Self {
            enriched_key: enriched_key.into(),
            categories_key: categories_key.into(),
        }
    }
}

#[async_trait]
impl Materializer for RollupMaterializer {
    fn schema(&self) -> RecordSchema {
        schemas::company_metrics_schema()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        // Categories artifact is small (one row per classified award).
        let categories_artifact = ctx.upstream_artifact(&self.categories_key)?;
        let mut categories: BTreeMap<String, AwardCategories> = BTreeMap::new();
        let mut reader = ColumnarReader::open(&categories_artifact.data_path).await?;
        while let Some(group) = reader.next_group().await? {
            for record in group {
                let Some(award_id) = record.get_str("award_id") else {
                    continue;
                };
                categories.insert(
                    award_id.to_string(),
                    AwardCategories {
                        award_id: award_id.to_string(),
                        primary_category: record.get_str("primary_category").unwrap_or_default().to_string(),
                        supporting_categories: record
                            .get_str("supporting_categories")
                            .map(|s| s.split(';').map(str::to_string).collect())
                            .unwrap_or_default(),
                    },
                );
            }
        }

        let enriched_artifact = ctx.upstream_artifact(&self.enriched_key)?;
        let mut reader = ColumnarReader::open(&enriched_artifact.data_path).await?;
        let mut resolver = OrganizationResolver::new();
        let mut aggregator = CompanyAggregator::new();
        let mut company_naics: BTreeMap<String, String> = BTreeMap::new();

        while let Some(group) = reader.next_group().await? {
            ctx.check_cancelled()?;
            let enriched = group
                .iter()
                .map(enriched_from_record)
                .collect::<Result<Vec<_>, _>>()?;
            let naics_by_award: BTreeMap<String, Option<String>> = group
                .iter()
                .filter_map(|r| {
                    r.get_str("award_id")
                        .map(|id| (id.to_string(), r.get_str("naics_enriched").map(str::to_string)))
                })
                .collect();

            let resolved = resolver.resolve_chunk("awards", enriched);
            for r in &resolved {
                if let Some(Some(naics)) = naics_by_award.get(&r.enriched.award.award_id) {
                    company_naics
                        .entry(r.organization_id.as_str().to_string())
                        .or_insert_with(|| naics.clone());
                }
            }
            aggregator.add_chunk(&resolved, &categories);
        }

        let company_count = aggregator.company_count();
        let metrics_rows = aggregator.into_metrics();
        let fallback_code = ctx.config.enrichment.sector_fallback_code.clone();

        let mut out_index = 0u64;
        for batch in metrics_rows.chunks(ctx.chunk_size.max(1)) {
            ctx.check_cancelled()?;
            let records: Vec<Record> = batch
                .iter()
                .map(|m| {
                    let sector = company_naics
                        .get(m.organization_id.as_str())
                        .and_then(|code| NaicsCode::parse(code).ok())
                        .map(|code| sector_for(&code, &fallback_code));
                    let mut record = Record::new()
                        .with("organization_id", FieldValue::Str(m.organization_id.as_str().to_string()))
                        .with("award_count", FieldValue::Int(m.award_count as i64))
                        .with("total_funding", FieldValue::Float(m.total_funding))
                        .with(
                            "phase_mix",
                            FieldValue::Str(serde_json::to_string(&m.phase_mix).unwrap_or_default()),
                        )
                        .with(
                            "category_distribution",
                            FieldValue::Str(serde_json::to_string(&m.category_distribution).unwrap_or_default()),
                        )
                        .with("first_award_date", FieldValue::Date(m.first_award_date))
                        .with("last_award_date", FieldValue::Date(m.last_award_date));
                    if let Some(sector) = sector {
                        record.set("sector_code", FieldValue::Str(sector.sector_code));
                        record.set("sector_name", FieldValue::Str(sector.sector_name));
                    }
                    record
                })
                .collect();
            sink.write_chunk(RecordChunk::new(out_index, records)).await?;
            out_index += 1;
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("companies".to_string(), company_count as f64);
        Ok(metrics)
    }
}
