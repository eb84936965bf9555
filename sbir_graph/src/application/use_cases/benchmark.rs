// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Benchmark Use Case
//!
//! Runs the enrichment engine against the fixed sample file and compares
//! per-field match rates against the stored baseline. A missing baseline is
//! bootstrapped from the current run (reported, never a regression); a drop
//! beyond the configured tolerance fails with the asset-failure code.

use crate::application::assets::schemas;
use crate::application::services::pipeline::PipelineRuntime;
use crate::infrastructure::enrichment::EnrichmentEngine;
use crate::infrastructure::extractors::DelimitedSource;
use crate::infrastructure::lookup::index::{IndexEntry, LookupIndex};
use crate::infrastructure::metrics::{compare_against_baseline, BenchmarkBaseline, BenchmarkOutcome};
use crate::infrastructure::storage::{ColumnarReader, Stage};
use sbir_graph_bootstrap::{CancellationToken, ExitCode};
use sbir_graph_domain::services::normalizer::{normalize_name, normalize_postcode, normalize_state};
use sbir_graph_domain::services::{RecordSource, SourceDescriptor};
use sbir_graph_domain::value_objects::{LegacyId, SupplierId};
use sbir_graph_domain::EtlError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Index entries from the newest sealed supplier artifact.
async fn index_from_sealed_suppliers(runtime: &PipelineRuntime) -> Result<Arc<LookupIndex>, EtlError> {
    let sealed = runtime
        .store()
        .list_sealed(Stage::Raw, crate::application::assets::catalog::SUPPLIERS_RAW, None)
        .await?;
    let newest = sealed.first().ok_or_else(|| {
        EtlError::source_unavailable("no sealed supplier artifact; materialize suppliers_raw first".to_string())
    })?;
    let path = runtime.store().data_path(
        Stage::Raw,
        crate::application::assets::catalog::SUPPLIERS_RAW,
        None,
        &newest.fingerprint,
    );

    let mut reader = ColumnarReader::open(&path).await?;
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
    Ok(Arc::new(LookupIndex::build(entries)))
}

/// Benchmarks enrichment against the baseline at `baseline_path`.
pub async fn execute(
    runtime: &PipelineRuntime,
    baseline_path: &Path,
    cancel: CancellationToken,
) -> Result<(BenchmarkOutcome, ExitCode), EtlError> {
    let config = runtime.config();
    let index = index_from_sealed_suppliers(runtime).await?;

    // The benchmark deliberately runs offline: no API strategy, so results
    // are a pure function of sample, index, and configuration.
    let engine = EnrichmentEngine::new(config.enrichment.clone(), index, None);

    let source = DelimitedSource::new(schemas::award_schema(), config.sources.io_retry.clone());
    let descriptor = SourceDescriptor::new("benchmark_sample", &config.benchmark.sample_path);
    let mut iter = source.open(&descriptor).await?;

    let mut sample_rows = 0u64;
    while let Some(chunk) = iter.next_chunk().await? {
        let awards = chunk
            .records
            .iter()
            .map(schemas::award_from_record)
            .collect::<Result<Vec<_>, _>>()?;
        sample_rows += awards.len() as u64;
        engine.enrich_chunk(awards, &cancel).await?;
    }

    let quality = engine.quality();
    let observed: BTreeMap<String, f64> = quality
        .fields
        .iter()
        .map(|(field, stats)| (field.clone(), stats.match_rate()))
        .collect();

    if !baseline_path.exists() {
        warn!(path = %baseline_path.display(), "no baseline found; recording current rates as baseline");
        let baseline = BenchmarkBaseline {
            recorded_at: chrono::Utc::now(),
            sample_rows,
            match_rates: observed.clone(),
        };
        baseline.save(baseline_path).await?;
        return Ok((BenchmarkOutcome { comparisons: vec![] }, ExitCode::Success));
    }

    let baseline = BenchmarkBaseline::load(baseline_path).await?;
    let outcome = compare_against_baseline(&baseline, &observed, config.benchmark.regression_tolerance);
    for comparison in &outcome.comparisons {
        info!(
            field = %comparison.field,
            baseline = comparison.baseline,
            observed = comparison.observed,
            regressed = comparison.regressed,
            "benchmark comparison"
        );
    }

    let exit = if outcome.has_regression() {
        ExitCode::AssetFailure
    } else {
        ExitCode::Success
    };
    Ok((outcome, exit))
}
