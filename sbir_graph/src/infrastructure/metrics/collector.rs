// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Prometheus Collectors
//!
//! Run-scoped counters and histograms. The registry is owned by the run
//! orchestrator; no HTTP scrape endpoint is wired here; the collectors
//! feed the run report and any exporter the embedding process attaches.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use sbir_graph_domain::EtlError;

/// Metric bundle for one run.
pub struct MetricsCollector {
    registry: Registry,
    pub rows_processed: IntCounter,
    pub bytes_written: IntCounter,
    pub asset_outcomes: IntCounterVec,
    pub retries: IntCounter,
    pub loader_failed_records: IntCounter,
    pub asset_duration_seconds: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, EtlError> {
        let registry = Registry::new();
        let map = |e: prometheus::Error| EtlError::internal_error(format!("metrics registration: {}", e));

        let rows_processed =
            IntCounter::new("etl_rows_processed_total", "Rows processed across all assets").map_err(map)?;
        let bytes_written =
            IntCounter::new("etl_bytes_written_total", "Artifact bytes written").map_err(map)?;
        let asset_outcomes = IntCounterVec::new(
            Opts::new("etl_asset_outcomes_total", "Asset terminal states by outcome"),
            &["outcome"],
        )
        .map_err(map)?;
        let retries = IntCounter::new("etl_retries_total", "Transient retries across components").map_err(map)?;
        let loader_failed_records = IntCounter::new(
            "etl_loader_failed_records_total",
            "Records the loader gave up on after split-retry",
        )
        .map_err(map)?;
        let asset_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("etl_asset_duration_seconds", "Wall-clock time per materialized asset")
                .buckets(vec![0.1, 1.0, 5.0, 30.0, 120.0, 300.0, 1_800.0]),
        )
        .map_err(map)?;

        registry.register(Box::new(rows_processed.clone())).map_err(map)?;
        registry.register(Box::new(bytes_written.clone())).map_err(map)?;
        registry.register(Box::new(asset_outcomes.clone())).map_err(map)?;
        registry.register(Box::new(retries.clone())).map_err(map)?;
        registry.register(Box::new(loader_failed_records.clone())).map_err(map)?;
        registry.register(Box::new(asset_duration_seconds.clone())).map_err(map)?;

        Ok(Self {
            registry,
            rows_processed,
            bytes_written,
            asset_outcomes,
            retries,
            loader_failed_records,
            asset_duration_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Folds a finished run's aggregate metrics into the collectors.
    pub fn observe_run(&self, run: &sbir_graph_domain::entities::Run) {
        self.rows_processed.inc_by(run.metrics.rows_processed);
        self.bytes_written.inc_by(run.metrics.bytes_written);
        self.retries.inc_by(run.metrics.retries);
        self.asset_outcomes
            .with_label_values(&["materialized"])
            .inc_by(run.metrics.assets_materialized);
        self.asset_outcomes
            .with_label_values(&["observed"])
            .inc_by(run.metrics.assets_observed);
        self.asset_outcomes
            .with_label_values(&["failed"])
            .inc_by(run.metrics.assets_failed);
        self.asset_outcomes
            .with_label_values(&["skipped"])
            .inc_by(run.metrics.assets_skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sbir_graph_domain::entities::{AssetOutcome, Run, RunMode};

    #[test]
    fn test_observe_run_updates_counters() {
        let collector = MetricsCollector::new().unwrap();
        let mut run = Run::new(RunMode::Full, vec!["a".into()], Utc::now());
        run.record_outcome("a", AssetOutcome::Materialized);
        run.metrics.rows_processed = 42;

        collector.observe_run(&run);
        assert_eq!(collector.rows_processed.get(), 42);
        assert_eq!(collector.asset_outcomes.with_label_values(&["materialized"]).get(), 1);
    }
}
