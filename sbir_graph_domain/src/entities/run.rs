// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Entity
//!
//! One orchestrator execution: mode, asset selection, per-asset outcomes, and
//! aggregated metrics. Created when the orchestrator starts, finalized on
//! exit, and serialized as the machine-readable run report.

use crate::value_objects::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Execution mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Full,
    Incremental,
}

/// Terminal state of one asset within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetOutcome {
    /// Materialized successfully.
    Materialized,
    /// Incremental mode found a matching fingerprint and skipped the work.
    Observed,
    /// The asset itself failed.
    Failed { category: String, message: String },
    /// A dependency failed, so this asset never ran.
    UpstreamFailed { upstream: String },
    /// A dependency's ERROR-severity gate failed.
    UpstreamQualityGateFailed { upstream: String },
}

impl AssetOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AssetOutcome::Materialized | AssetOutcome::Observed)
    }
}

/// Aggregated counters surfaced in the run report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub rows_processed: u64,
    pub bytes_written: u64,
    pub assets_materialized: u64,
    pub assets_observed: u64,
    pub assets_failed: u64,
    pub assets_skipped: u64,
    pub retries: u64,
}

/// One orchestrator run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub mode: RunMode,
    pub selected_assets: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcome per asset key, in stable order.
    pub outcomes: BTreeMap<String, AssetOutcome>,
    pub metrics: RunMetrics,
}

impl Run {
    pub fn new(mode: RunMode, selected_assets: Vec<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: RunId::new(),
            mode,
            selected_assets,
            started_at,
            finished_at: None,
            outcomes: BTreeMap::new(),
            metrics: RunMetrics::default(),
        }
    }

    pub fn record_outcome(&mut self, asset_key: &str, outcome: AssetOutcome) {
        match &outcome {
            AssetOutcome::Materialized => self.metrics.assets_materialized += 1,
            AssetOutcome::Observed => self.metrics.assets_observed += 1,
            AssetOutcome::Failed { .. } => self.metrics.assets_failed += 1,
            AssetOutcome::UpstreamFailed { .. } | AssetOutcome::UpstreamQualityGateFailed { .. } => {
                self.metrics.assets_skipped += 1
            }
        }
        self.outcomes.insert(asset_key.to_string(), outcome);
    }

    pub fn finalize(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }

    /// True when every selected asset reached a success state.
    pub fn succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.values().all(AssetOutcome::is_success)
    }

    /// True when any asset was skipped because of a blocking gate.
    pub fn had_gate_block(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| matches!(o, AssetOutcome::UpstreamQualityGateFailed { .. }))
    }
}
