// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Report
//!
//! The machine-readable record of one run, written next to the artifacts,
//! plus the concise console summary. Scripts branch on the exit code; the
//! report is where the detail lives.

use sbir_graph_domain::entities::{AssetOutcome, Run};
use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Serialized run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub run: Run,
    /// Enrichment quality per field, when the enrichment asset ran.
    pub enrichment_quality: BTreeMap<String, serde_json::Value>,
}

impl RunReport {
    pub fn new(run: Run) -> Self {
        Self {
            run,
            enrichment_quality: BTreeMap::new(),
        }
    }

    pub fn with_quality(mut self, field: &str, quality: serde_json::Value) -> Self {
        self.enrichment_quality.insert(field.to_string(), quality);
        self
    }

    /// Concise console summary: one line per asset, then totals.
    pub fn console_summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.run.outcomes.len() + 2);
        for (asset, outcome) in &self.run.outcomes {
            let line = match outcome {
                AssetOutcome::Materialized => format!("  ok        {}", asset),
                AssetOutcome::Observed => format!("  observed  {}", asset),
                AssetOutcome::Failed { category, message } => {
                    format!("  FAILED    {} [{}] {}", asset, category, message)
                }
                AssetOutcome::UpstreamFailed { upstream } => {
                    format!("  skipped   {} (upstream_failed: {})", asset, upstream)
                }
                AssetOutcome::UpstreamQualityGateFailed { upstream } => {
                    format!("  skipped   {} (upstream_quality_gate_failed: {})", asset, upstream)
                }
            };
            lines.push(line);
        }
        lines.push(format!(
            "run {}: {} materialized, {} observed, {} failed, {} skipped",
            self.run.run_id,
            self.run.metrics.assets_materialized,
            self.run.metrics.assets_observed,
            self.run.metrics.assets_failed,
            self.run.metrics.assets_skipped,
        ));
        lines.join("\n")
    }
}

/// Writes the report as pretty JSON under `<root>/runs/<run_id>.json`.
pub async fn write_run_report(root: &Path, report: &RunReport) -> Result<PathBuf, EtlError> {
    let dir = root.join("runs");
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{}.json", report.run.run_id));
    tokio::fs::write(&path, serde_json::to_vec_pretty(report)?).await?;
    Ok(path)
}
