// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Check Use Case
//!
//! Re-runs quality checks against existing artifacts without
//! rematerializing. Observed metric values are recovered from the newest
//! sealed sidecar (each stored check carries what it observed), then the
//! *current* check definitions are evaluated against them, so threshold
//! changes in configuration or code take effect without a rebuild.

use crate::application::services::pipeline::PipelineRuntime;
use crate::infrastructure::gates::{evaluate_checks, ROW_COUNT_METRIC};
use sbir_graph_bootstrap::ExitCode;
use sbir_graph_domain::entities::CheckResult;
use sbir_graph_domain::EtlError;
use std::collections::BTreeMap;
use tracing::warn;

/// Per-asset re-check outcome.
#[derive(Debug)]
pub struct AssetCheckOutcome {
    pub asset_key: String,
    pub results: Vec<CheckResult>,
}

/// Re-evaluates checks for each selected asset's newest sealed artifact.
pub async fn execute(
    runtime: &PipelineRuntime,
    assets: &[String],
) -> Result<(Vec<AssetCheckOutcome>, ExitCode), EtlError> {
    let mut outcomes = Vec::with_capacity(assets.len());
    let mut any_blocking = false;

    for key in assets {
        let definition = runtime
            .registry()
            .get(key)
            .ok_or_else(|| EtlError::invalid_config(format!("unknown asset '{}'", key)))?;

        let sealed = runtime.store().list_sealed(definition.stage, key, None).await?;
        let Some(newest) = sealed.first() else {
            warn!(asset = key, "no sealed artifact to check");
            outcomes.push(AssetCheckOutcome {
                asset_key: key.clone(),
                results: vec![],
            });
            any_blocking = true; // nothing to verify is a blocking state
            continue;
        };

        // Rebuild the metric map from what the sealed checks observed.
        let mut metrics: BTreeMap<String, f64> = BTreeMap::new();
        metrics.insert(ROW_COUNT_METRIC.to_string(), newest.row_count as f64);
        for stored in &newest.checks {
            if let Some(current) = definition.checks.iter().find(|c| c.name == stored.check_name) {
                if stored.observed.is_finite() {
                    metrics.insert(current.metric.clone(), stored.observed);
                }
            }
        }

        let results = evaluate_checks(&definition.checks, &metrics);
        any_blocking |= results.iter().any(|r| r.is_blocking_failure());
        outcomes.push(AssetCheckOutcome {
            asset_key: key.clone(),
            results,
        });
    }

    let exit = if any_blocking {
        ExitCode::GateBlocked
    } else {
        ExitCode::Success
    };
    Ok((outcomes, exit))
}
