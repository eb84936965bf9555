// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Materialize Use Case
//!
//! Runs the selected assets, writes the run report, and maps the run state
//! onto the exit-code contract: gate blocks beat plain failures in the
//! mapping because a gate block is an explicit, configured refusal.

use crate::application::services::pipeline::PipelineRuntime;
use crate::infrastructure::metrics::{write_run_report, RunReport};
use sbir_graph_bootstrap::{CancellationToken, ExitCode};
use sbir_graph_domain::entities::RunMode;
use sbir_graph_domain::EtlError;
use tracing::info;

/// Materializes `assets` and returns the report with its exit code.
pub async fn execute(
    runtime: &PipelineRuntime,
    assets: &[String],
    mode: RunMode,
    partition: Option<String>,
    cancel: CancellationToken,
) -> Result<(RunReport, ExitCode), EtlError> {
    let executor = runtime.executor();
    let run = executor.run(assets, mode, partition, cancel).await?;
    runtime.collector().observe_run(&run);

    let exit = if run.succeeded() {
        ExitCode::Success
    } else if run.had_gate_block() {
        ExitCode::GateBlocked
    } else {
        ExitCode::AssetFailure
    };

    let report = RunReport::new(run);
    let path = write_run_report(runtime.store().resolver().root(), &report).await?;
    info!(report = %path.display(), "run report written");
    Ok((report, exit))
}
