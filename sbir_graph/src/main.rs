// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Binary entry point: CLI validation, configuration load, run dispatch,
//! exit-code mapping.

use sbir_graph::application::services::PipelineRuntime;
use sbir_graph::application::use_cases;
use sbir_graph::infrastructure::config::EtlConfig;
use sbir_graph::infrastructure::logging;
use sbir_graph::presentation;
use sbir_graph_bootstrap::{
    parse_and_validate, ExitCode, ShutdownCoordinator, ValidatedCommand, ValidatedMode,
};
use sbir_graph_domain::entities::RunMode;
use sbir_graph_domain::EtlError;
use tracing::error;

fn exit_code_for_error(error: &EtlError) -> ExitCode {
    match error {
        EtlError::InvalidConfiguration(_) => ExitCode::ConfigError,
        EtlError::DatabaseError(_) | EtlError::MigrationRequired(_) => ExitCode::InfrastructureUnreachable,
        EtlError::GateBlocking(_) => ExitCode::GateBlocked,
        _ => ExitCode::AssetFailure,
    }
}

#[tokio::main]
async fn main() {
    let cli = match parse_and_validate() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("invalid arguments: {}", e);
            ExitCode::ConfigError.exit();
        }
    };

    logging::init(cli.verbose);

    let config = match EtlConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            ExitCode::ConfigError.exit();
        }
    };

    let runtime = match PipelineRuntime::new(config, None) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("{}", e);
            exit_code_for_error(&e).exit();
        }
    };

    let shutdown = ShutdownCoordinator::default();
    shutdown.spawn_signal_listener();
    let cancel = shutdown.token();

    let result: Result<ExitCode, EtlError> = match cli.command {
        ValidatedCommand::Materialize {
            assets,
            mode,
            partition,
        } => {
            let mode = match mode {
                ValidatedMode::Full => RunMode::Full,
                ValidatedMode::Incremental => RunMode::Incremental,
            };
            use_cases::materialize::execute(&runtime, &assets, mode, partition, cancel)
                .await
                .map(|(report, exit)| {
                    presentation::print_run_summary(&report);
                    exit
                })
        }
        ValidatedCommand::Check { assets } => use_cases::check::execute(&runtime, &assets)
            .await
            .map(|(outcomes, exit)| {
                presentation::print_check_outcomes(&outcomes);
                exit
            }),
        ValidatedCommand::Migrate { target } => use_cases::migrate::execute(&runtime, target, None).await,
        ValidatedCommand::Benchmark { baseline } => {
            use_cases::benchmark::execute(&runtime, &baseline, cancel)
                .await
                .map(|(_, exit)| exit)
        }
    };

    shutdown.complete_shutdown();
    match result {
        Ok(exit) => exit.exit(),
        Err(e) => {
            error!("{}", e);
            exit_code_for_error(&e).exit();
        }
    }
}
