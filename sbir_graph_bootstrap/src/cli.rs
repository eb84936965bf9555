// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Clap-based parsing plus a validation pass that converts raw arguments
//! into a `ValidatedCommand` the application layer consumes. Validation
//! failures never reach the runtime: they are reported here and mapped to
//! the configuration-error exit code.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

/// Argument validation failures.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },

    #[error("no assets selected; pass --assets with at least one asset key")]
    EmptyAssetSelection,
}

/// SBIR graph ETL pipeline.
#[derive(Debug, Parser)]
#[command(name = "sbir-graph", version, about = "Batch ETL producing the small-business R&D funding graph")]
pub struct Cli {
    /// Path to the base configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (repeat for more detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Materialize one or more assets.
    Materialize {
        /// Comma-separated asset keys.
        #[arg(long, value_delimiter = ',')]
        assets: Vec<String>,

        /// Execution mode.
        #[arg(long, default_value = "incremental")]
        mode: String,

        /// Restrict materialization to one partition key.
        #[arg(long)]
        partition: Option<String>,
    },

    /// Re-run quality checks against existing artifacts.
    Check {
        #[arg(long, value_delimiter = ',')]
        assets: Vec<String>,
    },

    /// Apply graph schema migrations up to the target version.
    Migrate {
        #[arg(long)]
        target: i64,
    },

    /// Run the enrichment engine against the fixed sample and compare
    /// against a stored baseline.
    Benchmark {
        #[arg(long)]
        baseline: PathBuf,
    },
}

/// Run mode after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatedMode {
    Full,
    Incremental,
}

/// Command after validation, consumed by the application layer.
#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Materialize {
        assets: Vec<String>,
        mode: ValidatedMode,
        partition: Option<String>,
    },
    Check {
        assets: Vec<String>,
    },
    Migrate {
        target: i64,
    },
    Benchmark {
        baseline: PathBuf,
    },
}

/// Validated top-level invocation.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: u8,
    pub config: Option<PathBuf>,
}

/// Parses `std::env::args` and validates.
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    validate_cli(Cli::parse())
}

fn clean_assets(assets: Vec<String>) -> Result<Vec<String>, ParseError> {
    let cleaned: Vec<String> = assets
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Err(ParseError::EmptyAssetSelection);
    }
    Ok(cleaned)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let command = match cli.command {
        Commands::Materialize {
            assets,
            mode,
            partition,
        } => {
            let assets = clean_assets(assets)?;
            let mode = match mode.as_str() {
                "full" => ValidatedMode::Full,
                "incremental" => ValidatedMode::Incremental,
                other => {
                    return Err(ParseError::InvalidValue {
                        arg: "mode".to_string(),
                        reason: format!("'{}' is not one of full|incremental", other),
                    })
                }
            };
            ValidatedCommand::Materialize {
                assets,
                mode,
                partition,
            }
        }
        Commands::Check { assets } => ValidatedCommand::Check {
            assets: clean_assets(assets)?,
        },
        Commands::Migrate { target } => {
            if target < 1 {
                return Err(ParseError::InvalidValue {
                    arg: "target".to_string(),
                    reason: "schema versions start at 1".to_string(),
                });
            }
            ValidatedCommand::Migrate { target }
        }
        Commands::Benchmark { baseline } => ValidatedCommand::Benchmark { baseline },
    };

    Ok(ValidatedCli {
        command,
        verbose: cli.verbose,
        config: cli.config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ValidatedCli, ParseError> {
        validate_cli(Cli::try_parse_from(args).expect("clap parse"))
    }

    #[test]
    fn test_materialize_defaults_to_incremental() {
        let cli = parse(&["sbir-graph", "materialize", "--assets", "awards_raw,awards_validated"]).unwrap();
        match cli.command {
            ValidatedCommand::Materialize { assets, mode, .. } => {
                assert_eq!(assets, vec!["awards_raw", "awards_validated"]);
                assert_eq!(mode, ValidatedMode::Incremental);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bad_mode_rejected() {
        let err = parse(&["sbir-graph", "materialize", "--assets", "a", "--mode", "turbo"]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn test_empty_assets_rejected() {
        let err = parse(&["sbir-graph", "check", "--assets", ""]).unwrap_err();
        assert!(matches!(err, ParseError::EmptyAssetSelection) || matches!(err, ParseError::InvalidValue { .. }));
    }

    #[test]
    fn test_migrate_target_must_be_positive() {
        let err = parse(&["sbir-graph", "migrate", "--target", "0"]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue { .. }));
    }
}
