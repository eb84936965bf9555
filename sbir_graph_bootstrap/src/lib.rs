// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SBIR Graph Bootstrap
//!
//! Entry-point concerns for the `sbir-graph` binary: CLI parsing and
//! validation, exit-code mapping, the bootstrap logger abstraction, and
//! signal-driven shutdown coordination. Kept separate from the application
//! crate so the startup path has no dependency on pipeline internals.

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod shutdown;

pub use cli::{parse_and_validate, Cli, Commands, ParseError, ValidatedCli, ValidatedCommand, ValidatedMode};
pub use exit_code::ExitCode;
pub use logger::{BootstrapLogger, ConsoleLogger, NoOpLogger};
pub use shutdown::{CancellationToken, ShutdownCoordinator, DEFAULT_GRACE_PERIOD_SECS};
