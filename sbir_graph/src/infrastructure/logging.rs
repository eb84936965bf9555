// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tracing subscriber setup. `RUST_LOG` wins when set; otherwise verbosity
//! flags map to info/debug/trace for this crate's targets.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber once. Safe to call again (later calls
/// are no-ops), which keeps tests that share a process happy.
pub fn init(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sbir_graph={0},sbir_graph_bootstrap={0}", default_directive)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
