// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Presentation Layer
//!
//! Console rendering of run and check outcomes. The machine-readable truth
//! is the run report JSON; this layer only prints the concise summary.

use crate::application::use_cases::check::AssetCheckOutcome;
use crate::infrastructure::metrics::RunReport;

/// Prints the run summary to stdout.
pub fn print_run_summary(report: &RunReport) {
    println!("{}", report.console_summary());
}

/// Prints re-check outcomes, one line per check.
pub fn print_check_outcomes(outcomes: &[AssetCheckOutcome]) {
    for outcome in outcomes {
        if outcome.results.is_empty() {
            println!("  {}: no sealed artifact", outcome.asset_key);
            continue;
        }
        for result in &outcome.results {
            let status = if result.passed { "pass" } else { "FAIL" };
            println!(
                "  {} {}/{} observed {:.4} vs {:.4} ({:?})",
                status, outcome.asset_key, result.check_name, result.observed, result.threshold, result.severity
            );
        }
    }
}
