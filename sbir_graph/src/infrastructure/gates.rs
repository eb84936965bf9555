// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Quality Gate Framework
//!
//! Declarative checks bound to assets. A check compares one named metric of
//! the materialized output against a threshold; ERROR severity blocks every
//! downstream asset, WARN is recorded and non-blocking. Checks always run
//! on the sealed output's metrics, never on partial state.

pub mod checks;

pub use checks::{evaluate_checks, Comparison, QualityCheck, ROW_COUNT_METRIC};
