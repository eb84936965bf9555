// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Streaming Validator
//!
//! Applies a declared rule set to a record stream, tagging each record
//! `OK | WARN | ERROR` with its fired rules. Per-record rules fire inline;
//! aggregate rules (uniqueness, completeness) accumulate state across chunks
//! and report at stream end, where the gate framework picks them up.

pub mod streaming_validator;

pub use streaming_validator::{StreamSummary, StreamingValidator};
