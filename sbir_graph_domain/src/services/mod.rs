// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Services
//!
//! Pure business logic (normalization, similarity, validation rules) and the
//! infrastructure ports (record sources, text classification) that the
//! application layer wires to concrete implementations.

pub mod classifier;
pub mod normalizer;
pub mod record_source;
pub mod similarity;
pub mod validation;

pub use classifier::{ScoredLabel, TextClassifier};
pub use record_source::{
    ChunkIterator, DecodeErrorLog, RecordSource, SourceDescriptor, SourceFormat,
};
pub use validation::{
    evaluate_record_rule, FiredRule, FormatKind, RecordTag, RuleKind, RuleSeverity,
    ValidatedRecord, ValidationRule,
};
