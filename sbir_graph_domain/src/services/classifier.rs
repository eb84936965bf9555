// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Text Categorization Port
//!
//! Contract for the technology-category classifier. The model internals are
//! external to this system; the pipeline only depends on "given text,
//! produce scored category labels with evidence". Implementations must be
//! deterministic for a fixed model artifact.

use crate::EtlError;
use serde::{Deserialize, Serialize};

/// One scored label with supporting evidence snippets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredLabel {
    /// Category slug (a `CETArea` id).
    pub label: String,
    /// Score in `[0, 100]`.
    pub score: f64,
    /// Text fragments that drove the score.
    pub evidence_snippets: Vec<String>,
}

/// Batch classifier over free text.
pub trait TextClassifier: Send + Sync {
    /// Classifies a batch of texts; result is aligned by index with the
    /// input, each entry the top-k scored labels in descending score order.
    fn classify_batch(&self, texts: &[&str], top_k: usize) -> Result<Vec<Vec<ScoredLabel>>, EtlError>;

    /// Version tag of the loaded model artifact, for provenance.
    fn model_version(&self) -> &str;
}
