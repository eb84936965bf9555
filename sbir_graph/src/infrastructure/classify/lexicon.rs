// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Weighted-Lexicon Classifier
//!
//! Deterministic implementation of the
//! [`TextClassifier`](sbir_graph_domain::services::TextClassifier) contract.
//! The model artifact is a versioned JSON term-weight table per category;
//! scoring sums matched term weights, squashes into `[0, 100]`, and collects
//! the matched phrases as evidence snippets. Given a fixed artifact the
//! output is bit-identical across runs, which the benchmark command relies
//! on.
//!
//! The statistical model that *produces* the artifact is external to this
//! system; this module only consumes its export.

use sbir_graph_domain::services::{ScoredLabel, TextClassifier};
use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One category's lexicon in the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryLexicon {
    pub cet_id: String,
    /// Lowercased term/phrase → weight.
    pub terms: BTreeMap<String, f64>,
}

/// The model artifact layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconArtifact {
    pub version: String,
    pub categories: Vec<CategoryLexicon>,
}

/// Deterministic lexicon classifier.
pub struct LexiconClassifier {
    artifact: LexiconArtifact,
}

/// Scores above this saturate to 100.
const SCORE_SATURATION: f64 = 10.0;

/// Labels scoring below this floor are not reported.
const SCORE_FLOOR: f64 = 5.0;

/// Evidence snippets kept per label.
const MAX_SNIPPETS: usize = 3;

impl LexiconClassifier {
    /// Loads the model artifact from disk.
    pub fn load(artifact_path: &Path) -> Result<Self, EtlError> {
        let bytes = std::fs::read(artifact_path).map_err(|e| {
            EtlError::source_unavailable(format!(
                "classifier artifact {}: {}",
                artifact_path.display(),
                e
            ))
        })?;
        let artifact: LexiconArtifact = serde_json::from_slice(&bytes)?;
        Ok(Self { artifact })
    }

    pub fn from_artifact(artifact: LexiconArtifact) -> Self {
        Self { artifact }
    }

    fn score_text(&self, text: &str, top_k: usize) -> Vec<ScoredLabel> {
        let lower = text.to_lowercase();
        let mut labels: Vec<ScoredLabel> = self
            .artifact
            .categories
            .iter()
            .filter_map(|category| {
                let mut raw_score = 0.0;
                let mut snippets = Vec::new();
                for (term, weight) in &category.terms {
                    if lower.contains(term.as_str()) {
                        raw_score += weight;
                        if snippets.len() < MAX_SNIPPETS {
                            snippets.push(term.clone());
                        }
                    }
                }
                // Squash into [0, 100] with saturation.
                let score = (raw_score / SCORE_SATURATION).min(1.0) * 100.0;
                if score >= SCORE_FLOOR {
                    Some(ScoredLabel {
                        label: category.cet_id.clone(),
                        score,
                        evidence_snippets: snippets,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Descending score; label slug breaks ties deterministically.
        labels.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.label.cmp(&b.label))
        });
        labels.truncate(top_k);
        labels
    }
}

impl TextClassifier for LexiconClassifier {
    fn classify_batch(&self, texts: &[&str], top_k: usize) -> Result<Vec<Vec<ScoredLabel>>, EtlError> {
        Ok(texts.iter().map(|t| self.score_text(t, top_k)).collect())
    }

    fn model_version(&self) -> &str {
        &self.artifact.version
    }
}
