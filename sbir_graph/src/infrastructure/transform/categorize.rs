// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Categorization Transformer
//!
//! Drives the text-classification contract: consumes enriched awards,
//! batches their abstracts through the classifier, and emits
//! `(award_id, primary_category, supporting_categories)` records for the
//! loader. Awards without abstract text are passed over rather than
//! classified on empty input.

use crate::infrastructure::enrichment::EnrichedAward;
use sbir_graph_domain::services::TextClassifier;
use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Categorization output for one award.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardCategories {
    pub award_id: String,
    pub primary_category: String,
    /// Remaining top-k labels in descending score order.
    pub supporting_categories: Vec<String>,
}

/// Classifies a chunk of enriched awards in classifier-sized batches.
pub fn categorize_awards(
    classifier: &dyn TextClassifier,
    awards: &[EnrichedAward],
    batch_size: usize,
    top_k: usize,
) -> Result<Vec<AwardCategories>, EtlError> {
    let with_text: Vec<(&str, &str)> = awards
        .iter()
        .filter_map(|e| {
            e.award
                .abstract_text
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .map(|t| (e.award.award_id.as_str(), t))
        })
        .collect();

    let mut out = Vec::with_capacity(with_text.len());
    for batch in with_text.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = batch.iter().map(|(_, t)| *t).collect();
        let labels = classifier.classify_batch(&texts, top_k)?;
        for ((award_id, _), scored) in batch.iter().zip(labels) {
            let Some(primary) = scored.first() else {
                continue; // classifier had no label above its floor
            };
            out.push(AwardCategories {
                award_id: (*award_id).to_string(),
                primary_category: primary.label.clone(),
                supporting_categories: scored.iter().skip(1).map(|l| l.label.clone()).collect(),
            });
        }
    }
    debug!(
        classified = out.len(),
        skipped = awards.len() - with_text.len(),
        model = classifier.model_version(),
        "categorization batch complete"
    );
    Ok(out)
}
