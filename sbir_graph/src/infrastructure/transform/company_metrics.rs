// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Company Aggregation
//!
//! Per-company metrics computed in one grouped pass over the enriched
//! awards stream. The aggregator is chunk-streaming: state per company is a
//! fixed-size struct, so memory scales with distinct companies, not with
//! award volume.

use crate::infrastructure::transform::categorize::AwardCategories;
use crate::infrastructure::transform::dedup::ResolvedAward;
use chrono::NaiveDate;
use sbir_graph_domain::value_objects::OrganizationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated metrics for one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetrics {
    pub organization_id: OrganizationId,
    pub award_count: u64,
    pub total_funding: f64,
    /// Phase → award count.
    pub phase_mix: BTreeMap<String, u64>,
    /// Category slug → award count, from the categorization transformer.
    pub category_distribution: BTreeMap<String, u64>,
    pub first_award_date: NaiveDate,
    pub last_award_date: NaiveDate,
}

/// Single-pass grouped aggregator.
#[derive(Debug, Default)]
pub struct CompanyAggregator {
    metrics: BTreeMap<String, CompanyMetrics>,
}

impl CompanyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one chunk of resolved awards into the aggregate.
    pub fn add_chunk(&mut self, awards: &[ResolvedAward], categories: &BTreeMap<String, AwardCategories>) {
        for resolved in awards {
            let award = &resolved.enriched.award;
            let entry = self
                .metrics
                .entry(resolved.organization_id.as_str().to_string())
                .or_insert_with(|| CompanyMetrics {
                    organization_id: resolved.organization_id.clone(),
                    award_count: 0,
                    total_funding: 0.0,
                    phase_mix: BTreeMap::new(),
                    category_distribution: BTreeMap::new(),
                    first_award_date: award.award_date,
                    last_award_date: award.award_date,
                });

            entry.award_count += 1;
            entry.total_funding += award.amount;
            *entry.phase_mix.entry(award.phase.as_str().to_string()).or_insert(0) += 1;
            entry.first_award_date = entry.first_award_date.min(award.award_date);
            entry.last_award_date = entry.last_award_date.max(award.award_date);

            if let Some(cats) = categories.get(&award.award_id) {
                *entry
                    .category_distribution
                    .entry(cats.primary_category.clone())
                    .or_insert(0) += 1;
            }
        }
    }

    pub fn into_metrics(self) -> Vec<CompanyMetrics> {
        self.metrics.into_values().collect()
    }

    pub fn company_count(&self) -> usize {
        self.metrics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::enrichment::EnrichedAward;
    use sbir_graph_domain::entities::{Award, AwardCompanyRef};
    use sbir_graph_domain::value_objects::AwardPhase;

    fn resolved(id: &str, org: &str, phase: AwardPhase, amount: f64, date: (i32, u32, u32)) -> ResolvedAward {
        ResolvedAward {
            enriched: EnrichedAward {
                award: Award {
                    award_id: id.into(),
                    company: AwardCompanyRef {
                        raw_name: "X".into(),
                        ..Default::default()
                    },
                    agency: "DOD".into(),
                    program: "SBIR".into(),
                    phase,
                    amount,
                    award_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
                    naics: None,
                    abstract_text: None,
                },
                results: vec![],
            },
            organization_id: OrganizationId::from_name_key(org, "CA", "94103"),
            method: "test".into(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_grouped_single_pass() {
        let mut agg = CompanyAggregator::new();
        let mut cats = BTreeMap::new();
        cats.insert(
            "A-1".to_string(),
            AwardCategories {
                award_id: "A-1".into(),
                primary_category: "advanced-computing".into(),
                supporting_categories: vec![],
            },
        );

        agg.add_chunk(
            &[
                resolved("A-1", "ACME", AwardPhase::One, 100_000.0, (2018, 1, 1)),
                resolved("A-2", "ACME", AwardPhase::Two, 750_000.0, (2020, 6, 1)),
                resolved("A-3", "OTHER", AwardPhase::One, 50_000.0, (2019, 3, 1)),
            ],
            &cats,
        );

        assert_eq!(agg.company_count(), 2);
        let metrics = agg.into_metrics();
        let acme = metrics
            .iter()
            .find(|m| m.award_count == 2)
            .expect("acme aggregate");
        assert_eq!(acme.total_funding, 850_000.0);
        assert_eq!(acme.phase_mix["I"], 1);
        assert_eq!(acme.phase_mix["II"], 1);
        assert_eq!(acme.first_award_date.to_string(), "2018-01-01");
        assert_eq!(acme.last_award_date.to_string(), "2020-06-01");
        assert_eq!(acme.category_distribution["advanced-computing"], 1);
    }
}
