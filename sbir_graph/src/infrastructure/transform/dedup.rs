// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Organization Deduplication
//!
//! Collapses enriched award recipients into unique organizations. The
//! canonical identity is the supplier id when the enrichment evidence
//! carries one; otherwise the deterministic hash of
//! `(normalized_name | state | postcode)`. Later records update attributes
//! of the entity they resolve to, and every contributing source context is
//! merged into the entity's list; records are never dropped, only merged.

use crate::infrastructure::enrichment::{EnrichedAward, FIELD_RECIPIENT};
use sbir_graph_domain::entities::{Organization, OrganizationType};
use sbir_graph_domain::services::normalizer::{normalize_address, normalize_name};
use sbir_graph_domain::value_objects::{OrganizationId, SupplierId};
use std::collections::BTreeMap;

/// An award linked to its resolved organization.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAward {
    pub enriched: EnrichedAward,
    pub organization_id: OrganizationId,
    /// Method that justified the link, copied from the winning strategy.
    pub method: String,
    pub confidence: f64,
}

/// Streaming organization resolver; feed chunks, then take the entities.
#[derive(Debug, Default)]
pub struct OrganizationResolver {
    organizations: BTreeMap<String, Organization>,
}

/// Classifies an organization from its resolved name. University and
/// government detection is heuristic by design; unmatched entities are
/// companies, which this corpus overwhelmingly is.
fn classify(normalized_name: &str) -> OrganizationType {
    if normalized_name.contains("UNIVERSITY")
        || normalized_name.contains("COLLEGE")
        || normalized_name.contains("INSTITUTE OF TECHNOLOGY")
    {
        OrganizationType::University
    } else if normalized_name.contains("DEPARTMENT OF") || normalized_name.contains("FEDERAL") {
        OrganizationType::Government
    } else {
        OrganizationType::Company
    }
}

impl OrganizationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves one chunk of enriched awards, merging into the entity map.
    pub fn resolve_chunk(&mut self, source: &str, chunk: Vec<EnrichedAward>) -> Vec<ResolvedAward> {
        chunk
            .into_iter()
            .map(|enriched| self.resolve_one(source, enriched))
            .collect()
    }

    fn resolve_one(&mut self, source: &str, enriched: EnrichedAward) -> ResolvedAward {
        let award = &enriched.award;
        let recipient = enriched.result_for(FIELD_RECIPIENT);

        // The resolved display name: enriched registry name, else raw.
        let resolved_name = recipient
            .and_then(|r| r.enriched_value.as_ref())
            .and_then(|v| v.as_str())
            .unwrap_or(&award.company.raw_name)
            .to_string();
        let normalized = normalize_name(&resolved_name);

        // Supplier id from the award itself, or surfaced in the winning
        // strategy's evidence (API hits carry one).
        let supplier_id = award.company.supplier_id.clone().or_else(|| {
            recipient
                .and_then(|r| r.evidence.iter().find(|a| a.confidence == Some(r.confidence)))
                .and_then(|a| a.detail.get("supplier_id"))
                .and_then(|v| v.as_str())
                .and_then(|s| SupplierId::parse(s).ok())
        });

        let address = normalize_address(
            award.company.street.as_deref().unwrap_or(""),
            award.company.city.as_deref().unwrap_or(""),
            award.company.state.as_deref().unwrap_or(""),
            award.company.postcode.as_deref().unwrap_or(""),
        );

        let organization_id = match &supplier_id {
            Some(sid) => OrganizationId::from_supplier(sid),
            None => OrganizationId::from_name_key(
                &normalized,
                address.state.as_deref().unwrap_or(""),
                address.postcode.as_deref().unwrap_or(""),
            ),
        };

        let (method, confidence) = recipient
            .map(|r| (r.method.clone(), r.confidence.value()))
            .unwrap_or_else(|| ("unresolved".to_string(), 0.0));

        let entry = self
            .organizations
            .entry(organization_id.as_str().to_string())
            .or_insert_with(|| {
                Organization::new(organization_id.clone(), normalized.clone(), classify(&normalized))
            });
        // Later records update earlier attributes.
        if entry.address.state.is_none() {
            entry.address.state = address.state;
        }
        if entry.address.postcode.is_none() {
            entry.address.postcode = address.postcode;
        }
        if entry.address.city.is_none() {
            entry.address.city = address.city;
        }
        if entry.address.street.is_none() {
            entry.address.street = address.street;
        }
        entry.record_merge(source, &award.company.raw_name, &method);

        ResolvedAward {
            enriched,
            organization_id,
            method,
            confidence,
        }
    }

    /// The deduplicated entities, keyed by organization id.
    pub fn into_organizations(self) -> Vec<Organization> {
        self.organizations.into_values().collect()
    }

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::enrichment::FIELD_NAICS;
    use sbir_graph_domain::entities::{Award, AwardCompanyRef, EnrichmentResult, EnrichmentSource};
    use sbir_graph_domain::value_objects::{AwardPhase, Confidence, FieldValue};

    fn enriched(id: &str, raw_name: &str, resolved: Option<&str>, state: &str, postcode: &str) -> EnrichedAward {
        let award = Award {
            award_id: id.into(),
            company: AwardCompanyRef {
                raw_name: raw_name.into(),
                supplier_id: None,
                legacy_id: None,
                street: None,
                city: None,
                state: Some(state.into()),
                postcode: Some(postcode.into()),
            },
            agency: "NSF".into(),
            program: "SBIR".into(),
            phase: AwardPhase::One,
            amount: 100_000.0,
            award_date: chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            naics: None,
            abstract_text: None,
        };
        let results = match resolved {
            Some(name) => vec![EnrichmentResult {
                target_record_id: id.into(),
                field_name: FIELD_RECIPIENT.into(),
                enriched_value: Some(FieldValue::Str(name.into())),
                original_value: Some(FieldValue::Str(raw_name.into())),
                confidence: Confidence::new(0.69).unwrap(),
                source: EnrichmentSource::NameFuzzy,
                method: "token_sort_ratio>=0.80".into(),
                evidence: vec![],
                timestamp: chrono::Utc::now(),
            }],
            None => vec![EnrichmentResult::no_match(
                id,
                FIELD_NAICS,
                None,
                vec![],
                chrono::Utc::now(),
            )],
        };
        EnrichedAward { award, results }
    }

    #[test]
    fn test_same_entity_different_spellings_merge() {
        let mut resolver = OrganizationResolver::new();
        let resolved = resolver.resolve_chunk(
            "awards",
            vec![
                enriched("A-1", "Acme Robotics LLC", Some("ACME ROBOTICS L.L.C."), "CA", "94103"),
                enriched("A-2", "ACME ROBOTICS L.L.C.", Some("ACME ROBOTICS L.L.C."), "CA", "94103"),
            ],
        );
        assert_eq!(resolver.organization_count(), 1);
        assert_eq!(resolved[0].organization_id, resolved[1].organization_id);

        let orgs = resolver.into_organizations();
        assert_eq!(orgs[0].raw_names.len(), 2);
        assert_eq!(orgs[0].merges.len(), 2);
    }

    #[test]
    fn test_different_states_stay_distinct() {
        let mut resolver = OrganizationResolver::new();
        let resolved = resolver.resolve_chunk(
            "awards",
            vec![
                enriched("A-1", "Acme Robotics", Some("ACME ROBOTICS"), "CA", "94103"),
                enriched("A-2", "Acme Robotics", Some("ACME ROBOTICS"), "NV", "89501"),
            ],
        );
        assert_ne!(resolved[0].organization_id, resolved[1].organization_id);
        assert_eq!(resolver.organization_count(), 2);
    }

    #[test]
    fn test_university_classification() {
        let mut resolver = OrganizationResolver::new();
        resolver.resolve_chunk(
            "awards",
            vec![enriched("A-1", "State University Research Lab", None, "TX", "73301")],
        );
        let orgs = resolver.into_organizations();
        assert_eq!(orgs[0].organization_type, OrganizationType::University);
    }
}
