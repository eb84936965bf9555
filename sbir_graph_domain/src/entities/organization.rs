// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Organization Entity
//!
//! The unified entity covering companies, universities, government bodies,
//! and funding agencies. Organizations are created or merged during
//! enrichment, updated by later sources, and never deleted, only
//! superseded, with every merge recorded as provenance.

use crate::value_objects::OrganizationId;
use serde::{Deserialize, Serialize};

/// Classification of a resolved organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationType {
    Company,
    University,
    Government,
    Agency,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::Company => "COMPANY",
            OrganizationType::University => "UNIVERSITY",
            OrganizationType::Government => "GOVERNMENT",
            OrganizationType::Agency => "AGENCY",
        }
    }
}

/// Address components after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    /// Two-letter US state code.
    pub state: Option<String>,
    /// Five-digit zip, or zip+4 when present in the source.
    pub postcode: Option<String>,
}

/// Record of one merge absorbed into this organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeProvenance {
    /// Source tag of the record that was merged in.
    pub source: String,
    /// Raw name as it appeared in that source.
    pub raw_name: String,
    /// Method that justified the merge (e.g. "identifier_exact").
    pub method: String,
}

/// A resolved organization with merge history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub organization_id: OrganizationId,
    pub normalized_name: String,
    pub raw_names: Vec<String>,
    pub address: Address,
    pub organization_type: OrganizationType,
    pub merges: Vec<MergeProvenance>,
    /// Source contexts that contributed to this entity, in arrival order.
    pub source_contexts: Vec<String>,
}

impl Organization {
    pub fn new(
        organization_id: OrganizationId,
        normalized_name: impl Into<String>,
        organization_type: OrganizationType,
    ) -> Self {
        Self {
            organization_id,
            normalized_name: normalized_name.into(),
            raw_names: Vec::new(),
            address: Address::default(),
            organization_type,
            merges: Vec::new(),
            source_contexts: Vec::new(),
        }
    }

    /// Records a raw spelling without duplicating.
    pub fn add_raw_name(&mut self, raw: &str) {
        if !self.raw_names.iter().any(|n| n == raw) {
            self.raw_names.push(raw.to_string());
        }
    }

    /// Records a contributing source context without duplicating.
    pub fn add_source_context(&mut self, context: &str) {
        if !self.source_contexts.iter().any(|c| c == context) {
            self.source_contexts.push(context.to_string());
        }
    }

    /// Absorbs another record into this entity, keeping provenance.
    pub fn record_merge(&mut self, source: &str, raw_name: &str, method: &str) {
        self.add_raw_name(raw_name);
        self.add_source_context(source);
        self.merges.push(MergeProvenance {
            source: source.to_string(),
            raw_name: raw_name.to_string(),
            method: method.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_provenance_and_dedupes_names() {
        let id = OrganizationId::from_name_key("ACME ROBOTICS", "CA", "94103");
        let mut org = Organization::new(id, "ACME ROBOTICS", OrganizationType::Company);
        org.record_merge("awards", "Acme Robotics LLC", "name_fuzzy");
        org.record_merge("contracts", "Acme Robotics LLC", "identifier_exact");
        assert_eq!(org.raw_names.len(), 1);
        assert_eq!(org.merges.len(), 2);
        assert_eq!(org.source_contexts, vec!["awards", "contracts"]);
    }
}
