// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Organization Identity
//!
//! The resolved identity of a company, university, government body, or
//! agency. The preferred identity is the 13-character supplier id; when a
//! record never resolves to one, the fallback is a deterministic hash of
//! `(normalized_name | state | postcode)` so that the same unregistered
//! entity collapses to the same node across runs and sources.
//!
//! ## Invariant
//!
//! Exactly one identity per resolved entity within a run. Merges during
//! enrichment are recorded with provenance on the entity, never by minting a
//! second identity.

use crate::value_objects::SupplierId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix that distinguishes hash-derived identities from supplier ids.
const HASH_PREFIX: &str = "ORG-";

/// Resolved organization identity: supplier id, or deterministic hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Identity derived from a registry supplier id (preferred).
    pub fn from_supplier(id: &SupplierId) -> Self {
        OrganizationId(id.as_str().to_string())
    }

    /// Deterministic fallback identity for entities with no registry id.
    ///
    /// Inputs must already be normalized; this function only concatenates
    /// and hashes, so caller-side normalization is what makes two spellings
    /// of the same entity collide.
    pub fn from_name_key(normalized_name: &str, state: &str, postcode: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized_name.as_bytes());
        hasher.update(b"|");
        hasher.update(state.as_bytes());
        hasher.update(b"|");
        hasher.update(postcode.as_bytes());
        let digest = hex::encode(hasher.finalize());
        OrganizationId(format!("{}{}", HASH_PREFIX, &digest[..16]))
    }

    /// True when the identity came from the supplier registry.
    pub fn is_registry_backed(&self) -> bool {
        !self.0.starts_with(HASH_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplier_identity_is_registry_backed() {
        let sid = SupplierId::parse("Q1U2A3N4T5U6M").unwrap();
        let org = OrganizationId::from_supplier(&sid);
        assert!(org.is_registry_backed());
        assert_eq!(org.as_str(), "Q1U2A3N4T5U6M");
    }

    #[test]
    fn test_hash_identity_deterministic() {
        let a = OrganizationId::from_name_key("ACME ROBOTICS", "CA", "94103");
        let b = OrganizationId::from_name_key("ACME ROBOTICS", "CA", "94103");
        assert_eq!(a, b);
        assert!(!a.is_registry_backed());
    }

    #[test]
    fn test_hash_identity_distinguishes_state() {
        let a = OrganizationId::from_name_key("ACME ROBOTICS", "CA", "94103");
        let b = OrganizationId::from_name_key("ACME ROBOTICS", "NV", "94103");
        assert_ne!(a, b);
    }
}
