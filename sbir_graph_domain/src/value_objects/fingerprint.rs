// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact Fingerprint
//!
//! A fingerprint is the deterministic identity of an artifact's inputs:
//! `H(code_version, config_slice, sorted_input_fingerprints)` over SHA-256.
//! Incremental materialization compares fingerprints to decide whether an
//! asset may be skipped.
//!
//! ## Stability Contract
//!
//! - Identical contributing components always hash to the identical
//!   fingerprint, across processes and platforms.
//! - Input fingerprints are sorted before hashing so that dependency
//!   declaration order never leaks into the identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 identity of an artifact's contributing inputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes a fingerprint from the contributing components.
    ///
    /// `config_slice` must already be a canonical serialization of the
    /// configuration subset the asset reads (sorted keys), otherwise two
    /// semantically equal configurations could fingerprint differently.
    pub fn compute(code_version: &str, config_slice: &str, input_fingerprints: &[Fingerprint]) -> Self {
        let mut sorted: Vec<&str> = input_fingerprints.iter().map(|f| f.as_str()).collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(code_version.as_bytes());
        hasher.update([0u8]);
        hasher.update(config_slice.as_bytes());
        for input in sorted {
            hasher.update([0u8]);
            hasher.update(input.as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-computed hex digest (e.g. read back from a sidecar).
    pub fn from_hex(digest: impl Into<String>) -> Self {
        Fingerprint(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used in log lines and directory listings.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::compute("v1", "{}", &[]);
        let b = Fingerprint::compute("v1", "{}", &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_component_changes_identity() {
        let base = Fingerprint::compute("v1", "{\"n\":1}", &[]);
        assert_ne!(base, Fingerprint::compute("v2", "{\"n\":1}", &[]));
        assert_ne!(base, Fingerprint::compute("v1", "{\"n\":2}", &[]));
        let upstream = Fingerprint::compute("v1", "{}", &[]);
        assert_ne!(base, Fingerprint::compute("v1", "{\"n\":1}", &[upstream]));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let x = Fingerprint::from_hex("aa");
        let y = Fingerprint::from_hex("bb");
        assert_eq!(
            Fingerprint::compute("v1", "{}", &[x.clone(), y.clone()]),
            Fingerprint::compute("v1", "{}", &[y, x])
        );
    }
}
