// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Supplier Identifier
//!
//! The 13-character uppercase alphanumeric identifier assigned to entities in
//! the federal supplier registry. This is the preferred identity for an
//! [`Organization`](crate::entities::Organization); everything else is a
//! fallback.
//!
//! ## Validation Rules
//!
//! - Exactly 13 characters
//! - ASCII alphanumeric only
//! - Lowercase input is canonicalized to uppercase before validation
//!
//! ## Determinism
//!
//! Construction is pure: the same input string always produces the same
//! result, which keeps enrichment and fingerprinting reproducible.

use crate::EtlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 13-character uppercase alphanumeric supplier registry identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(String);

impl SupplierId {
    /// Expected identifier length in characters.
    pub const LENGTH: usize = 13;

    /// Parses and canonicalizes a supplier identifier.
    pub fn parse(raw: &str) -> Result<Self, EtlError> {
        let canonical = raw.trim().to_ascii_uppercase();
        if canonical.len() != Self::LENGTH {
            return Err(EtlError::ValidationFailed(format!(
                "supplier id '{}' has length {}, expected {}",
                raw,
                canonical.len(),
                Self::LENGTH
            )));
        }
        if !canonical.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(EtlError::ValidationFailed(format!(
                "supplier id '{}' contains non-alphanumeric characters",
                raw
            )));
        }
        Ok(SupplierId(canonical))
    }

    /// Checks format validity without constructing.
    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SupplierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
