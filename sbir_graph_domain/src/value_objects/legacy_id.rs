// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Nine-digit legacy entity identifier, the predecessor of the supplier id.
//! Retained as a secondary exact-match key during enrichment.

use crate::EtlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 9-digit numeric legacy identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacyId(String);

impl LegacyId {
    pub const LENGTH: usize = 9;

    /// Parses a legacy identifier, stripping an optional embedded hyphen
    /// (`12-3456789` and `123456789` are the same identifier).
    pub fn parse(raw: &str) -> Result<Self, EtlError> {
        let digits: String = raw.chars().filter(|c| *c != '-').collect();
        if digits.len() != Self::LENGTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EtlError::ValidationFailed(format!(
                "legacy id '{}' is not a 9-digit identifier",
                raw
            )));
        }
        Ok(LegacyId(digits))
    }

    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_hyphenated() {
        assert_eq!(LegacyId::parse("123456789").unwrap().as_str(), "123456789");
        assert_eq!(LegacyId::parse("12-3456789").unwrap().as_str(), "123456789");
    }

    #[test]
    fn test_rejects_short_and_alpha() {
        assert!(LegacyId::parse("12345678").is_err());
        assert!(LegacyId::parse("12345678A").is_err());
    }
}
