// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Award program phase. Phase caps (the maximum award amount a phase may
//! carry) live in configuration; the cross-field validation rule reads them
//! from there.

use crate::EtlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Program phase of an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AwardPhase {
    #[serde(rename = "I")]
    One,
    #[serde(rename = "II")]
    Two,
    #[serde(rename = "III")]
    Three,
}

impl AwardPhase {
    /// Parses the roman-numeral form used by the source files.
    pub fn parse(raw: &str) -> Result<Self, EtlError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "I" | "1" | "PHASE I" => Ok(AwardPhase::One),
            "II" | "2" | "PHASE II" => Ok(AwardPhase::Two),
            "III" | "3" | "PHASE III" => Ok(AwardPhase::Three),
            other => Err(EtlError::ValidationFailed(format!(
                "unknown award phase '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AwardPhase::One => "I",
            AwardPhase::Two => "II",
            AwardPhase::Three => "III",
        }
    }
}

impl fmt::Display for AwardPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(AwardPhase::parse("I").unwrap(), AwardPhase::One);
        assert_eq!(AwardPhase::parse("phase ii").unwrap(), AwardPhase::Two);
        assert_eq!(AwardPhase::parse("3").unwrap(), AwardPhase::Three);
        assert!(AwardPhase::parse("IV").is_err());
    }
}
