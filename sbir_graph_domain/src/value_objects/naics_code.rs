// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Six-digit NAICS industry classification code. The two leading digits name
//! the sector, which is what the sector-fallback enrichment strategy and the
//! NAICS→sector transformer operate on.

use crate::EtlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 6-digit NAICS code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaicsCode(String);

impl NaicsCode {
    pub const LENGTH: usize = 6;

    pub fn parse(raw: &str) -> Result<Self, EtlError> {
        let trimmed = raw.trim();
        if trimmed.len() != Self::LENGTH || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EtlError::ValidationFailed(format!(
                "NAICS code '{}' is not a 6-digit code",
                raw
            )));
        }
        Ok(NaicsCode(trimmed.to_string()))
    }

    pub fn is_valid(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit sector prefix.
    pub fn sector_prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for NaicsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
