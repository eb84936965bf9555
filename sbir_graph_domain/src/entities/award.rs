// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Award Entity
//!
//! A small-business R&D award as extracted from the awards source. Awards are
//! created by the extractor and immutable thereafter; enrichment never
//! mutates an award, it produces [`EnrichmentResult`]s that reference it.
//!
//! ## Invariants
//!
//! - `award_id` unique across the run (enforced by the uniqueness rule)
//! - `amount` non-negative, within the configured cap for the phase
//! - `phase` and `agency` non-null

use crate::value_objects::{AwardPhase, LegacyId, NaicsCode, SupplierId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The company block carried on an award row, before entity resolution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AwardCompanyRef {
    pub raw_name: String,
    pub supplier_id: Option<SupplierId>,
    pub legacy_id: Option<LegacyId>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

/// An immutable award record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Award {
    pub award_id: String,
    pub company: AwardCompanyRef,
    pub agency: String,
    pub program: String,
    pub phase: AwardPhase,
    pub amount: f64,
    pub award_date: NaiveDate,
    pub naics: Option<NaicsCode>,
    pub abstract_text: Option<String>,
}

impl Award {
    /// Stable record identity used for enrichment results and graph keys.
    pub fn record_id(&self) -> &str {
        &self.award_id
    }
}
