// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Patent Assignment Entity
//!
//! One recorded conveyance of patent rights, identified by its reel/frame id.
//! Assignments form per-patent chains ordered by record date; only
//! `ASSIGNMENT`-type conveyances transfer ownership, while licenses and
//! security interests leave the current assignee unchanged.
//!
//! ## Invariants
//!
//! - `rf_id` unique
//! - every assignment references an existing patent
//! - the chain is acyclic; record dates fall within 1790..=current year

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of conveyance recorded on an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConveyanceType {
    Assignment,
    License,
    SecurityInterest,
    Merger,
    Other,
}

impl ConveyanceType {
    /// Parses the free-text conveyance description used by the source.
    pub fn from_conveyance_text(text: &str) -> Self {
        let upper = text.to_ascii_uppercase();
        if upper.contains("SECURITY") {
            ConveyanceType::SecurityInterest
        } else if upper.contains("LICENSE") {
            ConveyanceType::License
        } else if upper.contains("MERGER") {
            ConveyanceType::Merger
        } else if upper.contains("ASSIGN") {
            ConveyanceType::Assignment
        } else {
            ConveyanceType::Other
        }
    }

    /// Whether this conveyance transfers ownership.
    pub fn transfers_ownership(&self) -> bool {
        matches!(self, ConveyanceType::Assignment | ConveyanceType::Merger)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConveyanceType::Assignment => "ASSIGNMENT",
            ConveyanceType::License => "LICENSE",
            ConveyanceType::SecurityInterest => "SECURITY_INTEREST",
            ConveyanceType::Merger => "MERGER",
            ConveyanceType::Other => "OTHER",
        }
    }
}

/// A recorded assignment joined from the five-table source by reel/frame id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentAssignment {
    /// Reel/frame identity, unique across the corpus.
    pub rf_id: String,
    pub conveyance: ConveyanceType,
    pub execution_date: Option<NaiveDate>,
    pub record_date: NaiveDate,
    /// Set when the conveyance is an employer assignment (inventor → employer).
    pub employer_assignment: bool,
    /// Graph key of the patent this assignment conveys.
    pub patent_key: String,
    pub assignors: Vec<String>,
    pub assignees: Vec<String>,
    /// Reel/frame id of the predecessor in the per-patent chain, when linked.
    pub predecessor_rf_id: Option<String>,
}

impl PatentAssignment {
    /// Earliest plausible record date; anything before this is corrupt input.
    pub const MIN_RECORD_YEAR: i32 = 1790;

    /// Checks the record-date invariant against the given current year.
    pub fn record_date_plausible(&self, current_year: i32) -> bool {
        let year = self.record_date.format("%Y").to_string().parse::<i32>().unwrap_or(0);
        (Self::MIN_RECORD_YEAR..=current_year).contains(&year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conveyance_classification() {
        assert_eq!(
            ConveyanceType::from_conveyance_text("ASSIGNMENT OF ASSIGNORS INTEREST"),
            ConveyanceType::Assignment
        );
        assert_eq!(
            ConveyanceType::from_conveyance_text("SECURITY INTEREST"),
            ConveyanceType::SecurityInterest
        );
        assert_eq!(
            ConveyanceType::from_conveyance_text("EXCLUSIVE LICENSE"),
            ConveyanceType::License
        );
        assert_eq!(ConveyanceType::from_conveyance_text("CHANGE OF NAME"), ConveyanceType::Other);
    }

    #[test]
    fn test_only_assignment_and_merger_transfer_ownership() {
        assert!(ConveyanceType::Assignment.transfers_ownership());
        assert!(ConveyanceType::Merger.transfers_ownership());
        assert!(!ConveyanceType::License.transfers_ownership());
        assert!(!ConveyanceType::SecurityInterest.transfers_ownership());
    }

    #[test]
    fn test_record_date_bounds() {
        let a = PatentAssignment {
            rf_id: "12345-678".into(),
            conveyance: ConveyanceType::Assignment,
            execution_date: None,
            record_date: NaiveDate::from_ymd_opt(1789, 1, 1).unwrap(),
            employer_assignment: false,
            patent_key: "11222333".into(),
            assignors: vec![],
            assignees: vec![],
            predecessor_rf_id: None,
        };
        assert!(!a.record_date_plausible(2025));
    }
}
