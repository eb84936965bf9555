// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Patent Entity
//!
//! A patent filing or grant. Identity is the grant document number when the
//! source provides one; pre-grant records carry a synthetic key tagged as
//! such. The identity is stable across runs; a pre-grant record that later
//! gains a grant number triggers a merge rather than a new node.
//!
//! The merge criterion for pre-grant → grant promotion is an exact
//! (title, first assignee, filing date) match.

use serde::{Deserialize, Serialize};
use chrono::NaiveDate;
use std::fmt;

/// Patent identity: granted document number, or synthetic pre-grant key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PatentIdentity {
    Grant(String),
    PreGrant(String),
}

impl PatentIdentity {
    /// The graph key for this patent. Pre-grant keys carry a `PG-` prefix so
    /// they can never collide with grant document numbers.
    pub fn graph_key(&self) -> String {
        match self {
            PatentIdentity::Grant(num) => num.clone(),
            PatentIdentity::PreGrant(key) => format!("PG-{}", key),
        }
    }

    pub fn is_pre_grant(&self) -> bool {
        matches!(self, PatentIdentity::PreGrant(_))
    }
}

impl fmt::Display for PatentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.graph_key())
    }
}

/// A patent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patent {
    pub identity: PatentIdentity,
    pub title: String,
    pub filing_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    /// IPC/CPC classification codes.
    pub classification_codes: Vec<String>,
    pub language: Option<String>,
    pub assignees: Vec<String>,
}

impl Patent {
    /// Key used by the pre-grant merge check: exact title + first assignee +
    /// filing date.
    pub fn merge_key(&self) -> Option<(String, String, NaiveDate)> {
        let assignee = self.assignees.first()?;
        let filed = self.filing_date?;
        Some((self.title.clone(), assignee.clone(), filed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_grant_key_is_prefixed() {
        let id = PatentIdentity::PreGrant("app-16123456".into());
        assert_eq!(id.graph_key(), "PG-app-16123456");
        assert!(id.is_pre_grant());
    }

    #[test]
    fn test_merge_key_requires_assignee_and_filing_date() {
        let p = Patent {
            identity: PatentIdentity::Grant("11222333".into()),
            title: "Quantum widget".into(),
            filing_date: None,
            publication_date: None,
            classification_codes: vec![],
            language: None,
            assignees: vec![],
        };
        assert!(p.merge_key().is_none());
    }
}
