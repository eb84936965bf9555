// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Patent Assignment Chain Construction
//!
//! For each patent, orders its assignments by record date (reel/frame id
//! breaking ties deterministically), links each assignment to its
//! predecessor, and computes chain metadata: temporal span, last-known
//! assignee, and current ownership.
//!
//! Ownership follows only `ASSIGNMENT`/`MERGER` conveyances; licenses and
//! security interests never transfer it.
//!
//! Input predecessor pointers, when the source carries any, are validated:
//! a cycle means corrupt input, and the whole patent's chain is rejected
//! with a warning rather than loaded.

use chrono::{Datelike, NaiveDate, Utc};
use sbir_graph_domain::entities::PatentAssignment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// One constructed chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentChain {
    pub patent_key: String,
    /// Assignments in record-date order with predecessor links filled in.
    pub assignments: Vec<PatentAssignment>,
    pub span_start: NaiveDate,
    pub span_end: NaiveDate,
    pub last_known_assignee: Option<String>,
    /// Assignee of the last ownership-transferring conveyance.
    pub current_owner: Option<String>,
}

/// A rejected or suspicious chain, surfaced in the run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainWarning {
    pub patent_key: String,
    pub reason: String,
}

/// Builds chains for every patent in the input. Assignments with
/// out-of-range record dates or cyclic input pointers reject the patent.
pub fn build_chains(assignments: Vec<PatentAssignment>) -> (Vec<AssignmentChain>, Vec<ChainWarning>) {
    let current_year = Utc::now().year();
    let mut by_patent: BTreeMap<String, Vec<PatentAssignment>> = BTreeMap::new();
    for assignment in assignments {
        by_patent
            .entry(assignment.patent_key.clone())
            .or_default()
            .push(assignment);
    }

    let mut chains = Vec::with_capacity(by_patent.len());
    let mut warnings = Vec::new();

    'patents: for (patent_key, mut group) in by_patent {
        for a in &group {
            if !a.record_date_plausible(current_year) {
                warnings.push(ChainWarning {
                    patent_key: patent_key.clone(),
                    reason: format!("assignment {} record date {} out of range", a.rf_id, a.record_date),
                });
                continue 'patents;
            }
        }
        if let Some(reason) = input_pointer_cycle(&group) {
            warn!(patent = %patent_key, "rejecting corrupt assignment chain: {}", reason);
            warnings.push(ChainWarning {
                patent_key: patent_key.clone(),
                reason,
            });
            continue;
        }

        // Record-date order; reel/frame id is the deterministic tie-break.
        group.sort_by(|a, b| {
            a.record_date
                .cmp(&b.record_date)
                .then_with(|| a.rf_id.cmp(&b.rf_id))
        });

        // Link the constructed chain.
        for i in 0..group.len() {
            group[i].predecessor_rf_id = if i == 0 {
                None
            } else {
                Some(group[i - 1].rf_id.clone())
            };
        }

        let span_start = group.first().map(|a| a.record_date).unwrap_or_default();
        let span_end = group.last().map(|a| a.record_date).unwrap_or_default();
        let last_known_assignee = group
            .iter()
            .rev()
            .flat_map(|a| a.assignees.first())
            .next()
            .cloned();
        let current_owner = group
            .iter()
            .rev()
            .find(|a| a.conveyance.transfers_ownership())
            .and_then(|a| a.assignees.first())
            .cloned();

        chains.push(AssignmentChain {
            patent_key,
            assignments: group,
            span_start,
            span_end,
            last_known_assignee,
            current_owner,
        });
    }

    (chains, warnings)
}

/// Detects a cycle among input-provided predecessor pointers.
fn input_pointer_cycle(group: &[PatentAssignment]) -> Option<String> {
    let by_id: HashMap<&str, &PatentAssignment> =
        group.iter().map(|a| (a.rf_id.as_str(), a)).collect();

    for start in group {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cursor = start;
        while let Some(pred_id) = cursor.predecessor_rf_id.as_deref() {
            if !seen.insert(cursor.rf_id.as_str()) {
                return Some(format!("predecessor cycle through {}", cursor.rf_id));
            }
            match by_id.get(pred_id) {
                Some(pred) => cursor = pred,
                None => break, // pointer outside the group; construction relinks anyway
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_graph_domain::entities::ConveyanceType;

    fn assignment(rf: &str, patent: &str, date: (i32, u32, u32), conveyance: ConveyanceType, assignee: &str) -> PatentAssignment {
        PatentAssignment {
            rf_id: rf.into(),
            conveyance,
            execution_date: None,
            record_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            employer_assignment: false,
            patent_key: patent.into(),
            assignors: vec!["INVENTOR".into()],
            assignees: vec![assignee.into()],
            predecessor_rf_id: None,
        }
    }

    #[test]
    fn test_chain_ordered_and_linked() {
        let (chains, warnings) = build_chains(vec![
            assignment("200-2", "P1", (2018, 5, 1), ConveyanceType::Assignment, "BETA LLC"),
            assignment("100-1", "P1", (2015, 3, 1), ConveyanceType::Assignment, "ALPHA INC"),
            assignment("300-3", "P1", (2020, 7, 1), ConveyanceType::License, "GAMMA BANK"),
        ]);
        assert!(warnings.is_empty());
        let chain = &chains[0];
        assert_eq!(chain.assignments[0].rf_id, "100-1");
        assert_eq!(chain.assignments[1].predecessor_rf_id.as_deref(), Some("100-1"));
        assert_eq!(chain.assignments[2].predecessor_rf_id.as_deref(), Some("200-2"));
        assert_eq!(chain.span_start.to_string(), "2015-03-01");
        assert_eq!(chain.span_end.to_string(), "2020-07-01");
    }

    #[test]
    fn test_license_does_not_change_ownership() {
        let (chains, _) = build_chains(vec![
            assignment("100-1", "P1", (2015, 3, 1), ConveyanceType::Assignment, "ALPHA INC"),
            assignment("200-2", "P1", (2018, 5, 1), ConveyanceType::SecurityInterest, "LENDER BANK"),
            assignment("300-3", "P1", (2020, 7, 1), ConveyanceType::License, "LICENSEE CO"),
        ]);
        let chain = &chains[0];
        assert_eq!(chain.current_owner.as_deref(), Some("ALPHA INC"));
        assert_eq!(chain.last_known_assignee.as_deref(), Some("LICENSEE CO"));
    }

    #[test]
    fn test_same_day_ties_break_by_rf_id() {
        let (chains, _) = build_chains(vec![
            assignment("B-2", "P1", (2019, 1, 1), ConveyanceType::Assignment, "SECOND"),
            assignment("A-1", "P1", (2019, 1, 1), ConveyanceType::Assignment, "FIRST"),
        ]);
        assert_eq!(chains[0].assignments[0].rf_id, "A-1");
        assert_eq!(chains[0].current_owner.as_deref(), Some("SECOND"));
    }

    #[test]
    fn test_cyclic_input_pointers_rejected() {
        let mut a = assignment("100-1", "P1", (2015, 3, 1), ConveyanceType::Assignment, "X");
        let mut b = assignment("200-2", "P1", (2016, 3, 1), ConveyanceType::Assignment, "Y");
        a.predecessor_rf_id = Some("200-2".into());
        b.predecessor_rf_id = Some("100-1".into());
        let (chains, warnings) = build_chains(vec![a, b]);
        assert!(chains.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].reason.contains("cycle"));
    }

    #[test]
    fn test_pre_1790_record_date_rejected() {
        let (chains, warnings) = build_chains(vec![assignment(
            "100-1",
            "P1",
            (1700, 1, 1),
            ConveyanceType::Assignment,
            "X",
        )]);
        assert!(chains.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_chains_are_per_patent() {
        let (chains, _) = build_chains(vec![
            assignment("100-1", "P1", (2015, 1, 1), ConveyanceType::Assignment, "A"),
            assignment("200-2", "P2", (2016, 1, 1), ConveyanceType::Assignment, "B"),
        ]);
        assert_eq!(chains.len(), 2);
        assert!(chains.iter().all(|c| c.assignments.len() == 1));
        assert!(chains.iter().all(|c| c.assignments[0].predecessor_rf_id.is_none()));
    }
}
