// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reference Corpus Index
//!
//! Multi-key index over the reference corpora: the supplier registry plus
//! the federal contracts recipient table.
//!
//! | Key | Semantics |
//! |---|---|
//! | supplier_id | exact, primary |
//! | legacy_id | exact, secondary |
//! | normalized_name | multi-valued collision bucket |
//! | (normalized_name, state) | tie-breaker |
//!
//! Construction is a single O(n) pass and the result is memory-resident for
//! the run. Callers concatenate corpora in authority order: on exact-key
//! collisions the first entry wins, so the registry entry beats a contract
//! recipient carrying the same identifier. Name buckets keep every entry.
//! Laziness is handled by the holder: a `tokio::sync::OnceCell` guards the
//! one-time build, and every worker shares the same immutable instance
//! behind an `Arc`.

use sbir_graph_domain::services::normalizer::normalize_name;
use sbir_graph_domain::value_objects::{LegacyId, SupplierId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// One reference entity as indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub supplier_id: Option<SupplierId>,
    pub legacy_id: Option<LegacyId>,
    /// Registered (raw) name.
    pub name: String,
    pub normalized_name: String,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

/// Immutable multi-key index.
#[derive(Debug, Default)]
pub struct LookupIndex {
    entries: Vec<IndexEntry>,
    by_supplier: HashMap<String, usize>,
    by_legacy: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
    by_name_state: HashMap<(String, String), Vec<usize>>,
}

impl LookupIndex {
    /// Builds every key map in one pass.
    pub fn build(entries: Vec<IndexEntry>) -> Self {
        let mut index = LookupIndex {
            by_supplier: HashMap::with_capacity(entries.len()),
            by_legacy: HashMap::with_capacity(entries.len()),
            by_name: HashMap::with_capacity(entries.len()),
            by_name_state: HashMap::with_capacity(entries.len()),
            entries,
        };

        for (i, entry) in index.entries.iter().enumerate() {
            // First occurrence wins on exact keys; corpora arrive in
            // authority order.
            if let Some(sid) = &entry.supplier_id {
                index.by_supplier.entry(sid.as_str().to_string()).or_insert(i);
            }
            if let Some(lid) = &entry.legacy_id {
                index.by_legacy.entry(lid.as_str().to_string()).or_insert(i);
            }
            index
                .by_name
                .entry(entry.normalized_name.clone())
                .or_default()
                .push(i);
            if let Some(state) = &entry.state {
                index
                    .by_name_state
                    .entry((entry.normalized_name.clone(), state.clone()))
                    .or_default()
                    .push(i);
            }
        }

        info!(entities = index.entries.len(), "lookup index built");
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact supplier-id lookup.
    pub fn by_supplier_id(&self, id: &SupplierId) -> Option<&IndexEntry> {
        self.by_supplier.get(id.as_str()).map(|i| &self.entries[*i])
    }

    /// Exact legacy-id lookup.
    pub fn by_legacy_id(&self, id: &LegacyId) -> Option<&IndexEntry> {
        self.by_legacy.get(id.as_str()).map(|i| &self.entries[*i])
    }

    /// Collision bucket for a raw name (normalized internally).
    pub fn by_name(&self, raw_name: &str) -> Vec<&IndexEntry> {
        let normalized = normalize_name(raw_name);
        self.by_name
            .get(&normalized)
            .map(|bucket| bucket.iter().map(|i| &self.entries[*i]).collect())
            .unwrap_or_default()
    }

    /// Tie-broken bucket: same normalized name and state.
    pub fn by_name_and_state(&self, raw_name: &str, state: &str) -> Vec<&IndexEntry> {
        let key = (normalize_name(raw_name), state.to_ascii_uppercase());
        self.by_name_state
            .get(&key)
            .map(|bucket| bucket.iter().map(|i| &self.entries[*i]).collect())
            .unwrap_or_default()
    }

    /// All entries, for fuzzy scans. Strategies restrict by state first when
    /// they can; the full scan is the last resort.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Entries registered in one state.
    pub fn entries_in_state(&self, state: &str) -> Vec<&IndexEntry> {
        let state = state.to_ascii_uppercase();
        self.entries
            .iter()
            .filter(|e| e.state.as_deref() == Some(state.as_str()))
            .collect()
    }
}

/// Lazily-built, run-shared index holder.
#[derive(Clone, Default)]
pub struct SharedLookupIndex {
    cell: Arc<OnceCell<Arc<LookupIndex>>>,
}

impl SharedLookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index, building it on first demand. Concurrent callers
    /// share one build; later callers get the cached instance.
    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<LookupIndex>, sbir_graph_domain::EtlError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<IndexEntry>, sbir_graph_domain::EtlError>>,
    {
        self.cell
            .get_or_try_init(|| async { build().await.map(|entries| Arc::new(LookupIndex::build(entries))) })
            .await
            .cloned()
    }

    /// The already-built index, if any.
    pub fn peek(&self) -> Option<Arc<LookupIndex>> {
        self.cell.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(supplier: Option<&str>, legacy: Option<&str>, name: &str, state: Option<&str>) -> IndexEntry {
        IndexEntry {
            supplier_id: supplier.map(|s| SupplierId::parse(s).unwrap()),
            legacy_id: legacy.map(|l| LegacyId::parse(l).unwrap()),
            name: name.to_string(),
            normalized_name: normalize_name(name),
            state: state.map(|s| s.to_string()),
            postcode: None,
        }
    }

    fn build_sample() -> LookupIndex {
        LookupIndex::build(vec![
            entry(
                Some("Q1U2A3N4T5U6M"),
                Some("123456789"),
                "Quantum Dynamics Incorporated",
                Some("VA"),
            ),
            entry(None, None, "ACME ROBOTICS L.L.C.", Some("CA")),
            entry(None, None, "Acme Robotics LLC", Some("NV")),
        ])
    }

    #[test]
    fn test_exact_keys() {
        let index = build_sample();
        let sid = SupplierId::parse("Q1U2A3N4T5U6M").unwrap();
        assert_eq!(index.by_supplier_id(&sid).unwrap().state.as_deref(), Some("VA"));
        let lid = LegacyId::parse("123456789").unwrap();
        assert_eq!(index.by_legacy_id(&lid).unwrap().name, "Quantum Dynamics Incorporated");
    }

    #[test]
    fn test_first_corpus_wins_exact_keys() {
        // Registry entry first, contract recipient with the same id second.
        let index = LookupIndex::build(vec![
            entry(Some("Q1U2A3N4T5U6M"), None, "Quantum Dynamics Incorporated", Some("VA")),
            entry(Some("Q1U2A3N4T5U6M"), None, "QUANTUM DYNAMICS INC", None),
        ]);
        let sid = SupplierId::parse("Q1U2A3N4T5U6M").unwrap();
        assert_eq!(index.by_supplier_id(&sid).unwrap().name, "Quantum Dynamics Incorporated");
        // Both spellings still live in the name buckets.
        assert_eq!(index.by_name("Quantum Dynamics").len(), 2);
    }

    #[test]
    fn test_name_bucket_collides_and_state_tie_breaks() {
        let index = build_sample();
        let bucket = index.by_name("Acme Robotics");
        assert_eq!(bucket.len(), 2);
        let ca_only = index.by_name_and_state("Acme Robotics", "ca");
        assert_eq!(ca_only.len(), 1);
        assert_eq!(ca_only[0].state.as_deref(), Some("CA"));
    }

    #[tokio::test]
    async fn test_shared_index_builds_once() {
        let shared = SharedLookupIndex::new();
        let first = shared
            .get_or_build(|| async { Ok(vec![entry(None, None, "Solo Corp", Some("TX"))]) })
            .await
            .unwrap();
        // Second build closure must not run; index identity is stable.
        let rebuilt = std::sync::atomic::AtomicBool::new(false);
        let second = shared
            .get_or_build(|| async {
                rebuilt.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(Vec::new())
            })
            .await
            .unwrap();
        assert!(!rebuilt.load(std::sync::atomic::Ordering::SeqCst));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
    }
}
