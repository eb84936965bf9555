// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Graph Loader
//!
//! Idempotent projection of prepared batches into the property graph.
//!
//! ## Protocol
//!
//! 1. **Bootstrap** (once per run): constraints and indexes are ensured,
//!    then the schema-version marker is checked; a mismatch refuses the
//!    load with a migration-required error before any write.
//! 2. **Nodes before edges**: all node batches of an asset complete before
//!    its relationship batches start. Cross-asset ordering is the asset
//!    runtime's dependency graph.
//! 3. **Chains**: assignment batches arrive globally sorted by record date
//!    from the transformer; the loader additionally sorts within each batch
//!    and loads chain nodes sequentially so predecessors always precede
//!    successors.
//!
//! ## Contention Discipline
//!
//! Parallel workers own disjoint partitions by key hash, which avoids most
//! write-write contention. A batch hitting a transient conflict retries
//! with exponential backoff; when retries are exhausted the batch is split
//! in half and the halves retried, down to single records. A single record
//! that still fails lands in the failed-record report and the load
//! continues.

use crate::infrastructure::config::LoaderConfig;
use crate::infrastructure::graph::schema;
use sbir_graph_bootstrap::CancellationToken;
use sbir_graph_domain::repositories::{BatchOutcome, EdgeSpec, GraphRepository, NodeSpec};
use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};

/// One record the loader gave up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub key: String,
    pub error: String,
}

/// Outcome of one load call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub created: u64,
    pub updated: u64,
    /// Keys skipped on unique-constraint violations.
    pub constraint_skipped: Vec<String>,
    pub failed_records: Vec<FailedRecord>,
    pub retries: u64,
}

impl LoadReport {
    fn absorb_outcome(&mut self, outcome: BatchOutcome) {
        self.created += outcome.created;
        self.updated += outcome.updated;
        self.constraint_skipped.extend(outcome.skipped_keys);
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.constraint_skipped.extend(other.constraint_skipped);
        self.failed_records.extend(other.failed_records);
        self.retries += other.retries;
    }
}

/// The graph loader. One instance per run, sole mutator of the graph.
pub struct GraphLoader {
    repo: Arc<dyn GraphRepository>,
    config: LoaderConfig,
    expected_schema_version: i64,
}

impl GraphLoader {
    pub fn new(repo: Arc<dyn GraphRepository>, config: LoaderConfig, expected_schema_version: i64) -> Self {
        Self {
            repo,
            config,
            expected_schema_version,
        }
    }

    /// Constraint/index bootstrap plus the schema-version gate. Must be the
    /// first call of a run.
    pub async fn bootstrap(&self) -> Result<(), EtlError> {
        self.repo.ensure_schema().await?;
        schema::check_version(self.repo.as_ref(), self.expected_schema_version).await
    }

    /// Loads nodes with parallel workers over disjoint key-hash partitions.
    pub async fn load_nodes(
        &self,
        nodes: Vec<NodeSpec>,
        cancel: &CancellationToken,
    ) -> Result<LoadReport, EtlError> {
        let workers = self.config.workers.max(1);
        let mut partitions: Vec<Vec<NodeSpec>> = (0..workers).map(|_| Vec::new()).collect();
        for node in nodes {
            let slot = (key_hash(&node.key) % workers as u64) as usize;
            partitions[slot].push(node);
        }

        check_cancel(cancel)?;
        let mut handles = Vec::with_capacity(workers);
        for partition in partitions {
            if partition.is_empty() {
                continue;
            }
            let repo = Arc::clone(&self.repo);
            let config = self.config.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                load_node_partition(repo, config, partition, cancel).await
            }));
        }

        let mut report = LoadReport::default();
        for handle in handles {
            let partial = handle
                .await
                .map_err(|e| EtlError::internal_error(format!("loader worker panicked: {}", e)))??;
            report.merge(partial);
        }
        Ok(report)
    }

    /// Loads nodes sequentially, preserving caller order. Used for
    /// assignment chains, where predecessors must land first.
    pub async fn load_nodes_ordered(
        &self,
        nodes: Vec<NodeSpec>,
        cancel: &CancellationToken,
    ) -> Result<LoadReport, EtlError> {
        load_node_partition(Arc::clone(&self.repo), self.config.clone(), nodes, cancel.clone()).await
    }

    /// Loads edges. Callers guarantee all referenced nodes are loaded; the
    /// runtime orders node assets before relationship assets.
    pub async fn load_edges(
        &self,
        edges: Vec<EdgeSpec>,
        cancel: &CancellationToken,
    ) -> Result<LoadReport, EtlError> {
        let mut report = LoadReport::default();
        let batch_size = self.config.batch_size.max(1);
        for batch in edges.chunks(batch_size) {
            check_cancel(cancel)?;
            let (outcome, retries, failed) =
                commit_with_split(&*self.repo, &self.config, batch.to_vec(), commit_edges, edge_key).await?;
            report.absorb_outcome(outcome);
            report.retries += retries;
            report.failed_records.extend(failed);
        }
        Ok(report)
    }

    /// Opt-in tombstoning: stamps `deprecated_at` on nodes of `label` whose
    /// keys vanished from the source. Never deletes nodes or edges.
    pub async fn tombstone_missing(
        &self,
        label: sbir_graph_domain::repositories::NodeLabel,
        present_keys: &std::collections::HashSet<String>,
    ) -> Result<u64, EtlError> {
        if !self.config.tombstone_missing {
            return Ok(0);
        }
        let stamped = self.repo.stamp_deprecated(label, present_keys).await?;
        if stamped > 0 {
            warn!(label = label.as_str(), stamped, "tombstoned records missing upstream");
        }
        Ok(stamped)
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), EtlError> {
    if cancel.is_cancelled() {
        Err(EtlError::Cancelled("load abandoned".to_string()))
    } else {
        Ok(())
    }
}

/// Subtractive jitter desynchronizes workers contending on the same lock
/// without ever exceeding the configured backoff bound.
fn jittered(delay: std::time::Duration) -> std::time::Duration {
    use rand::Rng;
    let factor = rand::rng().random_range(0.5..=1.0);
    delay.mul_f64(factor)
}

fn key_hash(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn edge_key(edge: &EdgeSpec) -> String {
    format!("{}-[{}]->{}", edge.src_key, edge.rel.as_str(), edge.dst_key)
}

fn node_key(node: &NodeSpec) -> String {
    node.key.clone()
}

async fn load_node_partition(
    repo: Arc<dyn GraphRepository>,
    config: LoaderConfig,
    nodes: Vec<NodeSpec>,
    cancel: CancellationToken,
) -> Result<LoadReport, EtlError> {
    let mut report = LoadReport::default();
    let batch_size = config.batch_size.max(1);
    for batch in nodes.chunks(batch_size) {
        check_cancel(&cancel)?;
        let (outcome, retries, failed) =
            commit_with_split(&*repo, &config, batch.to_vec(), commit_nodes, node_key).await?;
        report.absorb_outcome(outcome);
        report.retries += retries;
        report.failed_records.extend(failed);
    }
    Ok(report)
}

type CommitFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<BatchOutcome, EtlError>> + Send + 'a>>;

/// Batch commit entry points as plain functions, so the split machinery can
/// recurse generically without higher-ranked closure gymnastics.
fn commit_nodes(repo: &dyn GraphRepository, batch: Vec<NodeSpec>) -> CommitFuture<'_> {
    Box::pin(async move { repo.upsert_nodes(&batch).await })
}

fn commit_edges(repo: &dyn GraphRepository, batch: Vec<EdgeSpec>) -> CommitFuture<'_> {
    Box::pin(async move { repo.upsert_edges(&batch).await })
}

/// Commits one batch with the full conflict discipline: backoff retries,
/// then recursive halving, then per-record failure reports.
async fn commit_with_split<T>(
    repo: &dyn GraphRepository,
    config: &LoaderConfig,
    batch: Vec<T>,
    commit: for<'a> fn(&'a dyn GraphRepository, Vec<T>) -> CommitFuture<'a>,
    describe: fn(&T) -> String,
) -> Result<(BatchOutcome, u64, Vec<FailedRecord>), EtlError>
where
    T: Clone + Send + Sync,
{
    let mut retries = 0u64;

    // Phase 1: retry the whole batch on transient conflicts.
    let mut attempt = 0u32;
    let conflict = loop {
        attempt += 1;
        match commit(repo, batch.clone()).await {
            Ok(outcome) => return Ok((outcome, retries, Vec::new())),
            Err(e @ EtlError::LoaderConflict(_)) if attempt < config.retry.max_attempts => {
                retries += 1;
                let delay = jittered(config.retry.delay_for_attempt(attempt));
                debug!("loader conflict, retrying batch of {} in {:?}: {}", batch.len(), delay, e);
                tokio::time::sleep(delay).await;
            }
            Err(e @ EtlError::LoaderConflict(_)) => break e,
            Err(e) => return Err(e),
        }
    };

    // Phase 2: halve and recurse; single records that still conflict are
    // reported and skipped.
    if batch.len() <= 1 {
        let failed = batch
            .iter()
            .map(|record| FailedRecord {
                key: describe(record),
                error: conflict.to_string(),
            })
            .collect();
        warn!("single-record batch failed after retries: {}", conflict);
        return Ok((BatchOutcome::default(), retries, failed));
    }

    let mid = batch.len() / 2;
    let (left, right) = batch.split_at(mid);
    let (mut outcome, left_retries, mut failed) =
        Box::pin(commit_with_split(repo, config, left.to_vec(), commit, describe)).await?;
    let (right_outcome, right_retries, right_failed) =
        Box::pin(commit_with_split(repo, config, right.to_vec(), commit, describe)).await?;
    outcome.absorb(right_outcome);
    failed.extend(right_failed);
    Ok((outcome, retries + left_retries + right_retries, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::RetryConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sbir_graph_domain::repositories::{NodeLabel, RelType};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Repository stub that fails the first N commits with a conflict.
    struct FlakyRepo {
        conflicts_remaining: AtomicU32,
        committed: Mutex<Vec<usize>>,
    }

    impl FlakyRepo {
        fn new(conflicts: u32) -> Self {
            Self {
                conflicts_remaining: AtomicU32::new(conflicts),
                committed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GraphRepository for FlakyRepo {
        async fn ensure_schema(&self) -> Result<(), EtlError> {
            Ok(())
        }
        async fn schema_version(&self) -> Result<Option<i64>, EtlError> {
            Ok(Some(schema::GRAPH_SCHEMA_VERSION))
        }
        async fn set_schema_version(&self, _version: i64) -> Result<(), EtlError> {
            Ok(())
        }
        async fn upsert_nodes(&self, nodes: &[NodeSpec]) -> Result<BatchOutcome, EtlError> {
            if self
                .conflicts_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EtlError::LoaderConflict("database is locked".into()));
            }
            self.committed.lock().push(nodes.len());
            Ok(BatchOutcome {
                created: nodes.len() as u64,
                updated: 0,
                skipped_keys: vec![],
            })
        }
        async fn upsert_edges(&self, edges: &[EdgeSpec]) -> Result<BatchOutcome, EtlError> {
            Ok(BatchOutcome {
                created: edges.len() as u64,
                updated: 0,
                skipped_keys: vec![],
            })
        }
        async fn stamp_deprecated(
            &self,
            _label: NodeLabel,
            _present_keys: &std::collections::HashSet<String>,
        ) -> Result<u64, EtlError> {
            Ok(0)
        }
        async fn node_count(&self, _label: NodeLabel) -> Result<u64, EtlError> {
            Ok(0)
        }
        async fn edge_count(&self, _rel: RelType) -> Result<u64, EtlError> {
            Ok(0)
        }
    }

    fn fast_loader(repo: Arc<dyn GraphRepository>) -> GraphLoader {
        GraphLoader::new(
            repo,
            LoaderConfig {
                batch_size: 4,
                workers: 2,
                retry: RetryConfig {
                    max_attempts: 2,
                    base_delay_ms: 1,
                    max_delay_ms: 2,
                },
                ..LoaderConfig::default()
            },
            schema::GRAPH_SCHEMA_VERSION,
        )
    }

    fn nodes(n: usize) -> Vec<NodeSpec> {
        (0..n)
            .map(|i| NodeSpec::new(NodeLabel::Organization, format!("ORG-{}", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_transient_conflict_retried_then_succeeds() {
        let repo = Arc::new(FlakyRepo::new(1));
        let loader = fast_loader(repo.clone());
        let cancel = CancellationToken::new();

        let report = loader.load_nodes_ordered(nodes(4), &cancel).await.unwrap();
        assert_eq!(report.created, 4);
        assert_eq!(report.retries, 1);
        assert!(report.failed_records.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_conflict_splits_batch() {
        // Exhausts retries at full size (2 attempts), then splits; the stub
        // keeps conflicting long enough to force recursion.
        let repo = Arc::new(FlakyRepo::new(3));
        let loader = fast_loader(repo.clone());
        let cancel = CancellationToken::new();

        let report = loader.load_nodes_ordered(nodes(4), &cancel).await.unwrap();
        assert_eq!(report.created, 4);
        assert!(report.retries >= 2);
        // Splitting happened: at least one committed batch smaller than 4.
        assert!(repo.committed.lock().iter().any(|n| *n < 4));
    }

    #[tokio::test]
    async fn test_single_record_failure_is_reported_not_fatal() {
        // Enough conflicts that one single-record batch exhausts everything.
        let repo = Arc::new(FlakyRepo::new(100));
        let loader = fast_loader(repo.clone());
        let cancel = CancellationToken::new();

        let report = loader.load_nodes_ordered(nodes(2), &cancel).await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.failed_records.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_load_aborts() {
        let repo = Arc::new(FlakyRepo::new(0));
        let loader = fast_loader(repo);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = loader.load_nodes_ordered(nodes(2), &cancel).await.unwrap_err();
        assert!(matches!(err, EtlError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_parallel_partitions_cover_all_nodes() {
        let repo = Arc::new(FlakyRepo::new(0));
        let loader = fast_loader(repo.clone());
        let cancel = CancellationToken::new();

        let report = loader.load_nodes(nodes(10), &cancel).await.unwrap();
        assert_eq!(report.created, 10);
        let total: usize = repo.committed.lock().iter().sum();
        assert_eq!(total, 10);
    }
}
