// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Asset Definitions and Registry
//!
//! The pipeline is a DAG of named assets, each a deterministic function
//! from upstream artifacts and a configuration slice to one artifact. The
//! registry is populated explicitly at startup from a list of definitions:
//! inputs, checks, storage stage, and materializer are data on the
//! definition, and the runtime resolves execution order from the declared
//! inputs.

use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::gates::QualityCheck;
use crate::infrastructure::storage::{ArtifactStore, Stage};
use async_trait::async_trait;
use sbir_graph_bootstrap::CancellationToken;
use sbir_graph_domain::entities::ArtifactMeta;
use sbir_graph_domain::value_objects::{RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a materializer streams its output chunks.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: RecordChunk) -> Result<(), EtlError>;
}

/// A sealed upstream artifact visible to a materializer.
#[derive(Debug, Clone)]
pub struct UpstreamArtifact {
    pub meta: ArtifactMeta,
    pub data_path: PathBuf,
}

/// Per-materialization context handed to the asset function.
pub struct AssetContext {
    pub asset_key: String,
    pub partition: Option<String>,
    pub config: Arc<EtlConfig>,
    pub store: ArtifactStore,
    pub cancel: CancellationToken,
    /// Records per chunk for this attempt; retried attempts after memory
    /// pressure arrive with a scaled-down value.
    pub chunk_size: usize,
    /// Sealed upstream artifacts keyed by asset key.
    pub upstream: BTreeMap<String, UpstreamArtifact>,
    /// Set when the memory sampler requests a flush/pause checkpoint.
    backpressure: Arc<AtomicBool>,
}

impl AssetContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset_key: String,
        partition: Option<String>,
        config: Arc<EtlConfig>,
        store: ArtifactStore,
        cancel: CancellationToken,
        chunk_size: usize,
        upstream: BTreeMap<String, UpstreamArtifact>,
        backpressure: Arc<AtomicBool>,
    ) -> Self {
        Self {
            asset_key,
            partition,
            config,
            store,
            cancel,
            chunk_size,
            upstream,
            backpressure,
        }
    }

    pub fn upstream_artifact(&self, key: &str) -> Result<&UpstreamArtifact, EtlError> {
        self.upstream.get(key).ok_or_else(|| {
            EtlError::internal_error(format!(
                "asset '{}' requested undeclared upstream '{}'",
                self.asset_key, key
            ))
        })
    }

    /// True when the runtime asked in-progress work to flush and pause.
    /// Streaming materializers should commit their current chunk at the
    /// next `backpressure_checkpoint`.
    pub fn backpressure_requested(&self) -> bool {
        self.backpressure.load(Ordering::Relaxed)
    }

    /// Cooperative cancellation check for suspension points.
    pub fn check_cancelled(&self) -> Result<(), EtlError> {
        if self.cancel.is_cancelled() {
            Err(EtlError::Cancelled(format!("asset '{}' cancelled", self.asset_key)))
        } else {
            Ok(())
        }
    }
}

/// The asset function: stream chunks into the sink, return named metrics
/// for the quality gates.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Declared output schema, recorded in the artifact sidecar.
    fn schema(&self) -> RecordSchema;

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError>;
}

/// One asset declaration.
#[derive(Clone)]
pub struct AssetDefinition {
    pub key: String,
    pub inputs: Vec<String>,
    pub stage: Stage,
    /// Partitioning dimension, when the asset supports one (date or source).
    pub partitioning: Option<&'static str>,
    pub streaming: bool,
    pub checks: Vec<QualityCheck>,
    /// Configuration sections whose slice feeds this asset's fingerprint.
    pub config_sections: Vec<&'static str>,
    pub materializer: Arc<dyn Materializer>,
}

impl std::fmt::Debug for AssetDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetDefinition")
            .field("key", &self.key)
            .field("inputs", &self.inputs)
            .field("streaming", &self.streaming)
            .field("checks", &self.checks.len())
            .finish()
    }
}

/// Explicit registry, populated at startup.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: BTreeMap<String, AssetDefinition>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: AssetDefinition) -> Result<(), EtlError> {
        if self.assets.contains_key(&definition.key) {
            return Err(EtlError::invalid_config(format!(
                "asset '{}' registered twice",
                definition.key
            )));
        }
        self.assets.insert(definition.key.clone(), definition);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&AssetDefinition> {
        self.assets.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.assets.keys()
    }

    /// Expands a selection with every transitive dependency.
    pub fn expand_selection(&self, selection: &[String]) -> Result<BTreeSet<String>, EtlError> {
        let mut expanded = BTreeSet::new();
        let mut queue: VecDeque<String> = selection.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            let definition = self
                .get(&key)
                .ok_or_else(|| EtlError::invalid_config(format!("unknown asset '{}'", key)))?;
            if expanded.insert(key) {
                queue.extend(definition.inputs.iter().cloned());
            }
        }
        Ok(expanded)
    }

    /// Topological order over the expanded selection (Kahn's algorithm).
    /// A dependency cycle is a configuration error.
    pub fn topo_order(&self, selection: &BTreeSet<String>) -> Result<Vec<String>, EtlError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for key in selection {
            let definition = self
                .get(key)
                .ok_or_else(|| EtlError::invalid_config(format!("unknown asset '{}'", key)))?;
            let deps_in_selection = definition
                .inputs
                .iter()
                .filter(|d| selection.contains(*d))
                .count();
            in_degree.insert(key.as_str(), deps_in_selection);
            for dep in &definition.inputs {
                if selection.contains(dep) {
                    dependents.entry(dep.as_str()).or_default().push(key.as_str());
                }
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut order = Vec::with_capacity(selection.len());

        while let Some(key) = ready.pop_front() {
            order.push(key.to_string());
            for dependent in dependents.get(key).into_iter().flatten() {
                let degree = in_degree.get_mut(dependent).expect("dependent tracked");
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != selection.len() {
            return Err(EtlError::invalid_config(
                "asset dependency cycle detected".to_string(),
            ));
        }
        Ok(order)
    }
}
