// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Runtime Wiring
//!
//! The per-run object graph: configuration snapshot, artifact store, asset
//! registry, and metrics. Use cases borrow this wiring; nothing here is
//! global, and the lifecycle is pinned to the run.

use crate::application::assets::build_registry;
use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::metrics::MetricsCollector;
use crate::infrastructure::runtime::{AssetExecutor, AssetRegistry};
use crate::infrastructure::storage::{ArtifactStore, PathResolver};
use sbir_graph_domain::repositories::GraphRepository;
use sbir_graph_domain::EtlError;
use std::sync::Arc;

/// Immutable wiring for one run.
pub struct PipelineRuntime {
    config: Arc<EtlConfig>,
    store: ArtifactStore,
    registry: Arc<AssetRegistry>,
    collector: MetricsCollector,
}

impl PipelineRuntime {
    /// Builds the wiring. `graph_repo` overrides the loader's connection
    /// (tests, dry runs); `None` connects from the secret environment
    /// variable on first load.
    pub fn new(config: EtlConfig, graph_repo: Option<Arc<dyn GraphRepository>>) -> Result<Self, EtlError> {
        let config = Arc::new(config);
        let resolver = PathResolver::new(&config.storage.root);
        let store = ArtifactStore::new(resolver, config.storage.retention_keep);
        let registry = Arc::new(build_registry(&config, graph_repo)?);
        let collector = MetricsCollector::new()?;
        Ok(Self {
            config,
            store,
            registry,
            collector,
        })
    }

    pub fn config(&self) -> &Arc<EtlConfig> {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    /// A fresh executor over this wiring.
    pub fn executor(&self) -> AssetExecutor {
        AssetExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
            self.store.clone(),
        )
    }
}
