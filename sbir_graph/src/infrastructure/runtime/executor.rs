// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Asset Executor
//!
//! Materializes a selected asset set: topological order over declared
//! inputs, independent assets in parallel up to the configured pool size,
//! fingerprint-driven skipping in incremental mode, bounded retries with
//! chunk-size downstepping, per-asset timeouts, quality-gate evaluation on
//! sealed output, and cooperative cancellation.
//!
//! ## Outcome Propagation
//!
//! - a failed asset marks every dependent `upstream_failed` (never run)
//! - a materialized asset whose ERROR-severity check failed marks
//!   dependents `upstream_quality_gate_failed`
//! - in incremental mode, a fingerprint match against a sealed artifact
//!   records the asset as `observed` without re-running it
//!
//! ## No Partial Artifacts
//!
//! Materializers stream into a temp sibling; the executor seals (data
//! rename, then sidecar rename) only after checks are evaluated. An error,
//! timeout, or cancellation aborts the temp file, leaving the final path
//! untouched.

use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::gates::{evaluate_checks, ROW_COUNT_METRIC};
use crate::infrastructure::runtime::asset::{
    AssetContext, AssetDefinition, AssetRegistry, ChunkSink, UpstreamArtifact,
};
use crate::infrastructure::runtime::memory::MemorySampler;
use crate::infrastructure::storage::{ArtifactStore, ArtifactWriter};
use async_trait::async_trait;
use chrono::Utc;
use sbir_graph_bootstrap::CancellationToken;
use sbir_graph_domain::entities::{ArtifactMeta, AssetOutcome, Run, RunMode};
use sbir_graph_domain::value_objects::{Fingerprint, RecordChunk};
use sbir_graph_domain::EtlError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Terminal state the executor tracks per asset.
#[derive(Debug, Clone)]
struct AssetState {
    outcome: AssetOutcome,
    fingerprint: Option<Fingerprint>,
    gate_blocked: bool,
    meta: Option<ArtifactMeta>,
}

/// What a materialization task reports back.
struct TaskReport {
    key: String,
    result: Result<(ArtifactMeta, bool), EtlError>,
    retries: u64,
}

/// Sink adapter: cancellation check, chunk-inactivity budget, then the
/// artifact writer.
struct ArtifactSink<'a> {
    writer: &'a mut ArtifactWriter,
    cancel: CancellationToken,
    chunk_budget: Option<Duration>,
    last_chunk_at: tokio::time::Instant,
}

#[async_trait]
impl ChunkSink for ArtifactSink<'_> {
    async fn write_chunk(&mut self, chunk: RecordChunk) -> Result<(), EtlError> {
        if self.cancel.is_cancelled() {
            return Err(EtlError::Cancelled("chunk write after cancellation".to_string()));
        }
        if let Some(budget) = self.chunk_budget {
            let elapsed = self.last_chunk_at.elapsed();
            if elapsed > budget {
                return Err(EtlError::Timeout(format!(
                    "chunk took {:?}, budget {:?}",
                    elapsed, budget
                )));
            }
        }
        self.writer.write_chunk(&chunk).await?;
        self.last_chunk_at = tokio::time::Instant::now();
        Ok(())
    }
}

/// The asset runtime executor.
pub struct AssetExecutor {
    registry: Arc<AssetRegistry>,
    config: Arc<EtlConfig>,
    store: ArtifactStore,
    sampler: MemorySampler,
}

impl AssetExecutor {
    pub fn new(registry: Arc<AssetRegistry>, config: Arc<EtlConfig>, store: ArtifactStore) -> Self {
        let sampler = MemorySampler::new(config.runtime.memory.clone());
        Self {
            registry,
            config,
            store,
            sampler,
        }
    }

    fn parallelism(&self) -> usize {
        if self.config.runtime.parallelism > 0 {
            self.config.runtime.parallelism
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1).max(1))
                .unwrap_or(2)
        }
    }

    /// Runs the selection to completion and returns the finalized run.
    pub async fn run(
        &self,
        selection: &[String],
        mode: RunMode,
        partition: Option<String>,
        cancel: CancellationToken,
    ) -> Result<Run, EtlError> {
        let expanded = self.registry.expand_selection(selection)?;
        let order = self.registry.topo_order(&expanded)?;
        info!(
            run_assets = order.len(),
            ?mode,
            "run starting: {:?}",
            order
        );

        self.sampler.spawn(cancel.clone());

        let mut run = Run::new(mode, order.clone(), Utc::now());
        let mut states: BTreeMap<String, AssetState> = BTreeMap::new();
        let mut pending: BTreeSet<String> = expanded;
        let mut running: JoinSet<TaskReport> = JoinSet::new();
        let mut in_flight: BTreeSet<String> = BTreeSet::new();
        let parallelism = self.parallelism();

        loop {
            // Schedule everything ready, up to the pool size.
            let mut scheduled_any = true;
            while scheduled_any && in_flight.len() < parallelism {
                scheduled_any = false;
                let candidates: Vec<String> = order
                    .iter()
                    .filter(|k| pending.contains(*k) && !in_flight.contains(*k))
                    .filter(|k| self.deps_done(k, &states))
                    .cloned()
                    .collect();

                for key in candidates {
                    if in_flight.len() >= parallelism {
                        break;
                    }
                    match self.plan_asset(&key, mode, &partition, &states, &cancel).await? {
                        Planned::Skip(state) => {
                            pending.remove(&key);
                            self.record(&mut run, &mut states, &key, state);
                            scheduled_any = true;
                        }
                        Planned::Spawn(task) => {
                            pending.remove(&key);
                            in_flight.insert(key.clone());
                            running.spawn(task);
                            scheduled_any = true;
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                if pending.is_empty() {
                    break;
                }
                // Nothing running and nothing schedulable: dependency state
                // machine is stuck, which topo order should make impossible.
                return Err(EtlError::internal_error(format!(
                    "scheduler stalled with pending assets: {:?}",
                    pending
                )));
            }

            let report = running
                .join_next()
                .await
                .ok_or_else(|| EtlError::internal_error("join set empty while in flight".to_string()))?
                .map_err(|e| EtlError::internal_error(format!("asset task panicked: {}", e)))?;
            in_flight.remove(&report.key);
            run.metrics.retries += report.retries;

            let state = match report.result {
                Ok((meta, gate_blocked)) => {
                    run.metrics.rows_processed += meta.row_count;
                    run.metrics.bytes_written += meta.bytes_written;
                    if gate_blocked {
                        warn!(asset = %report.key, "materialized but blocked downstream by quality gate");
                    }
                    AssetState {
                        outcome: AssetOutcome::Materialized,
                        fingerprint: Some(meta.fingerprint.clone()),
                        gate_blocked,
                        meta: Some(meta),
                    }
                }
                Err(e) => {
                    error!(asset = %report.key, "asset failed: {}", e);
                    AssetState {
                        outcome: AssetOutcome::Failed {
                            category: e.category().to_string(),
                            message: e.to_string(),
                        },
                        fingerprint: None,
                        gate_blocked: false,
                        meta: None,
                    }
                }
            };
            self.record(&mut run, &mut states, &report.key, state);
        }

        run.finalize(Utc::now());
        info!(
            materialized = run.metrics.assets_materialized,
            observed = run.metrics.assets_observed,
            failed = run.metrics.assets_failed,
            skipped = run.metrics.assets_skipped,
            "run finished"
        );
        Ok(run)
    }

    /// Sealed metadata for every completed asset, for the report writer.
    pub fn sampler(&self) -> &MemorySampler {
        &self.sampler
    }

    fn deps_done(&self, key: &str, states: &BTreeMap<String, AssetState>) -> bool {
        self.registry
            .get(key)
            .map(|d| d.inputs.iter().all(|dep| states.contains_key(dep)))
            .unwrap_or(false)
    }

    fn record(&self, run: &mut Run, states: &mut BTreeMap<String, AssetState>, key: &str, state: AssetState) {
        run.record_outcome(key, state.outcome.clone());
        states.insert(key.to_string(), state);
    }

    /// Decides skip vs. spawn for one ready asset.
    async fn plan_asset(
        &self,
        key: &str,
        mode: RunMode,
        partition: &Option<String>,
        states: &BTreeMap<String, AssetState>,
        cancel: &CancellationToken,
    ) -> Result<Planned, EtlError> {
        let definition = self
            .registry
            .get(key)
            .ok_or_else(|| EtlError::internal_error(format!("asset '{}' vanished from registry", key)))?
            .clone();

        // Upstream failure and gate propagation.
        for dep in &definition.inputs {
            let dep_state = states
                .get(dep)
                .ok_or_else(|| EtlError::internal_error(format!("dependency '{}' not resolved", dep)))?;
            if !dep_state.outcome.is_success() {
                return Ok(Planned::Skip(AssetState {
                    outcome: AssetOutcome::UpstreamFailed { upstream: dep.clone() },
                    fingerprint: None,
                    gate_blocked: false,
                    meta: None,
                }));
            }
            if dep_state.gate_blocked {
                return Ok(Planned::Skip(AssetState {
                    outcome: AssetOutcome::UpstreamQualityGateFailed { upstream: dep.clone() },
                    fingerprint: None,
                    gate_blocked: false,
                    meta: None,
                }));
            }
        }

        if cancel.is_cancelled() {
            return Ok(Planned::Skip(AssetState {
                outcome: AssetOutcome::Failed {
                    category: "cancellation".to_string(),
                    message: "run cancelled before asset started".to_string(),
                },
                fingerprint: None,
                gate_blocked: false,
                meta: None,
            }));
        }

        // Fingerprint from code version, config slice, sorted input prints.
        let mut config_slice = String::new();
        for section in &definition.config_sections {
            config_slice.push_str(&self.config.slice_json(section)?);
        }
        let input_fps: Vec<Fingerprint> = definition
            .inputs
            .iter()
            .filter_map(|dep| states.get(dep).and_then(|s| s.fingerprint.clone()))
            .collect();
        let fingerprint = Fingerprint::compute(EtlConfig::code_version(), &config_slice, &input_fps);

        if mode == RunMode::Incremental {
            if let Some(meta) = self
                .store
                .find_sealed(definition.stage, key, partition.as_deref(), &fingerprint)
                .await?
            {
                if !meta.has_blocking_failure() {
                    debug!(asset = key, fingerprint = %fingerprint.short(), "fingerprint match, observed");
                    return Ok(Planned::Skip(AssetState {
                        outcome: AssetOutcome::Observed,
                        fingerprint: Some(fingerprint),
                        gate_blocked: false,
                        meta: Some(meta),
                    }));
                }
            }
        }

        let upstream: BTreeMap<String, UpstreamArtifact> = definition
            .inputs
            .iter()
            .filter_map(|dep| {
                let state = states.get(dep)?;
                let meta = state.meta.clone()?;
                let dep_def = self.registry.get(dep)?;
                let data_path = self.store.data_path(
                    dep_def.stage,
                    dep,
                    partition.as_deref(),
                    state.fingerprint.as_ref()?,
                );
                Some((dep.clone(), UpstreamArtifact { meta, data_path }))
            })
            .collect();

        let task = MaterializeTask {
            definition,
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            cancel: cancel.clone(),
            sampler: self.sampler.clone(),
            partition: partition.clone(),
            fingerprint,
            upstream,
        };
        Ok(Planned::Spawn(Box::pin(task.run())))
    }
}

enum Planned {
    Skip(AssetState),
    Spawn(std::pin::Pin<Box<dyn std::future::Future<Output = TaskReport> + Send>>),
}

/// One spawned materialization with its retry schedule.
struct MaterializeTask {
    definition: AssetDefinition,
    config: Arc<EtlConfig>,
    store: ArtifactStore,
    cancel: CancellationToken,
    sampler: MemorySampler,
    partition: Option<String>,
    fingerprint: Fingerprint,
    upstream: BTreeMap<String, UpstreamArtifact>,
}

impl MaterializeTask {
    async fn run(self) -> TaskReport {
        let key = self.definition.key.clone();
        let retry = self.config.runtime.retry.clone();
        let mut retries = 0u64;
        let mut attempt = 0u32;

        let result = loop {
            attempt += 1;
            let chunk_size = self.chunk_size_for_attempt(attempt);
            let budget = Duration::from_secs(self.config.runtime.asset_timeout_secs.max(1));

            let outcome = tokio::time::timeout(budget, self.materialize_once(chunk_size)).await;
            match outcome {
                Ok(Ok(success)) => break Ok(success),
                Ok(Err(e @ EtlError::Cancelled(_))) => break Err(e),
                Ok(Err(e)) if e.is_transient() && attempt < retry.max_attempts => {
                    retries += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(asset = %key, attempt, "transient failure: {}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => break Err(e),
                Err(_) if attempt < retry.max_attempts => {
                    retries += 1;
                    warn!(asset = %key, attempt, "asset timed out; retrying with smaller chunks");
                }
                Err(_) => {
                    break Err(EtlError::Timeout(format!(
                        "asset '{}' exceeded {}s",
                        key, self.config.runtime.asset_timeout_secs
                    )))
                }
            }
        };

        TaskReport {
            key,
            result,
            retries,
        }
    }

    /// Chunk size, downstepped once per prior attempt.
    fn chunk_size_for_attempt(&self, attempt: u32) -> usize {
        let base = self.config.sources.chunk_size.max(1) as f64;
        let ratio = self.config.runtime.memory.chunk_downstep_ratio.clamp(0.05, 1.0);
        (base * ratio.powi(attempt.saturating_sub(1) as i32)).max(1.0) as usize
    }

    async fn materialize_once(&self, chunk_size: usize) -> Result<(ArtifactMeta, bool), EtlError> {
        let started = tokio::time::Instant::now();
        let definition = &self.definition;
        let schema = definition.materializer.schema();
        let schema_digest = schema.digest();

        let mut writer = self
            .store
            .begin(
                definition.stage,
                &definition.key,
                self.partition.as_deref(),
                &self.fingerprint,
                schema,
            )
            .await?;

        let ctx = AssetContext::new(
            definition.key.clone(),
            self.partition.clone(),
            Arc::clone(&self.config),
            self.store.clone(),
            self.cancel.clone(),
            chunk_size,
            self.upstream.clone(),
            self.sampler.backpressure_flag(),
        );

        let chunk_budget = definition
            .streaming
            .then(|| Duration::from_secs(self.config.runtime.chunk_timeout_secs.max(1)));
        let mut sink = ArtifactSink {
            writer: &mut writer,
            cancel: self.cancel.clone(),
            chunk_budget,
            last_chunk_at: tokio::time::Instant::now(),
        };

        match definition.materializer.materialize(&ctx, &mut sink).await {
            Ok(mut metrics) => {
                drop(sink);
                metrics.insert(ROW_COUNT_METRIC.to_string(), writer.rows_written() as f64);
                let checks = evaluate_checks(&definition.checks, &metrics);
                let gate_blocked = checks.iter().any(|c| c.is_blocking_failure());

                let meta = ArtifactMeta {
                    asset_key: definition.key.clone(),
                    partition: self.partition.clone(),
                    fingerprint: self.fingerprint.clone(),
                    storage_path: String::new(),
                    row_count: 0,
                    bytes_written: 0,
                    schema_digest,
                    produced_at: Utc::now(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    peak_memory_delta_bytes: self.sampler.peak_delta_bytes(),
                    upstream_fingerprints: self.upstream.values().map(|u| u.meta.fingerprint.clone()).collect(),
                    checks,
                };
                let sealed = writer.commit(meta).await?;
                self.store
                    .prune(definition.stage, &definition.key, self.partition.as_deref())
                    .await?;
                Ok((sealed, gate_blocked))
            }
            Err(e) => {
                drop(sink);
                writer.abort().await;
                Err(e)
            }
        }
    }
}
