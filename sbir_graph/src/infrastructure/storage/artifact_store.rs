// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact Store
//!
//! Commit protocol for materializations. Data and sidecar are written to
//! temp siblings, then renamed into place: data first, sidecar last. The
//! sidecar's presence seals the artifact: an aborted asset leaves at most a
//! temp file that the next run sweeps, never a file at the final path.
//!
//! Superseded artifacts are retained per the configured retention count and
//! pruned oldest-first by sidecar `produced_at`.

use crate::infrastructure::storage::columnar::ColumnarWriter;
use crate::infrastructure::storage::path_resolver::{PathResolver, Stage};
use sbir_graph_domain::entities::ArtifactMeta;
use sbir_graph_domain::value_objects::{Fingerprint, RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Handle for one in-progress materialization.
pub struct ArtifactWriter {
    writer: Option<ColumnarWriter>,
    temp_data: PathBuf,
    final_data: PathBuf,
    final_sidecar: PathBuf,
    rows: u64,
    bytes: u64,
}

impl ArtifactWriter {
    /// Streams one chunk into the temp artifact.
    pub async fn write_chunk(&mut self, chunk: &RecordChunk) -> Result<(), EtlError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EtlError::internal_error("artifact writer already finished"))?;
        writer.write_chunk(chunk).await?;
        self.rows += chunk.len() as u64;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Seals the data file and publishes data + sidecar atomically.
    pub async fn commit(mut self, mut meta: ArtifactMeta) -> Result<ArtifactMeta, EtlError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| EtlError::internal_error("artifact writer already finished"))?;
        let (rows, bytes) = writer.finish().await?;
        self.bytes = bytes;

        meta.row_count = rows;
        meta.bytes_written = bytes;
        meta.storage_path = self.final_data.display().to_string();

        PathResolver::publish(&self.temp_data, &self.final_data).await?;

        let temp_sidecar = PathResolver::temp_sibling(&self.final_sidecar);
        fs::write(&temp_sidecar, serde_json::to_vec_pretty(&meta)?).await?;
        PathResolver::publish(&temp_sidecar, &self.final_sidecar).await?;

        debug!(
            asset = %meta.asset_key,
            fingerprint = %meta.fingerprint.short(),
            rows,
            bytes,
            "artifact sealed"
        );
        Ok(meta)
    }

    /// Abandons the materialization, deleting the temp file.
    pub async fn abort(mut self) {
        self.writer.take();
        if let Err(e) = fs::remove_file(&self.temp_data).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove temp artifact {}: {}", self.temp_data.display(), e);
            }
        }
    }
}

/// Store over the artifact tree.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    resolver: PathResolver,
    retention_keep: usize,
}

impl ArtifactStore {
    pub fn new(resolver: PathResolver, retention_keep: usize) -> Self {
        Self {
            resolver,
            retention_keep,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Opens a writer targeting `(stage, asset, partition, fingerprint)`.
    pub async fn begin(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
        fingerprint: &Fingerprint,
        schema: RecordSchema,
    ) -> Result<ArtifactWriter, EtlError> {
        let final_data = self.resolver.data_path(stage, asset_key, partition, fingerprint);
        let final_sidecar = self.resolver.sidecar_path(stage, asset_key, partition, fingerprint);
        let temp_data = PathResolver::temp_sibling(&final_data);
        let writer = ColumnarWriter::create(&temp_data, schema).await?;
        Ok(ArtifactWriter {
            writer: Some(writer),
            temp_data,
            final_data,
            final_sidecar,
            rows: 0,
            bytes: 0,
        })
    }

    /// Loads the sealed sidecar for a fingerprint, `None` when absent.
    pub async fn find_sealed(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ArtifactMeta>, EtlError> {
        let sidecar = self.resolver.sidecar_path(stage, asset_key, partition, fingerprint);
        match fs::read(&sidecar).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the sealed data file for a fingerprint.
    pub fn data_path(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
        fingerprint: &Fingerprint,
    ) -> PathBuf {
        self.resolver.data_path(stage, asset_key, partition, fingerprint)
    }

    /// All sealed sidecars of one (asset, partition), newest first.
    pub async fn list_sealed(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
    ) -> Result<Vec<ArtifactMeta>, EtlError> {
        let dir = self.resolver.artifact_dir(stage, asset_key, partition);
        let mut metas = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(metas),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false)
                && !file_name_starts_with(&path, ".tmp.")
            {
                match fs::read(&path).await {
                    Ok(bytes) => match serde_json::from_slice::<ArtifactMeta>(&bytes) {
                        Ok(meta) => metas.push(meta),
                        Err(e) => warn!("skipping unreadable sidecar {}: {}", path.display(), e),
                    },
                    Err(e) => warn!("skipping unreadable sidecar {}: {}", path.display(), e),
                }
            }
        }
        metas.sort_by(|a, b| b.produced_at.cmp(&a.produced_at));
        Ok(metas)
    }

    /// Deletes superseded artifacts beyond the retention count and sweeps
    /// abandoned temp files.
    pub async fn prune(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
    ) -> Result<(), EtlError> {
        let metas = self.list_sealed(stage, asset_key, partition).await?;
        for stale in metas.iter().skip(self.retention_keep.max(1)) {
            let data = self.resolver.data_path(stage, asset_key, partition, &stale.fingerprint);
            let sidecar = self
                .resolver
                .sidecar_path(stage, asset_key, partition, &stale.fingerprint);
            // Sidecar first: a data file without a sidecar is unsealed, the
            // reverse would look like a sealed artifact with missing data.
            let _ = fs::remove_file(&sidecar).await;
            let _ = fs::remove_file(&data).await;
            debug!(asset = asset_key, fingerprint = %stale.fingerprint.short(), "pruned superseded artifact");
        }

        let dir = self.resolver.artifact_dir(stage, asset_key, partition);
        if let Ok(mut entries) = fs::read_dir(&dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if file_name_starts_with(&entry.path(), ".tmp.") {
                    let _ = fs::remove_file(entry.path()).await;
                }
            }
        }
        Ok(())
    }
}

fn file_name_starts_with(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(prefix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sbir_graph_domain::value_objects::{FieldDef, FieldType, FieldValue, Record};

    fn schema() -> RecordSchema {
        RecordSchema::new(vec![FieldDef::new("id", FieldType::Str, true)])
    }

    fn meta_for(fp: &Fingerprint) -> ArtifactMeta {
        ArtifactMeta {
            asset_key: "awards_raw".into(),
            partition: None,
            fingerprint: fp.clone(),
            storage_path: String::new(),
            row_count: 0,
            bytes_written: 0,
            schema_digest: schema().digest(),
            produced_at: Utc::now(),
            duration_ms: 1,
            peak_memory_delta_bytes: 0,
            upstream_fingerprints: vec![],
            checks: vec![],
        }
    }

    fn chunk() -> RecordChunk {
        RecordChunk::new(0, vec![Record::new().with("id", FieldValue::Str("x".into()))])
    }

    #[tokio::test]
    async fn test_commit_seals_and_find_sealed_sees_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(PathResolver::new(dir.path()), 3);
        let fp = Fingerprint::compute("v1", "{}", &[]);

        let mut writer = store
            .begin(Stage::Raw, "awards_raw", None, &fp, schema())
            .await
            .unwrap();
        writer.write_chunk(&chunk()).await.unwrap();
        let meta = writer.commit(meta_for(&fp)).await.unwrap();
        assert_eq!(meta.row_count, 1);

        let found = store
            .find_sealed(Stage::Raw, "awards_raw", None, &fp)
            .await
            .unwrap()
            .expect("sealed artifact");
        assert_eq!(found.fingerprint, fp);
    }

    #[tokio::test]
    async fn test_abort_leaves_no_final_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(PathResolver::new(dir.path()), 3);
        let fp = Fingerprint::compute("v1", "{}", &[]);

        let mut writer = store
            .begin(Stage::Raw, "awards_raw", None, &fp, schema())
            .await
            .unwrap();
        writer.write_chunk(&chunk()).await.unwrap();
        let final_data = store.data_path(Stage::Raw, "awards_raw", None, &fp);
        writer.abort().await;

        assert!(!final_data.exists());
        assert!(store
            .find_sealed(Stage::Raw, "awards_raw", None, &fp)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_prune_keeps_retention_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(PathResolver::new(dir.path()), 1);

        for version in ["v1", "v2"] {
            let fp = Fingerprint::compute(version, "{}", &[]);
            let mut writer = store
                .begin(Stage::Raw, "awards_raw", None, &fp, schema())
                .await
                .unwrap();
            writer.write_chunk(&chunk()).await.unwrap();
            let mut meta = meta_for(&fp);
            meta.produced_at = Utc::now();
            writer.commit(meta).await.unwrap();
        }

        store.prune(Stage::Raw, "awards_raw", None).await.unwrap();
        let remaining = store.list_sealed(Stage::Raw, "awards_raw", None).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
