// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Path and Object Resolution
//!
//! Abstracts where artifacts and source drops live. Local filesystem and
//! mounted object storage share one code path: everything resolves to paths
//! under a root, and publishing is always temp-write + atomic rename so a
//! reader never observes a partial file.
//!
//! ## Layout
//!
//! ```text
//! <root>/<stage>/<asset_key>/<partition>/<fingerprint>.col
//! <root>/<stage>/<asset_key>/<partition>/<fingerprint>.json   (sidecar)
//! ```
//!
//! Source drops land in a dated inbox (`<inbox>/<source>/<YYYY-MM-DD>/...`);
//! `latest_dated` locates the newest dated entry under a prefix.

use sbir_graph_domain::value_objects::Fingerprint;
use sbir_graph_domain::EtlError;
use std::path::{Path, PathBuf};

/// Pipeline stage directories, in flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Raw,
    Validated,
    Enriched,
    Transformed,
    Loaded,
}

impl Stage {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Validated => "validated",
            Stage::Enriched => "enriched",
            Stage::Transformed => "transformed",
            Stage::Loaded => "loaded",
        }
    }
}

/// Partition directory used when an asset is unpartitioned.
pub const UNPARTITIONED: &str = "all";

/// Resolves artifact and source paths under a storage root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all artifacts of one (asset, partition).
    pub fn artifact_dir(&self, stage: Stage, asset_key: &str, partition: Option<&str>) -> PathBuf {
        self.root
            .join(stage.dir_name())
            .join(asset_key)
            .join(partition.unwrap_or(UNPARTITIONED))
    }

    /// Final path of the columnar data file.
    pub fn data_path(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
        fingerprint: &Fingerprint,
    ) -> PathBuf {
        self.artifact_dir(stage, asset_key, partition)
            .join(format!("{}.col", fingerprint))
    }

    /// Final path of the sidecar metadata file. The sidecar is renamed into
    /// place last, so its presence is what seals an artifact.
    pub fn sidecar_path(
        &self,
        stage: Stage,
        asset_key: &str,
        partition: Option<&str>,
        fingerprint: &Fingerprint,
    ) -> PathBuf {
        self.artifact_dir(stage, asset_key, partition)
            .join(format!("{}.json", fingerprint))
    }

    /// Temporary sibling used before the atomic rename. Same directory as
    /// the final path, so the rename never crosses a filesystem boundary.
    pub fn temp_sibling(final_path: &Path) -> PathBuf {
        let file_name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        final_path.with_file_name(format!(".tmp.{}.{}", file_name, uuid::Uuid::new_v4()))
    }

    /// Publishes a temp file at its final path atomically.
    pub async fn publish(temp: &Path, final_path: &Path) -> Result<(), EtlError> {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(temp, final_path).await?;
        Ok(())
    }

    /// Newest dated (`YYYY-MM-DD`) entry directly under `prefix`.
    pub async fn latest_dated(prefix: &Path) -> Result<Option<PathBuf>, EtlError> {
        let mut entries = match tokio::fs::read_dir(prefix).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(String, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_dated_name(&name) {
                continue;
            }
            // ISO dates sort lexicographically, so a string max is the newest.
            if newest.as_ref().map(|(n, _)| name > *n).unwrap_or(true) {
                newest = Some((name, entry.path()));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }
}

fn is_dated_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let resolver = PathResolver::new("/data");
        let fp = Fingerprint::from_hex("abc123");
        let path = resolver.data_path(Stage::Enriched, "awards_enriched", None, &fp);
        assert_eq!(path, PathBuf::from("/data/enriched/awards_enriched/all/abc123.col"));
        let sidecar = resolver.sidecar_path(Stage::Enriched, "awards_enriched", Some("2024-01"), &fp);
        assert_eq!(
            sidecar,
            PathBuf::from("/data/enriched/awards_enriched/2024-01/abc123.json")
        );
    }

    #[test]
    fn test_temp_sibling_stays_in_dir() {
        let temp = PathResolver::temp_sibling(Path::new("/data/raw/a/all/fp.col"));
        assert_eq!(temp.parent(), Some(Path::new("/data/raw/a/all")));
        assert!(temp.file_name().unwrap().to_string_lossy().starts_with(".tmp.fp.col"));
    }

    #[test]
    fn test_dated_name_detection() {
        assert!(is_dated_name("2024-06-30"));
        assert!(!is_dated_name("2024-6-30"));
        assert!(!is_dated_name("latest"));
        assert!(!is_dated_name("2024-06-30.bak"));
    }

    #[tokio::test]
    async fn test_latest_dated_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2024-01-15", "2024-03-02", "2023-12-31", "notes"] {
            tokio::fs::create_dir(dir.path().join(name)).await.unwrap();
        }
        let newest = PathResolver::latest_dated(dir.path()).await.unwrap().unwrap();
        assert_eq!(newest.file_name().unwrap(), "2024-03-02");
    }

    #[tokio::test]
    async fn test_latest_dated_missing_prefix() {
        let missing = Path::new("/definitely/not/here");
        assert!(PathResolver::latest_dated(missing).await.unwrap().is_none());
    }
}
