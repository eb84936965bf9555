// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extract Materializers
//!
//! Raw-stage assets: resolve the newest dated drop of a source under the
//! inbox, stream it through the format's extractor, and write the typed
//! chunks as the raw artifact. Decode-error accounting flows into the
//! artifact metrics where the gate framework can see it.

use crate::infrastructure::runtime::{AssetContext, ChunkSink, Materializer};
use crate::infrastructure::storage::PathResolver;
use async_trait::async_trait;
use sbir_graph_domain::services::{RecordSource, SourceDescriptor};
use sbir_graph_domain::value_objects::RecordSchema;
use sbir_graph_domain::EtlError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Generic extract asset over any record source.
pub struct ExtractMaterializer {
    source_name: String,
    /// Subdirectory of the inbox holding dated drops of this source.
    inbox_subdir: String,
    /// File name inside the dated drop.
    file_name: String,
    source: Arc<dyn RecordSource>,
}

impl ExtractMaterializer {
    pub fn new(
        source_name: impl Into<String>,
        inbox_subdir: impl Into<String>,
        file_name: impl Into<String>,
        source: Arc<dyn RecordSource>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            inbox_subdir: inbox_subdir.into(),
            file_name: file_name.into(),
            source,
        }
    }

    async fn resolve_drop(&self, ctx: &AssetContext) -> Result<PathBuf, EtlError> {
        let prefix = ctx.config.sources.inbox.join(&self.inbox_subdir);
        let dated = PathResolver::latest_dated(&prefix).await?.ok_or_else(|| {
            EtlError::source_unavailable(format!(
                "no dated drop under {} for source '{}'",
                prefix.display(),
                self.source_name
            ))
        })?;
        Ok(dated.join(&self.file_name))
    }
}

#[async_trait]
impl Materializer for ExtractMaterializer {
    fn schema(&self) -> RecordSchema {
        self.source.schema().clone()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let path = self.resolve_drop(ctx).await?;
        info!(source = %self.source_name, path = %path.display(), "extracting");

        let descriptor = SourceDescriptor {
            source_name: self.source_name.clone(),
            path,
            format: None,
            chunk_size: ctx.chunk_size,
            max_error_fraction: ctx.config.sources.max_error_fraction,
        };

        let mut iter = self.source.open(&descriptor).await?;
        let mut rows = 0u64;
        while let Some(chunk) = iter.next_chunk().await? {
            ctx.check_cancelled()?;
            rows += chunk.len() as u64;
            sink.write_chunk(chunk).await?;
        }

        let errors = iter.decode_errors();
        let mut metrics = BTreeMap::new();
        metrics.insert("rows_extracted".to_string(), rows as f64);
        metrics.insert("decode_failures".to_string(), errors.rows_failed as f64);
        metrics.insert("decode_failure_fraction".to_string(), errors.failure_fraction());
        Ok(metrics)
    }
}
