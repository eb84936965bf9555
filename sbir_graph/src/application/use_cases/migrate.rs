// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Migrate Use Case
//!
//! Applies graph schema migrations up to the target version.

use crate::application::services::pipeline::PipelineRuntime;
use crate::infrastructure::config::EtlConfig;
use crate::infrastructure::graph::{schema, SqliteGraphStore};
use sbir_graph_bootstrap::ExitCode;
use sbir_graph_domain::repositories::GraphRepository;
use sbir_graph_domain::EtlError;
use std::sync::Arc;
use tracing::info;

/// Migrates the graph schema to `target`.
pub async fn execute(
    runtime: &PipelineRuntime,
    target: i64,
    repo_override: Option<Arc<dyn GraphRepository>>,
) -> Result<ExitCode, EtlError> {
    let repo: Arc<dyn GraphRepository> = match repo_override {
        Some(repo) => repo,
        None => {
            let url = EtlConfig::secret_from_env(&runtime.config().loader.database_url_env)?;
            Arc::new(SqliteGraphStore::connect(&url).await?)
        }
    };

    let applied = schema::migrate_to(repo.as_ref(), target).await?;
    info!(version = applied, "graph schema migrated");
    Ok(ExitCode::Success)
}
