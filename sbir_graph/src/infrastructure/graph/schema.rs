// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Graph Schema Migrations
//!
//! Versioned, forward-only schema evolution. The migration list is code;
//! the applied version lives on the graph's marker row. The loader refuses
//! to run against a version it was not built for; `migrate --target`
//! closes the gap explicitly, never implicitly.

use sbir_graph_domain::repositories::GraphRepository;
use sbir_graph_domain::EtlError;
use tracing::info;

/// Schema version this build reads and writes.
pub const GRAPH_SCHEMA_VERSION: i64 = 2;

/// One forward migration step.
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    /// SQL statements applied by the SQLite store; other backends map these
    /// by version.
    pub statements: &'static [&'static str],
}

/// The full forward migration history.
pub fn migrations() -> &'static [Migration] {
    &[
        Migration {
            version: 1,
            description: "initial node/edge tables and unique constraints",
            statements: &[],
        },
        Migration {
            version: 2,
            description: "secondary indexes on name, date, and category; edge rel_type index",
            statements: &[],
        },
    ]
}

/// Applies forward migrations up to `target` and stamps the marker.
pub async fn migrate_to(repo: &dyn GraphRepository, target: i64) -> Result<i64, EtlError> {
    let available: Vec<&Migration> = migrations().iter().collect();
    let max_version = available.iter().map(|m| m.version).max().unwrap_or(0);
    if target > max_version {
        return Err(EtlError::MigrationRequired(format!(
            "target version {} unknown; latest is {}",
            target, max_version
        )));
    }

    // ensure_schema is idempotent and carries the full current DDL; the
    // version stamp records how far the marker has advanced.
    repo.ensure_schema().await?;

    let current = repo.schema_version().await?.unwrap_or(0);
    if current > target {
        return Err(EtlError::MigrationRequired(format!(
            "downgrade from {} to {} is not supported",
            current, target
        )));
    }
    for migration in available.iter().filter(|m| m.version > current && m.version <= target) {
        info!(version = migration.version, "applying migration: {}", migration.description);
    }
    repo.set_schema_version(target).await?;
    Ok(target)
}

/// Verifies the marker matches what this build expects; called by the
/// loader bootstrap before any write.
pub async fn check_version(repo: &dyn GraphRepository, expected: i64) -> Result<(), EtlError> {
    match repo.schema_version().await? {
        Some(version) if version == expected => Ok(()),
        Some(version) => Err(EtlError::MigrationRequired(format!(
            "graph schema version {} found, {} required; run `migrate --target {}`",
            version, expected, expected
        ))),
        None => Err(EtlError::MigrationRequired(format!(
            "graph schema version marker missing; run `migrate --target {}`",
            expected
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::graph::sqlite_store::SqliteGraphStore;

    #[tokio::test]
    async fn test_migrate_then_check() {
        let store = SqliteGraphStore::in_memory().await.unwrap();
        assert!(check_version(&store, GRAPH_SCHEMA_VERSION).await.is_err());

        migrate_to(&store, GRAPH_SCHEMA_VERSION).await.unwrap();
        check_version(&store, GRAPH_SCHEMA_VERSION).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_target_rejected() {
        let store = SqliteGraphStore::in_memory().await.unwrap();
        let err = migrate_to(&store, 99).await.unwrap_err();
        assert!(matches!(err, EtlError::MigrationRequired(_)));
    }

    #[tokio::test]
    async fn test_downgrade_rejected() {
        let store = SqliteGraphStore::in_memory().await.unwrap();
        migrate_to(&store, 2).await.unwrap();
        let err = migrate_to(&store, 1).await.unwrap_err();
        assert!(matches!(err, EtlError::MigrationRequired(_)));
    }
}
