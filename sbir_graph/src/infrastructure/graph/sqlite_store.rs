// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Graph Store
//!
//! [`GraphRepository`] implementation over an embedded SQLite database.
//! Nodes live in one table keyed `(label, node_key)`, so each label's
//! declared unique constraint maps onto that primary key. Edges live in a
//! table keyed by the full `(src, rel_type, dst)` triple, which is what
//! makes edge creation idempotent.
//!
//! ## Upsert Semantics
//!
//! - Node conflict: properties are merged via `json_patch`, `updated_at`
//!   stamped; `created_at` is preserved.
//! - Edge conflict: properties are replaced (last writer wins),
//!   `updated_at` stamped.
//!
//! Batches run in one transaction. Per-row unique-constraint violations are
//! recorded and skipped without aborting the batch; lock contention
//! surfaces as `LoaderConflict` for the loader's retry/split machinery.

use async_trait::async_trait;
use chrono::Utc;
use sbir_graph_domain::repositories::{
    BatchOutcome, EdgeSpec, GraphRepository, NodeLabel, NodeSpec, RelType,
};
use sbir_graph_domain::EtlError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Secondary indexes declared as code, created with if-not-exists semantics.
const SECONDARY_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_nodes_name ON graph_nodes (json_extract(properties, '$.name'))",
    "CREATE INDEX IF NOT EXISTS idx_nodes_date ON graph_nodes (json_extract(properties, '$.award_date'))",
    "CREATE INDEX IF NOT EXISTS idx_nodes_category ON graph_nodes (json_extract(properties, '$.primary_category'))",
    "CREATE INDEX IF NOT EXISTS idx_edges_rel ON graph_edges (rel_type)",
    "CREATE INDEX IF NOT EXISTS idx_edges_dst ON graph_edges (dst_label, dst_key)",
];

/// SQLite-backed property graph.
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects to the database URL (typically from the secret env var).
    pub async fn connect(database_url: &str) -> Result<Self, EtlError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| EtlError::database_error(format!("graph database unreachable: {}", e)))?;
        Ok(Self::new(pool))
    }

    /// In-memory store for tests and dry runs.
    pub async fn in_memory() -> Result<Self, EtlError> {
        // A single connection keeps the in-memory database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| EtlError::database_error(format!("in-memory database: {}", e)))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn map_sqlx_err(e: sqlx::Error) -> EtlError {
    if let sqlx::Error::Database(db) = &e {
        let message = db.message();
        if message.contains("locked") || message.contains("busy") {
            return EtlError::LoaderConflict(message.to_string());
        }
        if message.contains("UNIQUE constraint") || message.contains("PRIMARY KEY constraint") {
            return EtlError::LoaderConstraint(message.to_string());
        }
    }
    EtlError::database_error(e.to_string())
}

#[async_trait]
impl GraphRepository for SqliteGraphStore {
    async fn ensure_schema(&self) -> Result<(), EtlError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graph_nodes (
                label      TEXT NOT NULL,
                node_key   TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (label, node_key)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graph_edges (
                src_label  TEXT NOT NULL,
                src_key    TEXT NOT NULL,
                rel_type   TEXT NOT NULL,
                dst_label  TEXT NOT NULL,
                dst_key    TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (src_label, src_key, rel_type, dst_label, dst_key)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS graph_meta (
                k TEXT PRIMARY KEY,
                v TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        for statement in SECONDARY_INDEXES {
            sqlx::query(statement).execute(&self.pool).await.map_err(map_sqlx_err)?;
        }
        debug!("graph schema ensured");
        Ok(())
    }

    async fn schema_version(&self) -> Result<Option<i64>, EtlError> {
        let row = sqlx::query("SELECT v FROM graph_meta WHERE k = 'schema_version'")
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        match row {
            None => Ok(None),
            Some(row) => {
                let v: String = row.get("v");
                v.parse::<i64>()
                    .map(Some)
                    .map_err(|_| EtlError::database_error(format!("corrupt schema version '{}'", v)))
            }
        }
    }

    async fn set_schema_version(&self, version: i64) -> Result<(), EtlError> {
        sqlx::query(
            "INSERT INTO graph_meta (k, v) VALUES ('schema_version', ?)
             ON CONFLICT(k) DO UPDATE SET v = excluded.v",
        )
        .bind(version.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn upsert_nodes(&self, nodes: &[NodeSpec]) -> Result<BatchOutcome, EtlError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let now = Utc::now().to_rfc3339();
        let mut outcome = BatchOutcome::default();

        for node in nodes {
            let properties = serde_json::to_string(&node.properties)?;
            let result = sqlx::query(
                "INSERT INTO graph_nodes (label, node_key, properties, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(label, node_key) DO UPDATE SET
                     properties = json_patch(graph_nodes.properties, excluded.properties),
                     updated_at = excluded.updated_at
                 RETURNING (created_at = updated_at) AS inserted",
            )
            .bind(node.label.as_str())
            .bind(&node.key)
            .bind(&properties)
            .bind(&now)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await;

            match result {
                Ok(row) => {
                    let inserted: i64 = row.get("inserted");
                    if inserted != 0 {
                        outcome.created += 1;
                    } else {
                        outcome.updated += 1;
                    }
                }
                Err(e) => match map_sqlx_err(e) {
                    EtlError::LoaderConstraint(_) => outcome.skipped_keys.push(node.key.clone()),
                    other => return Err(other),
                },
            }
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(outcome)
    }

    async fn upsert_edges(&self, edges: &[EdgeSpec]) -> Result<BatchOutcome, EtlError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let now = Utc::now().to_rfc3339();
        let mut outcome = BatchOutcome::default();

        for edge in edges {
            let properties = serde_json::to_string(&edge.properties)?;
            let result = sqlx::query(
                "INSERT INTO graph_edges
                     (src_label, src_key, rel_type, dst_label, dst_key, properties, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(src_label, src_key, rel_type, dst_label, dst_key) DO UPDATE SET
                     properties = excluded.properties,
                     updated_at = excluded.updated_at
                 RETURNING (created_at = updated_at) AS inserted",
            )
            .bind(edge.src_label.as_str())
            .bind(&edge.src_key)
            .bind(edge.rel.as_str())
            .bind(edge.dst_label.as_str())
            .bind(&edge.dst_key)
            .bind(&properties)
            .bind(&now)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await;

            match result {
                Ok(row) => {
                    let inserted: i64 = row.get("inserted");
                    if inserted != 0 {
                        outcome.created += 1;
                    } else {
                        outcome.updated += 1;
                    }
                }
                Err(e) => match map_sqlx_err(e) {
                    EtlError::LoaderConstraint(_) => outcome
                        .skipped_keys
                        .push(format!("{}-[{}]->{}", edge.src_key, edge.rel.as_str(), edge.dst_key)),
                    other => return Err(other),
                },
            }
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(outcome)
    }

    async fn stamp_deprecated(
        &self,
        label: NodeLabel,
        present_keys: &std::collections::HashSet<String>,
    ) -> Result<u64, EtlError> {
        let rows = sqlx::query("SELECT node_key FROM graph_nodes WHERE label = ?")
            .bind(label.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let now = Utc::now().to_rfc3339();
        let mut stamped = 0u64;
        for row in rows {
            let key: String = row.get("node_key");
            if present_keys.contains(&key) {
                continue;
            }
            let result = sqlx::query(
                "UPDATE graph_nodes
                 SET properties = json_set(properties, '$.deprecated_at', ?), updated_at = ?
                 WHERE label = ? AND node_key = ?
                   AND json_extract(properties, '$.deprecated_at') IS NULL",
            )
            .bind(&now)
            .bind(&now)
            .bind(label.as_str())
            .bind(&key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
            stamped += result.rows_affected();
        }
        Ok(stamped)
    }

    async fn node_count(&self, label: NodeLabel) -> Result<u64, EtlError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM graph_nodes WHERE label = ?")
            .bind(label.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    async fn edge_count(&self, rel: RelType) -> Result<u64, EtlError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM graph_edges WHERE rel_type = ?")
            .bind(rel.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteGraphStore {
        let s = SqliteGraphStore::in_memory().await.unwrap();
        s.ensure_schema().await.unwrap();
        s
    }

    fn org(key: &str, name: &str) -> NodeSpec {
        NodeSpec::new(NodeLabel::Organization, key).with_property("name", serde_json::json!(name))
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let s = store().await;
        let nodes = vec![org("ORG-1", "Acme")];

        let first = s.upsert_nodes(&nodes).await.unwrap();
        assert_eq!(first.created, 1);
        let second = s.upsert_nodes(&nodes).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);

        assert_eq!(s.node_count(NodeLabel::Organization).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_node_update_merges_properties() {
        let s = store().await;
        s.upsert_nodes(&[org("ORG-1", "Acme")]).await.unwrap();
        s.upsert_nodes(&[NodeSpec::new(NodeLabel::Organization, "ORG-1")
            .with_property("state", serde_json::json!("CA"))])
            .await
            .unwrap();

        let row = sqlx::query("SELECT properties FROM graph_nodes WHERE node_key = 'ORG-1'")
            .fetch_one(s.pool())
            .await
            .unwrap();
        let props: String = row.get("properties");
        let json: serde_json::Value = serde_json::from_str(&props).unwrap();
        assert_eq!(json["name"], "Acme");
        assert_eq!(json["state"], "CA");
    }

    #[tokio::test]
    async fn test_edges_idempotent_and_last_writer_wins() {
        let s = store().await;
        s.upsert_nodes(&[org("ORG-1", "Acme")]).await.unwrap();

        let mk = |confidence: f64| {
            EdgeSpec::new(
                NodeLabel::FinancialTransaction,
                "A-1",
                RelType::RecipientOf,
                NodeLabel::Organization,
                "ORG-1",
            )
            .with_property("confidence", serde_json::json!(confidence))
        };

        s.upsert_edges(&[mk(0.7)]).await.unwrap();
        s.upsert_edges(&[mk(0.9)]).await.unwrap();

        assert_eq!(s.edge_count(RelType::RecipientOf).await.unwrap(), 1);
        let row = sqlx::query("SELECT properties FROM graph_edges WHERE rel_type = 'RECIPIENT_OF'")
            .fetch_one(s.pool())
            .await
            .unwrap();
        let props: serde_json::Value = serde_json::from_str::<serde_json::Value>(&row.get::<String, _>("properties")).unwrap();
        assert_eq!(props["confidence"], 0.9);
    }

    #[tokio::test]
    async fn test_schema_version_round_trip() {
        let s = store().await;
        assert_eq!(s.schema_version().await.unwrap(), None);
        s.set_schema_version(2).await.unwrap();
        assert_eq!(s.schema_version().await.unwrap(), Some(2));
    }
}
