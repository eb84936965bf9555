// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Graph Repository Port
//!
//! Storage abstraction the graph loader writes through. The loader is the
//! sole mutator of the persisted graph; this port keeps that discipline
//! testable by letting integration tests swap in an in-memory store.
//!
//! ## Semantics Required of Implementations
//!
//! - **Upsert**: nodes are keyed by `(label, key)`; existing nodes get their
//!   properties merged and `updated_at` stamped, new nodes get `created_at`.
//! - **Idempotent edges**: `(src, rel_type, dst)` produces at most one edge;
//!   edge properties are last-writer-wins.
//! - **Atomic batches**: one batch, one transaction; a failure rolls the
//!   whole batch back.
//! - **Conflict signaling**: transient contention surfaces as
//!   `LoaderConflict`, unique-constraint violations as `LoaderConstraint`.

use crate::EtlError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node labels of the property graph, with their unique key property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Organization,
    FinancialTransaction,
    Patent,
    PatentAssignment,
    CetArea,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Organization => "Organization",
            NodeLabel::FinancialTransaction => "FinancialTransaction",
            NodeLabel::Patent => "Patent",
            NodeLabel::PatentAssignment => "PatentAssignment",
            NodeLabel::CetArea => "CETArea",
        }
    }

    /// The property carrying the unique constraint for this label.
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Organization => "organization_id",
            NodeLabel::FinancialTransaction => "transaction_id",
            NodeLabel::Patent => "grant_doc_num",
            NodeLabel::PatentAssignment => "rf_id",
            NodeLabel::CetArea => "cet_id",
        }
    }

    pub fn all() -> &'static [NodeLabel] {
        &[
            NodeLabel::Organization,
            NodeLabel::FinancialTransaction,
            NodeLabel::Patent,
            NodeLabel::PatentAssignment,
            NodeLabel::CetArea,
        ]
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship types of the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    RecipientOf,
    FundedBy,
    Owns,
    AssignedVia,
    AssignedFrom,
    AssignedTo,
    ChainOf,
    GeneratedFrom,
    ApplicableTo,
    ParticipatedIn,
    SpecializesIn,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::RecipientOf => "RECIPIENT_OF",
            RelType::FundedBy => "FUNDED_BY",
            RelType::Owns => "OWNS",
            RelType::AssignedVia => "ASSIGNED_VIA",
            RelType::AssignedFrom => "ASSIGNED_FROM",
            RelType::AssignedTo => "ASSIGNED_TO",
            RelType::ChainOf => "CHAIN_OF",
            RelType::GeneratedFrom => "GENERATED_FROM",
            RelType::ApplicableTo => "APPLICABLE_TO",
            RelType::ParticipatedIn => "PARTICIPATED_IN",
            RelType::SpecializesIn => "SPECIALIZES_IN",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub label: NodeLabel,
    /// Value of the label's unique key property.
    pub key: String,
    /// Remaining properties, merged into the node on update.
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl NodeSpec {
    pub fn new(label: NodeLabel, key: impl Into<String>) -> Self {
        Self {
            label,
            key: key.into(),
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// One edge to create idempotently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub src_label: NodeLabel,
    pub src_key: String,
    pub rel: RelType,
    pub dst_label: NodeLabel,
    pub dst_key: String,
    /// Edge properties (method/confidence on derived edges); last writer wins.
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl EdgeSpec {
    pub fn new(
        src_label: NodeLabel,
        src_key: impl Into<String>,
        rel: RelType,
        dst_label: NodeLabel,
        dst_key: impl Into<String>,
    ) -> Self {
        Self {
            src_label,
            src_key: src_key.into(),
            rel,
            dst_label,
            dst_key: dst_key.into(),
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

/// Result of one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub created: u64,
    pub updated: u64,
    /// Keys skipped on constraint violations, for the failed-record report.
    pub skipped_keys: Vec<String>,
}

impl BatchOutcome {
    pub fn absorb(&mut self, other: BatchOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped_keys.extend(other.skipped_keys);
    }
}

/// The graph storage port.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Creates constraints and indexes with if-not-exists semantics.
    async fn ensure_schema(&self) -> Result<(), EtlError>;

    /// Currently applied schema version, `None` before first migration.
    async fn schema_version(&self) -> Result<Option<i64>, EtlError>;

    /// Records the applied schema version on the marker node.
    async fn set_schema_version(&self, version: i64) -> Result<(), EtlError>;

    /// Upserts a batch of nodes in one transaction.
    async fn upsert_nodes(&self, nodes: &[NodeSpec]) -> Result<BatchOutcome, EtlError>;

    /// Creates a batch of edges idempotently in one transaction.
    async fn upsert_edges(&self, edges: &[EdgeSpec]) -> Result<BatchOutcome, EtlError>;

    /// Stamps `deprecated_at` on nodes of `label` absent from
    /// `present_keys`. Opt-in tombstoning support; never deletes.
    async fn stamp_deprecated(
        &self,
        label: NodeLabel,
        present_keys: &std::collections::HashSet<String>,
    ) -> Result<u64, EtlError>;

    /// Node count per label, used by quality checks and tests.
    async fn node_count(&self, label: NodeLabel) -> Result<u64, EtlError>;

    /// Edge count per relationship type.
    async fn edge_count(&self, rel: RelType) -> Result<u64, EtlError>;
}
