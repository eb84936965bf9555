// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact Metadata
//!
//! The sidecar record written next to every materialized artifact. Identity
//! is `(asset_key, partition, fingerprint)`; the fingerprint is a pure
//! function of upstream fingerprints, code version, and the configuration
//! slice, so re-running with identical inputs re-derives the identical
//! identity.

use crate::value_objects::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a quality check bound to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckSeverity {
    /// Failing blocks downstream assets.
    Error,
    /// Failing is recorded but non-blocking.
    Warn,
}

/// Result of one evaluated quality check, attached to the sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: String,
    pub severity: CheckSeverity,
    pub passed: bool,
    /// Observed metric value the predicate was evaluated against.
    pub observed: f64,
    pub threshold: f64,
    pub description: String,
}

impl CheckResult {
    /// True when this result must block downstream materialization.
    pub fn is_blocking_failure(&self) -> bool {
        !self.passed && self.severity == CheckSeverity::Error
    }
}

/// Sidecar metadata for one materialized artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub asset_key: String,
    pub partition: Option<String>,
    pub fingerprint: Fingerprint,
    pub storage_path: String,
    pub row_count: u64,
    pub bytes_written: u64,
    pub schema_digest: String,
    pub produced_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub peak_memory_delta_bytes: u64,
    pub upstream_fingerprints: Vec<Fingerprint>,
    pub checks: Vec<CheckResult>,
}

impl ArtifactMeta {
    /// Whether any ERROR-severity check failed on this artifact.
    pub fn has_blocking_failure(&self) -> bool {
        self.checks.iter().any(CheckResult::is_blocking_failure)
    }
}
