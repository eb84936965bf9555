// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the ETL domain.
//! Failures are categorized so that each layer can recover from the kinds it
//! understands and surface everything else to the asset boundary, where it is
//! converted into a structured failure record on the run report.
//!
//! ## Error Categories
//!
//! - **Configuration**: invalid or missing configuration, fatal at startup
//! - **Source**: unavailable inputs, header/schema mismatches, row decode
//!   failures
//! - **Validation**: rule failures attached to records, severity-driven
//! - **External**: transient (retried, circuit-broken) vs. permanent
//!   (degraded to the next strategy) lookup failures
//! - **Loader**: transient contention vs. constraint violations
//! - **Runtime**: quality-gate blocks, upstream failures, timeouts,
//!   cancellation
//!
//! ## Recovery Strategy
//!
//! `is_transient()` marks the kinds worth retrying with backoff. Everything
//! else is either degraded (enrichment strategies), skipped (single records),
//! or fails the owning asset.

use thiserror::Error;

/// Domain-specific errors for the ETL pipeline.
///
/// Each variant carries a descriptive message. Variants map one-to-one onto
/// the failure taxonomy used by the run report, so the asset boundary can
/// convert any `EtlError` into a structured failure record without guessing.
#[derive(Error, Debug, Clone)]
pub enum EtlError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Row decode error: {0}")]
    RowDecode(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Transient external failure: {0}")]
    ExternalTransient(String),

    #[error("Permanent external failure: {0}")]
    ExternalPermanent(String),

    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    #[error("Loader conflict: {0}")]
    LoaderConflict(String),

    #[error("Loader constraint violation: {0}")]
    LoaderConstraint(String),

    #[error("Quality gate blocked: {0}")]
    GateBlocking(String),

    #[error("Migration required: {0}")]
    MigrationRequired(String),

    #[error("Upstream failed: {0}")]
    UpstreamFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl EtlError {
    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Creates a new schema mismatch error
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Creates a new row decode error
    pub fn row_decode(msg: impl Into<String>) -> Self {
        Self::RowDecode(msg.into())
    }

    /// Creates a new transient external failure
    pub fn external_transient(msg: impl Into<String>) -> Self {
        Self::ExternalTransient(msg.into())
    }

    /// Creates a new permanent external failure
    pub fn external_permanent(msg: impl Into<String>) -> Self {
        Self::ExternalPermanent(msg.into())
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new IO error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::IoError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Checks whether the error is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EtlError::ExternalTransient(_)
                | EtlError::LoaderConflict(_)
                | EtlError::Timeout(_)
                | EtlError::IoError(_)
        )
    }

    /// Checks whether the error ends the whole run rather than one asset
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            EtlError::InvalidConfiguration(_) | EtlError::MigrationRequired(_) | EtlError::Cancelled(_)
        )
    }

    /// Gets the error category used in run reports
    pub fn category(&self) -> &'static str {
        match self {
            EtlError::InvalidConfiguration(_) => "configuration",
            EtlError::SourceUnavailable(_) => "source",
            EtlError::SchemaMismatch(_) => "source",
            EtlError::RowDecode(_) => "source",
            EtlError::ValidationFailed(_) => "validation",
            EtlError::ExternalTransient(_) => "external",
            EtlError::ExternalPermanent(_) => "external",
            EtlError::CircuitOpen(_) => "external",
            EtlError::LoaderConflict(_) => "loader",
            EtlError::LoaderConstraint(_) => "loader",
            EtlError::GateBlocking(_) => "gate",
            EtlError::MigrationRequired(_) => "migration",
            EtlError::UpstreamFailed(_) => "runtime",
            EtlError::Timeout(_) => "timeout",
            EtlError::Cancelled(_) => "cancellation",
            EtlError::IoError(_) => "io",
            EtlError::DatabaseError(_) => "database",
            EtlError::SerializationError(_) => "serialization",
            EtlError::InternalError(_) => "internal",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EtlError::external_transient("503").is_transient());
        assert!(EtlError::LoaderConflict("busy".into()).is_transient());
        assert!(!EtlError::external_permanent("404").is_transient());
        assert!(!EtlError::LoaderConstraint("dup".into()).is_transient());
    }

    #[test]
    fn test_categories_match_report_taxonomy() {
        assert_eq!(EtlError::invalid_config("x").category(), "configuration");
        assert_eq!(EtlError::GateBlocking("x".into()).category(), "gate");
        assert_eq!(EtlError::Cancelled("x".into()).category(), "cancellation");
    }
}
