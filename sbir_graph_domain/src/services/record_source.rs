// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Source Port
//!
//! The single extractor interface every source format implements. A source
//! is opened from a descriptor and yields bounded, index-stamped chunks of
//! typed records; the schema is declared up front and checked at header-read
//! time.
//!
//! This is an infrastructure port: implementations live in the
//! infrastructure layer and do real IO, so the trait is async.
//!
//! ## Failure Contract
//!
//! - `SourceUnavailable`: the descriptor cannot be resolved or read
//! - `SchemaMismatch`: header missing a declared column, fatal
//! - `RowDecodeError`: per-row failures are accumulated by the extractor
//!   into [`DecodeErrorLog`]; the asset fails only when the configured
//!   tolerance fraction is exceeded

use crate::value_objects::{RecordChunk, RecordSchema};
use crate::EtlError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source file formats the extractor layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Delimited text (CSV/TSV).
    Delimited,
    /// Gzip-compressed SQL dump, scanned as a stream.
    SqlDumpGz,
    /// Statistical-binary table file (multi-table sources).
    StatTable,
}

/// Everything needed to open one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable name used in logs, metrics, and error reports.
    pub source_name: String,
    pub path: PathBuf,
    /// Explicit format; inferred from extension/magic bytes when absent.
    pub format: Option<SourceFormat>,
    /// Records per chunk.
    pub chunk_size: usize,
    /// Fraction of row decode errors tolerated before the asset fails.
    pub max_error_fraction: f64,
}

impl SourceDescriptor {
    pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
    pub const DEFAULT_MAX_ERROR_FRACTION: f64 = 0.05;

    pub fn new(source_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_name: source_name.into(),
            path: path.into(),
            format: None,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            max_error_fraction: Self::DEFAULT_MAX_ERROR_FRACTION,
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Accumulated row-decode failures for one stream, with a bounded sample of
/// offending rows for the failure report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodeErrorLog {
    pub rows_seen: u64,
    pub rows_failed: u64,
    pub samples: Vec<String>,
}

impl DecodeErrorLog {
    /// Sample rows retained for the failure report.
    pub const MAX_SAMPLES: usize = 20;

    pub fn record_ok(&mut self) {
        self.rows_seen += 1;
    }

    pub fn record_failure(&mut self, row_repr: String) {
        self.rows_seen += 1;
        self.rows_failed += 1;
        if self.samples.len() < Self::MAX_SAMPLES {
            self.samples.push(row_repr);
        }
    }

    pub fn failure_fraction(&self) -> f64 {
        if self.rows_seen == 0 {
            0.0
        } else {
            self.rows_failed as f64 / self.rows_seen as f64
        }
    }

    /// Converts the log into the asset-failing error when over tolerance.
    pub fn check_tolerance(&self, max_fraction: f64) -> Result<(), EtlError> {
        if self.failure_fraction() > max_fraction {
            Err(EtlError::row_decode(format!(
                "{} of {} rows failed to decode ({:.1}% > {:.1}% tolerated); samples: {:?}",
                self.rows_failed,
                self.rows_seen,
                self.failure_fraction() * 100.0,
                max_fraction * 100.0,
                self.samples
            )))
        } else {
            Ok(())
        }
    }
}

/// Pull-based chunk stream returned by `open`.
#[async_trait]
pub trait ChunkIterator: Send + std::fmt::Debug {
    /// Next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<RecordChunk>, EtlError>;

    /// Decode-error bookkeeping accumulated so far.
    fn decode_errors(&self) -> &DecodeErrorLog;
}

/// The extractor port.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Declared output schema of this source.
    fn schema(&self) -> &RecordSchema;

    /// Opens the descriptor and returns a chunk stream.
    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn ChunkIterator>, EtlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_log_tolerance() {
        let mut log = DecodeErrorLog::default();
        for _ in 0..96 {
            log.record_ok();
        }
        for i in 0..4 {
            log.record_failure(format!("bad row {}", i));
        }
        assert!(log.check_tolerance(0.05).is_ok());
        log.record_failure("bad row 4".into());
        log.record_failure("bad row 5".into());
        assert!(log.check_tolerance(0.05).is_err());
    }

    #[test]
    fn test_sample_cap() {
        let mut log = DecodeErrorLog::default();
        for i in 0..50 {
            log.record_failure(format!("row {}", i));
        }
        assert_eq!(log.samples.len(), DecodeErrorLog::MAX_SAMPLES);
    }
}
