// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Record Extractors
//!
//! One [`RecordSource`](sbir_graph_domain::services::RecordSource)
//! implementation per source format:
//!
//! - [`delimited`]: CSV/TSV with header checking and dtype coercion
//! - [`sql_dump`]: gzip-compressed SQL dumps, scanned as a stream with
//!   column projection (random access is never assumed)
//! - [`stat_table`]: compact statistical-binary tables, the five-table
//!   patent-assignment source joined downstream by reel/frame id
//!
//! Format is inferred from extension first, magic bytes second, unless the
//! descriptor pins it explicitly.

pub mod delimited;
pub mod sql_dump;
pub mod stat_table;

use crate::infrastructure::config::RetryConfig;
use sbir_graph_domain::services::SourceFormat;
use sbir_graph_domain::EtlError;
use std::io::Read;
use std::path::Path;
use tracing::warn;

pub use delimited::DelimitedSource;
pub use sql_dump::SqlDumpSource;
pub use stat_table::{StatTableSource, ASSIGNMENT_TABLES};

/// Infers the source format from extension, falling back to magic bytes.
pub fn infer_format(path: &Path) -> Result<SourceFormat, EtlError> {
    let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
    if name.ends_with(".csv") || name.ends_with(".tsv") {
        return Ok(SourceFormat::Delimited);
    }
    if name.ends_with(".sql.gz") || name.ends_with(".gz") {
        return Ok(SourceFormat::SqlDumpGz);
    }
    if name.ends_with(".stb") {
        return Ok(SourceFormat::StatTable);
    }

    let mut magic = [0u8; 4];
    let mut file = std::fs::File::open(path)
        .map_err(|e| EtlError::source_unavailable(format!("{}: {}", path.display(), e)))?;
    let n = file.read(&mut magic)?;
    if n >= 2 && magic[0] == 0x1f && magic[1] == 0x8b {
        return Ok(SourceFormat::SqlDumpGz);
    }
    if n == 4 && &magic == stat_table::MAGIC {
        return Ok(SourceFormat::StatTable);
    }
    // Delimited text is the only remaining format we accept.
    if n > 0 && magic[..n].iter().all(|b| b.is_ascii() && *b != 0) {
        return Ok(SourceFormat::Delimited);
    }
    Err(EtlError::schema_mismatch(format!(
        "cannot infer source format of {}",
        path.display()
    )))
}

/// Opens a source file, retrying transient IO failures with backoff.
/// Missing files and permission errors fail immediately as
/// `SourceUnavailable`.
pub async fn open_with_retry(path: &Path, retry: &RetryConfig) -> Result<std::fs::File, EtlError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match std::fs::File::open(path) {
            Ok(file) => return Ok(file),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                ) =>
            {
                return Err(EtlError::source_unavailable(format!("{}: {}", path.display(), e)));
            }
            Err(e) if attempt < retry.max_attempts => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    "transient open failure on {} (attempt {}): {}; retrying in {:?}",
                    path.display(),
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(EtlError::source_unavailable(format!(
                    "{}: {} after {} attempts",
                    path.display(),
                    e,
                    attempt
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_by_extension() {
        assert_eq!(infer_format(Path::new("awards.csv")).unwrap(), SourceFormat::Delimited);
        assert_eq!(
            infer_format(Path::new("contracts.sql.gz")).unwrap(),
            SourceFormat::SqlDumpGz
        );
        assert_eq!(
            infer_format(Path::new("assignment.stb")).unwrap(),
            SourceFormat::StatTable
        );
    }

    #[test]
    fn test_infer_gzip_by_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystery.dat");
        std::fs::write(&path, [0x1f, 0x8b, 0x08, 0x00]).unwrap();
        assert_eq!(infer_format(&path).unwrap(), SourceFormat::SqlDumpGz);
    }

    #[tokio::test]
    async fn test_open_missing_is_source_unavailable() {
        let err = open_with_retry(Path::new("/no/such/file.csv"), &RetryConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::SourceUnavailable(_)));
    }
}
