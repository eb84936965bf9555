// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Delimited Text Extractor
//!
//! CSV/TSV sources. The header is read and checked against the declared
//! schema before the first chunk; a missing column is a fatal
//! `SchemaMismatch`. Cells are coerced to the declared dtype row by row;
//! failures are dropped, counted, and the stream fails only when the decode
//! error fraction exceeds the descriptor's tolerance.

use crate::infrastructure::config::RetryConfig;
use crate::infrastructure::extractors::open_with_retry;
use async_trait::async_trait;
use sbir_graph_domain::services::{ChunkIterator, DecodeErrorLog, RecordSource, SourceDescriptor};
use sbir_graph_domain::value_objects::{FieldType, FieldValue, Record, RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::fs::File;

/// Delimited-text record source with a declared schema.
pub struct DelimitedSource {
    schema: RecordSchema,
    delimiter: u8,
    io_retry: RetryConfig,
}

impl DelimitedSource {
    pub fn new(schema: RecordSchema, io_retry: RetryConfig) -> Self {
        Self {
            schema,
            delimiter: b',',
            io_retry,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[async_trait]
impl RecordSource for DelimitedSource {
    fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn ChunkIterator>, EtlError> {
        let file = open_with_retry(&descriptor.path, &self.io_retry).await?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| EtlError::schema_mismatch(format!("unreadable header: {}", e)))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        self.schema.check_header(&headers)?;

        // Projection: schema field -> column position and dtype.
        let projection: Vec<(String, usize, FieldType)> = self
            .schema
            .fields()
            .iter()
            .map(|f| {
                let idx = headers
                    .iter()
                    .position(|h| *h == f.name)
                    .expect("check_header verified presence");
                (f.name.clone(), idx, f.ty)
            })
            .collect();

        Ok(Box::new(DelimitedChunkIter {
            rows: reader.into_records(),
            projection,
            chunk_size: descriptor.chunk_size.max(1),
            max_error_fraction: descriptor.max_error_fraction,
            next_chunk_index: 0,
            errors: DecodeErrorLog::default(),
            required: self
                .schema
                .fields()
                .iter()
                .filter(|f| f.required)
                .map(|f| f.name.clone())
                .collect(),
        }))
    }
}

struct DelimitedChunkIter {
    rows: csv::StringRecordsIntoIter<File>,
    projection: Vec<(String, usize, FieldType)>,
    chunk_size: usize,
    max_error_fraction: f64,
    next_chunk_index: u64,
    errors: DecodeErrorLog,
    required: Vec<String>,
}

impl std::fmt::Debug for DelimitedChunkIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelimitedChunkIter")
            .field("next_chunk_index", &self.next_chunk_index)
            .finish_non_exhaustive()
    }
}

impl DelimitedChunkIter {
    fn decode_row(&self, row: &csv::StringRecord) -> Result<Record, EtlError> {
        let mut record = Record::new();
        for (name, idx, ty) in &self.projection {
            let raw = row.get(*idx).unwrap_or("");
            let value = FieldValue::coerce(raw, *ty)?;
            record.set(name.clone(), value);
        }
        for name in &self.required {
            if record.is_null_or_missing(name) {
                return Err(EtlError::row_decode(format!("required field '{}' empty", name)));
            }
        }
        Ok(record)
    }
}

#[async_trait]
impl ChunkIterator for DelimitedChunkIter {
    async fn next_chunk(&mut self) -> Result<Option<RecordChunk>, EtlError> {
        let mut records = Vec::with_capacity(self.chunk_size);

        while records.len() < self.chunk_size {
            match self.rows.next() {
                None => break,
                Some(Err(e)) => {
                    self.errors.record_failure(format!("unparsable row: {}", e));
                }
                Some(Ok(row)) => match self.decode_row(&row) {
                    Ok(record) => {
                        self.errors.record_ok();
                        records.push(record);
                    }
                    Err(e) => {
                        self.errors
                            .record_failure(format!("{} | row: {:?}", e, row.iter().collect::<Vec<_>>()));
                    }
                },
            }
        }

        // Tolerance is enforced at chunk boundaries so a poisoned file fails
        // fast instead of after a full scan.
        self.errors.check_tolerance(self.max_error_fraction)?;

        if records.is_empty() {
            return Ok(None);
        }
        let chunk = RecordChunk::new(self.next_chunk_index, records);
        self.next_chunk_index += 1;
        Ok(Some(chunk))
    }

    fn decode_errors(&self) -> &DecodeErrorLog {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_graph_domain::value_objects::FieldDef;

    fn award_schema() -> RecordSchema {
        RecordSchema::new(vec![
            FieldDef::new("award_id", FieldType::Str, true),
            FieldDef::new("amount", FieldType::Float, false),
            FieldDef::new("award_date", FieldType::Date, false),
        ])
    }

    async fn open_csv(content: &str, chunk_size: usize) -> Result<Box<dyn ChunkIterator>, EtlError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("awards.csv");
        std::fs::write(&path, content).unwrap();
        let source = DelimitedSource::new(award_schema(), RetryConfig::default());
        let descriptor = SourceDescriptor::new("awards", &path).with_chunk_size(chunk_size);
        // Hold the tempdir alive for the duration of the read by leaking it;
        // tests read everything before returning.
        std::mem::forget(dir);
        source.open(&descriptor).await
    }

    #[tokio::test]
    async fn test_reads_typed_chunks_with_indices() {
        let csv = "award_id,amount,award_date,extra\nA-1,1000,2021-06-30,x\nA-2,\"$2,500\",2020-01-15,y\nA-3,3000,2019-05-01,z\n";
        let mut iter = open_csv(csv, 2).await.unwrap();

        let first = iter.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.len(), 2);
        assert_eq!(first.records[0].get_str("award_id"), Some("A-1"));
        assert_eq!(first.records[0].get_float("amount"), Some(1000.0));
        assert_eq!(first.records[1].get_float("amount"), Some(2500.0));

        let second = iter.next_chunk().await.unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert!(iter.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_column_is_schema_mismatch() {
        let csv = "award_id,award_date\nA-1,2021-06-30\n";
        let err = open_csv(csv, 10).await.unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_bad_rows_dropped_within_tolerance() {
        let mut csv = String::from("award_id,amount,award_date\n");
        for i in 0..98 {
            csv.push_str(&format!("A-{},100,2021-01-01\n", i));
        }
        csv.push_str("A-98,not_a_number,2021-01-01\n");
        csv.push_str("A-99,100,2021-01-01\n");

        let mut iter = open_csv(&csv, 1000).await.unwrap();
        let chunk = iter.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 99);
        assert_eq!(iter.decode_errors().rows_failed, 1);
    }

    #[tokio::test]
    async fn test_exceeding_tolerance_fails_stream() {
        let mut csv = String::from("award_id,amount,award_date\n");
        for i in 0..10 {
            let amount = if i % 2 == 0 { "bad" } else { "100" };
            csv.push_str(&format!("A-{},{},2021-01-01\n", i, amount));
        }
        let mut iter = open_csv(&csv, 1000).await.unwrap();
        let err = iter.next_chunk().await.unwrap_err();
        assert!(matches!(err, EtlError::RowDecode(_)));
    }
}
