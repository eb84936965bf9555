// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Columnar Artifact Format
//!
//! The primary on-disk artifact format: a streaming columnar container with
//! one row group per committed chunk, zstd-compressed column blocks, and a
//! footer checksum.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header: magic "SGCF", version u16, schema length + JSON  │
//! ├──────────────────────────────────────────────────────────┤
//! │ Row group 0: marker "RGRP", row count, column blocks     │
//! │ Row group 1: ...                                         │
//! ├──────────────────────────────────────────────────────────┤
//! │ Footer: marker "FTRX", total rows, group count,          │
//! │         SHA-256 over all row-group bytes                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each column block is the JSON array of one field's values across the
//! group, zstd-compressed. Row groups are written as chunks arrive, so the
//! writer never holds more than one chunk in memory; a file without a footer
//! is an unsealed temp artifact and is rejected by the reader.

use sbir_graph_domain::value_objects::{FieldValue, Record, RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

const MAGIC: &[u8; 4] = b"SGCF";
const GROUP_MARKER: &[u8; 4] = b"RGRP";
const FOOTER_MARKER: &[u8; 4] = b"FTRX";
const FORMAT_VERSION: u16 = 1;

/// Zstd level for column blocks. Level 3 is the speed/ratio sweet spot for
/// mostly-text columns.
const ZSTD_LEVEL: i32 = 3;

/// Streaming writer producing one row group per written chunk.
pub struct ColumnarWriter {
    writer: BufWriter<fs::File>,
    schema: RecordSchema,
    group_hasher: Sha256,
    total_rows: u64,
    group_count: u32,
    bytes_written: u64,
    finished: bool,
}

impl ColumnarWriter {
    pub async fn create(path: &Path, schema: RecordSchema) -> Result<Self, EtlError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(path).await?;
        let mut writer = BufWriter::new(file);

        let schema_json = serde_json::to_vec(&schema)?;
        writer.write_all(MAGIC).await?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes()).await?;
        writer.write_all(&(schema_json.len() as u32).to_le_bytes()).await?;
        writer.write_all(&schema_json).await?;

        let bytes_written = (MAGIC.len() + 2 + 4 + schema_json.len()) as u64;
        Ok(Self {
            writer,
            schema,
            group_hasher: Sha256::new(),
            total_rows: 0,
            group_count: 0,
            bytes_written,
            finished: false,
        })
    }

    /// Writes one chunk as a row group. Column order follows the schema.
    pub async fn write_chunk(&mut self, chunk: &RecordChunk) -> Result<(), EtlError> {
        if chunk.is_empty() {
            return Ok(());
        }

        let mut group = Vec::new();
        group.extend_from_slice(GROUP_MARKER);
        group.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        group.extend_from_slice(&(self.schema.fields().len() as u32).to_le_bytes());

        for field in self.schema.fields() {
            let column: Vec<&FieldValue> = chunk
                .records
                .iter()
                .map(|r| r.get(&field.name).unwrap_or(&FieldValue::Null))
                .collect();
            let raw = serde_json::to_vec(&column)?;
            let compressed = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL)
                .map_err(|e| EtlError::io_error(format!("column compression failed: {}", e)))?;

            group.extend_from_slice(&(field.name.len() as u16).to_le_bytes());
            group.extend_from_slice(field.name.as_bytes());
            group.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
            group.extend_from_slice(&compressed);
        }

        self.group_hasher.update(&group);
        self.writer.write_all(&group).await?;
        self.total_rows += chunk.len() as u64;
        self.group_count += 1;
        self.bytes_written += group.len() as u64;
        Ok(())
    }

    /// Seals the file with the footer. Rows and bytes are returned for the
    /// artifact sidecar.
    pub async fn finish(mut self) -> Result<(u64, u64), EtlError> {
        let checksum = self.group_hasher.finalize();
        self.writer.write_all(FOOTER_MARKER).await?;
        self.writer.write_all(&self.total_rows.to_le_bytes()).await?;
        self.writer.write_all(&self.group_count.to_le_bytes()).await?;
        self.writer.write_all(&checksum).await?;
        self.writer.flush().await?;
        self.bytes_written += (FOOTER_MARKER.len() + 8 + 4 + 32) as u64;
        self.finished = true;
        Ok((self.total_rows, self.bytes_written))
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }
}

/// Reader over a sealed columnar file.
pub struct ColumnarReader {
    reader: BufReader<fs::File>,
    schema: RecordSchema,
    group_hasher: Sha256,
    rows_read: u64,
}

impl ColumnarReader {
    pub async fn open(path: &Path) -> Result<Self, EtlError> {
        let file = fs::File::open(path).await.map_err(|e| {
            EtlError::source_unavailable(format!("cannot open artifact {}: {}", path.display(), e))
        })?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).await?;
        if &magic != MAGIC {
            return Err(EtlError::schema_mismatch(format!(
                "{} is not a columnar artifact",
                path.display()
            )));
        }
        let mut version = [0u8; 2];
        reader.read_exact(&mut version).await?;
        let version = u16::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(EtlError::schema_mismatch(format!(
                "columnar format version {} unsupported (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let mut schema_len = [0u8; 4];
        reader.read_exact(&mut schema_len).await?;
        let mut schema_json = vec![0u8; u32::from_le_bytes(schema_len) as usize];
        reader.read_exact(&mut schema_json).await?;
        let schema: RecordSchema = serde_json::from_slice(&schema_json)?;

        Ok(Self {
            reader,
            schema,
            group_hasher: Sha256::new(),
            rows_read: 0,
        })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Reads the next row group reassembled into records; `None` after the
    /// footer, whose checksum and row count are verified.
    pub async fn next_group(&mut self) -> Result<Option<Vec<Record>>, EtlError> {
        let mut marker = [0u8; 4];
        self.reader.read_exact(&mut marker).await?;

        if &marker == FOOTER_MARKER {
            return self.verify_footer().await.map(|_| None);
        }
        if &marker != GROUP_MARKER {
            return Err(EtlError::io_error("corrupt artifact: bad row-group marker"));
        }

        let mut group_bytes = marker.to_vec();

        let mut buf4 = [0u8; 4];
        self.reader.read_exact(&mut buf4).await?;
        group_bytes.extend_from_slice(&buf4);
        let row_count = u32::from_le_bytes(buf4) as usize;

        self.reader.read_exact(&mut buf4).await?;
        group_bytes.extend_from_slice(&buf4);
        let col_count = u32::from_le_bytes(buf4) as usize;

        let mut records = vec![Record::new(); row_count];
        for _ in 0..col_count {
            let mut buf2 = [0u8; 2];
            self.reader.read_exact(&mut buf2).await?;
            group_bytes.extend_from_slice(&buf2);
            let mut name = vec![0u8; u16::from_le_bytes(buf2) as usize];
            self.reader.read_exact(&mut name).await?;
            group_bytes.extend_from_slice(&name);
            let name = String::from_utf8(name)
                .map_err(|_| EtlError::io_error("corrupt artifact: non-utf8 column name"))?;

            let mut buf8 = [0u8; 8];
            self.reader.read_exact(&mut buf8).await?;
            group_bytes.extend_from_slice(&buf8);
            let mut compressed = vec![0u8; u64::from_le_bytes(buf8) as usize];
            self.reader.read_exact(&mut compressed).await?;
            group_bytes.extend_from_slice(&compressed);

            let raw = zstd::decode_all(compressed.as_slice())
                .map_err(|e| EtlError::io_error(format!("column decompression failed: {}", e)))?;
            let values: Vec<FieldValue> = serde_json::from_slice(&raw)?;
            if values.len() != row_count {
                return Err(EtlError::io_error(format!(
                    "corrupt artifact: column '{}' has {} values for {} rows",
                    name,
                    values.len(),
                    row_count
                )));
            }
            for (record, value) in records.iter_mut().zip(values) {
                record.set(name.clone(), value);
            }
        }

        self.group_hasher.update(&group_bytes);
        self.rows_read += row_count as u64;
        Ok(Some(records))
    }

    /// Drains every remaining group into one vector.
    pub async fn read_all(&mut self) -> Result<Vec<Record>, EtlError> {
        let mut all = Vec::new();
        while let Some(group) = self.next_group().await? {
            all.extend(group);
        }
        Ok(all)
    }

    async fn verify_footer(&mut self) -> Result<(), EtlError> {
        let mut buf8 = [0u8; 8];
        self.reader.read_exact(&mut buf8).await?;
        let total_rows = u64::from_le_bytes(buf8);

        let mut buf4 = [0u8; 4];
        self.reader.read_exact(&mut buf4).await?;

        let mut stored = [0u8; 32];
        self.reader.read_exact(&mut stored).await?;

        let computed = std::mem::take(&mut self.group_hasher).finalize();
        if stored != computed.as_slice() {
            return Err(EtlError::io_error("artifact checksum mismatch"));
        }
        if total_rows != self.rows_read {
            return Err(EtlError::io_error(format!(
                "artifact row count mismatch: footer {} vs read {}",
                total_rows, self.rows_read
            )));
        }
        Ok(())
    }
}

/// Writes records as line-delimited JSON, the secondary format for small
/// outputs.
pub async fn write_ndjson(path: &Path, records: &[Record]) -> Result<u64, EtlError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let file = fs::File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut bytes = 0u64;
    for record in records {
        let line = serde_json::to_vec(record)?;
        writer.write_all(&line).await?;
        writer.write_all(b"\n").await?;
        bytes += line.len() as u64 + 1;
    }
    writer.flush().await?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_graph_domain::value_objects::{FieldDef, FieldType};

    fn test_schema() -> RecordSchema {
        RecordSchema::new(vec![
            FieldDef::new("award_id", FieldType::Str, true),
            FieldDef::new("amount", FieldType::Float, true),
        ])
    }

    fn test_records(offset: i64, n: i64) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new()
                    .with("award_id", FieldValue::Str(format!("A-{}", offset + i)))
                    .with("amount", FieldValue::Float(1000.0 * (offset + i) as f64))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_trip_multiple_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.col");

        let mut writer = ColumnarWriter::create(&path, test_schema()).await.unwrap();
        writer
            .write_chunk(&RecordChunk::new(0, test_records(0, 3)))
            .await
            .unwrap();
        writer
            .write_chunk(&RecordChunk::new(1, test_records(3, 2)))
            .await
            .unwrap();
        let (rows, bytes) = writer.finish().await.unwrap();
        assert_eq!(rows, 5);
        assert!(bytes > 0);

        let mut reader = ColumnarReader::open(&path).await.unwrap();
        let all = reader.read_all().await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].get_str("award_id"), Some("A-4"));
        assert_eq!(all[4].get_float("amount"), Some(4000.0));
    }

    #[tokio::test]
    async fn test_unsealed_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unsealed.col");

        let mut writer = ColumnarWriter::create(&path, test_schema()).await.unwrap();
        writer
            .write_chunk(&RecordChunk::new(0, test_records(0, 2)))
            .await
            .unwrap();
        // Dropped without finish(): no footer, possibly not even a header.
        drop(writer);

        match ColumnarReader::open(&path).await {
            Err(_) => {}
            Ok(mut reader) => assert!(reader.read_all().await.is_err()),
        }
    }

    #[tokio::test]
    async fn test_wrong_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_columnar.col");
        tokio::fs::write(&path, b"PK\x03\x04 something else").await.unwrap();
        assert!(matches!(
            ColumnarReader::open(&path).await,
            Err(EtlError::SchemaMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_ndjson_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.ndjson");
        let bytes = write_ndjson(&path, &test_records(0, 2)).await.unwrap();
        assert!(bytes > 0);
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
