// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Statistical-Binary Table Extractor
//!
//! The patent assignment source is a multi-file statistical-binary drop:
//! five tables sharing the reel/frame id, one file per table. The
//! acquisition step converts the vendor's statistical package files into
//! this compact table container; the extractor reads the container and
//! exposes each table as its own record stream. The enrichment stage joins
//! the streams by `rf_id`.
//!
//! ## Container Layout
//!
//! ```text
//! magic "STB1" | version u16 | table name (u16 len + bytes)
//! column count u32 | per column: name (u16 len + bytes), type tag u8
//! row count u64
//! rows: per cell: presence u8, then the value
//!       str   → u32 len + utf8
//!       int   → i64 le
//!       float → f64 le
//!       date  → i32 le, days since 1960-01-01 (statistical epoch)
//! ```

use crate::infrastructure::config::RetryConfig;
use crate::infrastructure::extractors::open_with_retry;
use async_trait::async_trait;
use chrono::NaiveDate;
use sbir_graph_domain::services::{ChunkIterator, DecodeErrorLog, RecordSource, SourceDescriptor};
use sbir_graph_domain::value_objects::{FieldType, FieldValue, Record, RecordChunk, RecordSchema};
use sbir_graph_domain::EtlError;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"STB1";
const FORMAT_VERSION: u16 = 1;

/// The five assignment tables, keyed throughout by `rf_id`.
pub const ASSIGNMENT_TABLES: &[&str] = &[
    "assignment",
    "assignee",
    "assignor",
    "documentid",
    "assignment_conveyance",
];

/// Days between 1960-01-01 (statistical epoch) and the chrono epoch maths.
fn stat_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1960, 1, 1).expect("static date")
}

const TAG_STR: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_DATE: u8 = 3;

fn type_tag(ty: FieldType) -> u8 {
    match ty {
        FieldType::Str | FieldType::Bool => TAG_STR,
        FieldType::Int => TAG_INT,
        FieldType::Float => TAG_FLOAT,
        FieldType::Date => TAG_DATE,
    }
}

/// Statistical-binary record source for one table of the drop.
pub struct StatTableSource {
    schema: RecordSchema,
    table: String,
    io_retry: RetryConfig,
}

impl StatTableSource {
    pub fn new(schema: RecordSchema, table: impl Into<String>, io_retry: RetryConfig) -> Self {
        Self {
            schema,
            table: table.into(),
            io_retry,
        }
    }
}

#[async_trait]
impl RecordSource for StatTableSource {
    fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn ChunkIterator>, EtlError> {
        let file = open_with_retry(&descriptor.path, &self.io_retry).await?;
        let mut reader = BufReader::with_capacity(1 << 20, file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(EtlError::schema_mismatch(format!(
                "{} is not a statistical table container",
                descriptor.path.display()
            )));
        }
        let version = read_u16(&mut reader)?;
        if version != FORMAT_VERSION {
            return Err(EtlError::schema_mismatch(format!(
                "stat table version {} unsupported",
                version
            )));
        }
        let table = read_string16(&mut reader)?;
        if table != self.table {
            return Err(EtlError::schema_mismatch(format!(
                "expected table '{}', file contains '{}'",
                self.table, table
            )));
        }

        let col_count = read_u32(&mut reader)? as usize;
        let mut columns = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            let name = read_string16(&mut reader)?;
            let mut tag = [0u8; 1];
            reader.read_exact(&mut tag)?;
            columns.push((name, tag[0]));
        }

        let names: Vec<String> = columns.iter().map(|(n, _)| n.clone()).collect();
        self.schema.check_header(&names)?;

        let row_count = read_u64(&mut reader)?;

        Ok(Box::new(StatTableChunkIter {
            reader,
            columns,
            wanted: self
                .schema
                .fields()
                .iter()
                .map(|f| (f.name.clone(), f.ty, f.required))
                .collect(),
            rows_remaining: row_count,
            chunk_size: descriptor.chunk_size.max(1),
            max_error_fraction: descriptor.max_error_fraction,
            next_chunk_index: 0,
            errors: DecodeErrorLog::default(),
        }))
    }
}

struct StatTableChunkIter {
    reader: BufReader<File>,
    columns: Vec<(String, u8)>,
    wanted: Vec<(String, FieldType, bool)>,
    rows_remaining: u64,
    chunk_size: usize,
    max_error_fraction: f64,
    next_chunk_index: u64,
    errors: DecodeErrorLog,
}

impl std::fmt::Debug for StatTableChunkIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatTableChunkIter")
            .field("rows_remaining", &self.rows_remaining)
            .field("next_chunk_index", &self.next_chunk_index)
            .finish_non_exhaustive()
    }
}

impl StatTableChunkIter {
    fn read_row(&mut self) -> Result<Record, EtlError> {
        let mut record = Record::new();
        for i in 0..self.columns.len() {
            let (name, tag) = self.columns[i].clone();
            let mut presence = [0u8; 1];
            self.reader.read_exact(&mut presence)?;
            let value = if presence[0] == 0 {
                FieldValue::Null
            } else {
                match tag {
                    TAG_STR => FieldValue::Str(read_string32(&mut self.reader)?),
                    TAG_INT => FieldValue::Int(read_i64(&mut self.reader)?),
                    TAG_FLOAT => FieldValue::Float(read_f64(&mut self.reader)?),
                    TAG_DATE => {
                        let days = read_i32(&mut self.reader)?;
                        let date = stat_epoch()
                            .checked_add_signed(chrono::Duration::days(days as i64))
                            .ok_or_else(|| EtlError::row_decode(format!("date offset {} out of range", days)))?;
                        FieldValue::Date(date)
                    }
                    other => {
                        // A tag outside the format is container corruption;
                        // the stream cannot realign past this point.
                        return Err(EtlError::io_error(format!("unknown type tag {}", other)));
                    }
                }
            };
            // Projection: only schema fields are kept.
            if let Some((wanted_name, wanted_ty, _)) = self.wanted.iter().find(|(n, _, _)| *n == name) {
                let coerced = reconcile(value, *wanted_ty)?;
                record.set(wanted_name.clone(), coerced);
            }
        }
        for (name, _, required) in &self.wanted {
            if *required && record.is_null_or_missing(name) {
                return Err(EtlError::row_decode(format!("required field '{}' empty", name)));
            }
        }
        Ok(record)
    }
}

/// Coerces a stored value into the schema's declared type when they differ
/// (e.g. an int column read into a float field).
fn reconcile(value: FieldValue, ty: FieldType) -> Result<FieldValue, EtlError> {
    let ok = match (&value, ty) {
        (FieldValue::Null, _) => true,
        (FieldValue::Str(_), FieldType::Str) => true,
        (FieldValue::Int(_), FieldType::Int) => true,
        (FieldValue::Float(_), FieldType::Float) => true,
        (FieldValue::Date(_), FieldType::Date) => true,
        (FieldValue::Int(i), FieldType::Float) => return Ok(FieldValue::Float(*i as f64)),
        (FieldValue::Str(s), FieldType::Bool) => return FieldValue::coerce(s, FieldType::Bool),
        _ => false,
    };
    if ok {
        Ok(value)
    } else {
        Err(EtlError::row_decode(format!(
            "stored value {:?} incompatible with declared type {:?}",
            value, ty
        )))
    }
}

#[async_trait]
impl ChunkIterator for StatTableChunkIter {
    async fn next_chunk(&mut self) -> Result<Option<RecordChunk>, EtlError> {
        let mut records = Vec::with_capacity(self.chunk_size);
        while records.len() < self.chunk_size && self.rows_remaining > 0 {
            self.rows_remaining -= 1;
            match self.read_row() {
                Ok(record) => {
                    self.errors.record_ok();
                    records.push(record);
                }
                Err(EtlError::RowDecode(msg)) => {
                    self.errors.record_failure(msg);
                }
                // Anything else (IO, truncation) is not row-recoverable.
                Err(e) => return Err(e),
            }
        }

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

/// Writer for the container, used by the acquisition tooling and tests.
pub struct StatTableWriter {
    writer: std::io::BufWriter<File>,
    columns: Vec<(String, u8)>,
    rows_written: u64,
    declared_rows: u64,
}

impl StatTableWriter {
    pub fn create(
        path: &Path,
        table: &str,
        columns: &[(String, FieldType)],
        row_count: u64,
    ) -> Result<Self, EtlError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        write_string16(&mut writer, table)?;
        writer.write_all(&(columns.len() as u32).to_le_bytes())?;
        let mut tagged = Vec::with_capacity(columns.len());
        for (name, ty) in columns {
            write_string16(&mut writer, name)?;
            let tag = type_tag(*ty);
            writer.write_all(&[tag])?;
            tagged.push((name.clone(), tag));
        }
        writer.write_all(&row_count.to_le_bytes())?;

        Ok(Self {
            writer,
            columns: tagged,
            rows_written: 0,
            declared_rows: row_count,
        })
    }

    pub fn write_row(&mut self, record: &Record) -> Result<(), EtlError> {
        for (name, tag) in &self.columns {
            match record.get(name).unwrap_or(&FieldValue::Null) {
                FieldValue::Null => self.writer.write_all(&[0u8])?,
                value => {
                    self.writer.write_all(&[1u8])?;
                    match (tag, value) {
                        (&TAG_STR, FieldValue::Str(s)) => write_string32(&mut self.writer, s)?,
                        (&TAG_STR, FieldValue::Bool(b)) => {
                            write_string32(&mut self.writer, if *b { "true" } else { "false" })?
                        }
                        (&TAG_INT, FieldValue::Int(i)) => self.writer.write_all(&i.to_le_bytes())?,
                        (&TAG_FLOAT, FieldValue::Float(f)) => self.writer.write_all(&f.to_le_bytes())?,
                        (&TAG_DATE, FieldValue::Date(d)) => {
                            let days = d.signed_duration_since(stat_epoch()).num_days() as i32;
                            self.writer.write_all(&days.to_le_bytes())?;
                        }
                        (tag, value) => {
                            return Err(EtlError::internal_error(format!(
                                "value {:?} does not fit column tag {}",
                                value, tag
                            )));
                        }
                    }
                }
            }
        }
        self.rows_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), EtlError> {
        if self.rows_written != self.declared_rows {
            return Err(EtlError::internal_error(format!(
                "declared {} rows, wrote {}",
                self.declared_rows, self.rows_written
            )));
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn read_u16(r: &mut impl Read) -> Result<u16, EtlError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> Result<u32, EtlError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(r: &mut impl Read) -> Result<i32, EtlError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> Result<u64, EtlError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(r: &mut impl Read) -> Result<i64, EtlError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f64(r: &mut impl Read) -> Result<f64, EtlError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_string16(r: &mut impl Read) -> Result<String, EtlError> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| EtlError::row_decode("non-utf8 string"))
}

fn read_string32(r: &mut impl Read) -> Result<String, EtlError> {
    let len = read_u32(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| EtlError::row_decode("non-utf8 string"))
}

fn write_string16(w: &mut impl Write, s: &str) -> Result<(), EtlError> {
    w.write_all(&(s.len() as u16).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_string32(w: &mut impl Write, s: &str) -> Result<(), EtlError> {
    w.write_all(&(s.len() as u32).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_graph_domain::value_objects::FieldDef;

    fn assignment_schema() -> RecordSchema {
        RecordSchema::new(vec![
            FieldDef::new("rf_id", FieldType::Str, true),
            FieldDef::new("record_dt", FieldType::Date, false),
            FieldDef::new("employer_assign", FieldType::Bool, false),
        ])
    }

    fn write_fixture(path: &Path) {
        let columns = vec![
            ("rf_id".to_string(), FieldType::Str),
            ("record_dt".to_string(), FieldType::Date),
            ("employer_assign".to_string(), FieldType::Str),
            ("extra_col".to_string(), FieldType::Int),
        ];
        let mut writer = StatTableWriter::create(path, "assignment", &columns, 2).unwrap();
        writer
            .write_row(
                &Record::new()
                    .with("rf_id", FieldValue::Str("12345-678".into()))
                    .with(
                        "record_dt",
                        FieldValue::Date(NaiveDate::from_ymd_opt(2015, 7, 4).unwrap()),
                    )
                    .with("employer_assign", FieldValue::Str("true".into()))
                    .with("extra_col", FieldValue::Int(9)),
            )
            .unwrap();
        writer
            .write_row(&Record::new().with("rf_id", FieldValue::Str("12345-679".into())))
            .unwrap();
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn test_round_trip_with_projection_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assignment.stb");
        write_fixture(&path);

        let source = StatTableSource::new(assignment_schema(), "assignment", RetryConfig::default());
        let mut iter = source
            .open(&SourceDescriptor::new("assignments", &path))
            .await
            .unwrap();

        let chunk = iter.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 2);
        let first = &chunk.records[0];
        assert_eq!(first.get_str("rf_id"), Some("12345-678"));
        assert_eq!(first.get_date("record_dt").unwrap().to_string(), "2015-07-04");
        assert_eq!(first.get("employer_assign"), Some(&FieldValue::Bool(true)));
        // Projection drops undeclared columns.
        assert!(first.get("extra_col").is_none());

        assert!(chunk.records[1].is_null_or_missing("record_dt"));
        assert!(iter.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_table_name_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assignee.stb");
        write_fixture(&path);

        let source = StatTableSource::new(assignment_schema(), "assignee", RetryConfig::default());
        let err = source
            .open(&SourceDescriptor::new("assignments", &path))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch(_)));
    }

    #[test]
    fn test_five_table_manifest() {
        assert_eq!(ASSIGNMENT_TABLES.len(), 5);
        assert!(ASSIGNMENT_TABLES.contains(&"documentid"));
    }
}
