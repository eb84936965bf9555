// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Typed Records and Chunks
//!
//! Every extractor converts its source rows into `Record`s: named-field maps
//! with declared types. The schema travels separately (`RecordSchema`) and is
//! checked once at header-read time; rows that fail coercion become
//! `RowDecode` errors, not panics.
//!
//! ## Chunks
//!
//! Records stream through the pipeline in bounded, ordered batches
//! (`RecordChunk`). Each chunk carries a deterministic index assigned at
//! extraction so downstream stages can parallelize and later merge without
//! inventing their own ordering.
//!
//! ## Determinism
//!
//! `Record` stores fields in a `BTreeMap` so serialization order is stable,
//! which matters for schema digests and artifact fingerprints.

use crate::EtlError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Str,
    Int,
    Float,
    Bool,
    Date,
}

/// A typed field value. `Null` is an explicit state, not an absent key, so
/// completeness rules can distinguish "column missing" from "value empty".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldValue::Str(_) => Some(FieldType::Str),
            FieldValue::Int(_) => Some(FieldType::Int),
            FieldValue::Float(_) => Some(FieldType::Float),
            FieldValue::Bool(_) => Some(FieldType::Bool),
            FieldValue::Date(_) => Some(FieldType::Date),
            FieldValue::Null => None,
        }
    }

    /// Coerces a raw string cell into the declared type. Empty strings decode
    /// to `Null`.
    pub fn coerce(raw: &str, ty: FieldType) -> Result<FieldValue, EtlError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(FieldValue::Null);
        }
        match ty {
            FieldType::Str => Ok(FieldValue::Str(trimmed.to_string())),
            FieldType::Int => trimmed
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| EtlError::row_decode(format!("'{}' is not an integer", trimmed))),
            FieldType::Float => trimmed
                .replace(['$', ','], "")
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| EtlError::row_decode(format!("'{}' is not a number", trimmed))),
            FieldType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "y" | "yes" => Ok(FieldValue::Bool(true)),
                "false" | "f" | "0" | "n" | "no" => Ok(FieldValue::Bool(false)),
                _ => Err(EtlError::row_decode(format!("'{}' is not a boolean", trimmed))),
            },
            FieldType::Date => {
                // Source files disagree on date formats; accept the three we see.
                for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"] {
                    if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
                        return Ok(FieldValue::Date(d));
                    }
                }
                Err(EtlError::row_decode(format!("'{}' is not a date", trimmed)))
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d),
            FieldValue::Null => write!(f, ""),
        }
    }
}

/// Declaration of a single schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            required,
        }
    }
}

/// Declared schema of a record stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Verifies that the header columns cover every declared field.
    /// Extra columns in the source are tolerated and ignored.
    pub fn check_header(&self, columns: &[String]) -> Result<(), EtlError> {
        for field in &self.fields {
            if !columns.iter().any(|c| c == &field.name) {
                return Err(EtlError::schema_mismatch(format!(
                    "required column '{}' missing from header",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Stable digest over field names and types, recorded in artifact
    /// sidecars so consumers can detect layout drift.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for field in &self.fields {
            hasher.update(field.name.as_bytes());
            hasher.update([b':']);
            hasher.update(format!("{:?}", field.ty).as_bytes());
            hasher.update([b';']);
        }
        hex::encode(hasher.finalize())
    }
}

/// A single typed record. Field order is stable (sorted by name).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Non-null string accessor; `None` when absent, null, or another type.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(FieldValue::as_str)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(FieldValue::as_float)
    }

    pub fn get_date(&self, name: &str) -> Option<NaiveDate> {
        self.values.get(name).and_then(FieldValue::as_date)
    }

    pub fn is_null_or_missing(&self, name: &str) -> bool {
        self.values.get(name).map(FieldValue::is_null).unwrap_or(true)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A bounded, ordered batch of records with a deterministic position in the
/// source stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordChunk {
    pub index: u64,
    pub records: Vec<Record>,
}

impl RecordChunk {
    pub fn new(index: u64, records: Vec<Record>) -> Self {
        Self { index, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_money_string() {
        let v = FieldValue::coerce("$150,000.00", FieldType::Float).unwrap();
        assert_eq!(v.as_float(), Some(150000.0));
    }

    #[test]
    fn test_coerce_date_formats() {
        for raw in ["2021-06-30", "06/30/2021", "20210630"] {
            let v = FieldValue::coerce(raw, FieldType::Date).unwrap();
            assert_eq!(v.as_date().unwrap().to_string(), "2021-06-30");
        }
    }

    #[test]
    fn test_empty_coerces_to_null() {
        assert!(FieldValue::coerce("  ", FieldType::Int).unwrap().is_null());
    }

    #[test]
    fn test_header_check_flags_missing_column() {
        let schema = RecordSchema::new(vec![
            FieldDef::new("award_id", FieldType::Str, true),
            FieldDef::new("amount", FieldType::Float, true),
        ]);
        let ok = vec!["award_id".to_string(), "amount".to_string(), "extra".to_string()];
        assert!(schema.check_header(&ok).is_ok());
        let bad = vec!["award_id".to_string()];
        assert!(matches!(schema.check_header(&bad), Err(EtlError::SchemaMismatch(_))));
    }

    #[test]
    fn test_schema_digest_stable_and_sensitive() {
        let a = RecordSchema::new(vec![FieldDef::new("a", FieldType::Str, true)]);
        let b = RecordSchema::new(vec![FieldDef::new("a", FieldType::Str, true)]);
        let c = RecordSchema::new(vec![FieldDef::new("a", FieldType::Int, true)]);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }
}
