// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Assignment Five-Table Join
//!
//! The patent assignment drop is five statistical-binary tables sharing the
//! reel/frame id: `assignment` (the spine), `assignment_conveyance`,
//! `assignee`, `assignor`, and `documentid`. Each table is its own stream;
//! this asset loads the four side tables into rf-keyed maps, then streams
//! the spine and emits one joined record per assignment.
//!
//! Patent identity comes from `documentid`: the grant document number when
//! present, otherwise a synthetic pre-grant key from the application number.

use crate::application::assets::schemas;
use crate::infrastructure::extractors::{StatTableSource, ASSIGNMENT_TABLES};
use crate::infrastructure::runtime::{AssetContext, ChunkSink, Materializer};
use crate::infrastructure::storage::PathResolver;
use async_trait::async_trait;
use sbir_graph_domain::entities::PatentIdentity;
use sbir_graph_domain::services::{ChunkIterator, RecordSource, SourceDescriptor};
use sbir_graph_domain::value_objects::{
    FieldDef, FieldType, FieldValue, Record, RecordChunk, RecordSchema,
};
use sbir_graph_domain::EtlError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

fn spine_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("rf_id", FieldType::Str, true),
        FieldDef::new("record_dt", FieldType::Date, true),
        FieldDef::new("execution_dt", FieldType::Date, false),
    ])
}

fn conveyance_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("rf_id", FieldType::Str, true),
        FieldDef::new("convey_text", FieldType::Str, false),
        FieldDef::new("employer_assign", FieldType::Bool, false),
    ])
}

fn party_schema(name_field: &str) -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("rf_id", FieldType::Str, true),
        FieldDef::new(name_field, FieldType::Str, false),
    ])
}

fn documentid_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("rf_id", FieldType::Str, true),
        FieldDef::new("grant_doc_num", FieldType::Str, false),
        FieldDef::new("appno_doc_num", FieldType::Str, false),
    ])
}

/// Joins the five-table drop into one assignment stream.
pub struct AssignmentJoinMaterializer {
    inbox_subdir: String,
}

impl AssignmentJoinMaterializer {
    pub fn new(inbox_subdir: impl Into<String>) -> Self {
        Self {
            inbox_subdir: inbox_subdir.into(),
        }
    }

    async fn open_table(
        &self,
        ctx: &AssetContext,
        drop_dir: &Path,
        table: &str,
        schema: RecordSchema,
    ) -> Result<Box<dyn ChunkIterator>, EtlError> {
        let source = StatTableSource::new(schema, table, ctx.config.sources.io_retry.clone());
        let descriptor = SourceDescriptor {
            source_name: format!("assignments/{}", table),
            path: drop_dir.join(format!("{}.stb", table)),
            format: None,
            chunk_size: ctx.chunk_size,
            max_error_fraction: ctx.config.sources.max_error_fraction,
        };
        source.open(&descriptor).await
    }

    /// Drains a side table into an rf-keyed map, appending on collisions
    /// (a reel/frame can carry several assignees or assignors).
    async fn load_side_table(
        &self,
        ctx: &AssetContext,
        drop_dir: &Path,
        table: &str,
        schema: RecordSchema,
    ) -> Result<HashMap<String, Vec<Record>>, EtlError> {
        let mut iter = self.open_table(ctx, drop_dir, table, schema).await?;
        let mut map: HashMap<String, Vec<Record>> = HashMap::new();
        while let Some(chunk) = iter.next_chunk().await? {
            ctx.check_cancelled()?;
            for record in chunk.records {
                if let Some(rf) = record.get_str("rf_id") {
                    map.entry(rf.to_string()).or_default().push(record);
                }
            }
        }
        Ok(map)
    }
}

fn joined_names(records: Option<&Vec<Record>>, field: &str) -> String {
    records
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.get_str(field))
                .collect::<Vec<_>>()
                .join(";")
        })
        .unwrap_or_default()
}

fn patent_key(documentid: Option<&Vec<Record>>) -> Option<String> {
    let rows = documentid?;
    // Prefer a grant number anywhere in the rf group.
    for row in rows {
        if let Some(grant) = row.get_str("grant_doc_num") {
            return Some(PatentIdentity::Grant(grant.to_string()).graph_key());
        }
    }
    rows.iter()
        .find_map(|row| row.get_str("appno_doc_num"))
        .map(|app| PatentIdentity::PreGrant(app.to_string()).graph_key())
}

#[async_trait]
impl Materializer for AssignmentJoinMaterializer {
    fn schema(&self) -> RecordSchema {
        schemas::assignment_schema()
    }

    async fn materialize(
        &self,
        ctx: &AssetContext,
        sink: &mut dyn ChunkSink,
    ) -> Result<BTreeMap<String, f64>, EtlError> {
        let prefix = ctx.config.sources.inbox.join(&self.inbox_subdir);
        let drop_dir: PathBuf = PathResolver::latest_dated(&prefix).await?.ok_or_else(|| {
            EtlError::source_unavailable(format!("no dated assignment drop under {}", prefix.display()))
        })?;

        debug_assert_eq!(ASSIGNMENT_TABLES.len(), 5);

        // Side tables load concurrently; the spine streams afterwards.
        let (conveyances, assignees, assignors, documentids) = futures::try_join!(
            self.load_side_table(ctx, &drop_dir, "assignment_conveyance", conveyance_schema()),
            self.load_side_table(ctx, &drop_dir, "assignee", party_schema("ee_name")),
            self.load_side_table(ctx, &drop_dir, "assignor", party_schema("or_name")),
            self.load_side_table(ctx, &drop_dir, "documentid", documentid_schema()),
        )?;

        let mut spine = self.open_table(ctx, &drop_dir, "assignment", spine_schema()).await?;
        let mut out_index = 0u64;
        let mut joined = 0u64;
        let mut missing_patent = 0u64;
        while let Some(chunk) = spine.next_chunk().await? {
            ctx.check_cancelled()?;
            let mut records = Vec::with_capacity(chunk.len());
            for row in &chunk.records {
                let Some(rf_id) = row.get_str("rf_id") else {
                    continue;
                };
                let Some(patent) = patent_key(documentids.get(rf_id)) else {
                    // An assignment must relate to a patent; without a
                    // document id there is nothing to hang it on.
                    missing_patent += 1;
                    continue;
                };

                let conveyance = conveyances.get(rf_id).and_then(|rows| rows.first());
                let mut record = Record::new();
                record.set("rf_id", FieldValue::Str(rf_id.to_string()));
                record.set("patent_key", FieldValue::Str(patent));
                record.set(
                    "conveyance_text",
                    conveyance
                        .and_then(|c| c.get_str("convey_text"))
                        .map(|s| FieldValue::Str(s.to_string()))
                        .unwrap_or(FieldValue::Null),
                );
                record.set(
                    "record_dt",
                    row.get_date("record_dt").map(FieldValue::Date).unwrap_or(FieldValue::Null),
                );
                record.set(
                    "execution_dt",
                    row.get_date("execution_dt").map(FieldValue::Date).unwrap_or(FieldValue::Null),
                );
                record.set(
                    "employer_assign",
                    FieldValue::Bool(
                        conveyance
                            .and_then(|c| c.get("employer_assign"))
                            .map(|v| matches!(v, FieldValue::Bool(true)))
                            .unwrap_or(false),
                    ),
                );
                record.set("assignors", FieldValue::Str(joined_names(assignors.get(rf_id), "or_name")));
                record.set("assignees", FieldValue::Str(joined_names(assignees.get(rf_id), "ee_name")));
                records.push(record);
                joined += 1;
            }
            if !records.is_empty() {
                sink.write_chunk(RecordChunk::new(out_index, records)).await?;
                out_index += 1;
            }
        }

        let mut metrics = BTreeMap::new();
        metrics.insert("assignments_joined".to_string(), joined as f64);
        metrics.insert("missing_patent_ref".to_string(), missing_patent as f64);
        Ok(metrics)
    }
}
