// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Asset Schemas and Record Conversions
//!
//! The declared schemas of every pipeline asset and the conversions between
//! typed records (what artifacts store) and domain entities (what the
//! engine and loader consume). Conversions are total over validated input:
//! a record that passed validation always converts, and conversion failures
//! on unvalidated input surface as row decode errors.

use sbir_graph_domain::entities::{Award, AwardCompanyRef, ConveyanceType, FederalContract, PatentAssignment};
use sbir_graph_domain::value_objects::{
    AwardPhase, FieldDef, FieldType, FieldValue, LegacyId, NaicsCode, Record, RecordSchema, SupplierId,
};
use sbir_graph_domain::EtlError;

/// Raw awards source schema (delimited).
pub fn award_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("award_id", FieldType::Str, true),
        FieldDef::new("company_name", FieldType::Str, true),
        FieldDef::new("supplier_id", FieldType::Str, false),
        FieldDef::new("legacy_id", FieldType::Str, false),
        FieldDef::new("street", FieldType::Str, false),
        FieldDef::new("city", FieldType::Str, false),
        FieldDef::new("state", FieldType::Str, false),
        FieldDef::new("postcode", FieldType::Str, false),
        FieldDef::new("agency", FieldType::Str, true),
        FieldDef::new("program", FieldType::Str, true),
        FieldDef::new("phase", FieldType::Str, true),
        FieldDef::new("amount", FieldType::Float, true),
        FieldDef::new("award_date", FieldType::Date, true),
        FieldDef::new("naics", FieldType::Str, false),
        FieldDef::new("abstract", FieldType::Str, false),
    ])
}

/// Supplier registry reference schema (delimited).
pub fn supplier_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("supplier_id", FieldType::Str, false),
        FieldDef::new("legacy_id", FieldType::Str, false),
        FieldDef::new("legal_name", FieldType::Str, true),
        FieldDef::new("state", FieldType::Str, false),
        FieldDef::new("postcode", FieldType::Str, false),
    ])
}

/// Federal contracts dump schema (projected columns). Rows without an
/// action date cannot become contract entities and are dropped at decode.
pub fn contract_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("piid", FieldType::Str, true),
        FieldDef::new("modification", FieldType::Str, false),
        FieldDef::new("recipient_uei", FieldType::Str, false),
        FieldDef::new("recipient_duns", FieldType::Str, false),
        FieldDef::new("recipient_name", FieldType::Str, true),
        FieldDef::new("amount", FieldType::Float, false),
        FieldDef::new("action_date", FieldType::Date, true),
        FieldDef::new("psc", FieldType::Str, false),
    ])
}

/// Column order of the contracts table inside the SQL dump.
pub fn contract_dump_columns() -> Vec<String> {
    [
        "piid",
        "modification",
        "recipient_uei",
        "recipient_duns",
        "recipient_name",
        "amount",
        "action_date",
        "psc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Joined assignment schema produced by the five-table extractor asset.
pub fn assignment_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("rf_id", FieldType::Str, true),
        FieldDef::new("patent_key", FieldType::Str, true),
        FieldDef::new("conveyance_text", FieldType::Str, false),
        FieldDef::new("record_dt", FieldType::Date, true),
        FieldDef::new("execution_dt", FieldType::Date, false),
        FieldDef::new("employer_assign", FieldType::Bool, false),
        FieldDef::new("assignors", FieldType::Str, false),
        FieldDef::new("assignees", FieldType::Str, false),
    ])
}

/// Chain asset schema: assignments with links and chain metadata.
pub fn chain_schema() -> RecordSchema {
    let mut fields = assignment_schema().fields().to_vec();
    fields.push(FieldDef::new("predecessor_rf_id", FieldType::Str, false));
    fields.push(FieldDef::new("chain_span_start", FieldType::Date, false));
    fields.push(FieldDef::new("chain_span_end", FieldType::Date, false));
    fields.push(FieldDef::new("current_owner", FieldType::Str, false));
    fields.push(FieldDef::new("last_known_assignee", FieldType::Str, false));
    RecordSchema::new(fields)
}

/// Enriched award asset schema: the award plus winning results and evidence.
pub fn enriched_award_schema() -> RecordSchema {
    let mut fields = award_schema().fields().to_vec();
    fields.push(FieldDef::new("recipient_ref", FieldType::Str, false));
    fields.push(FieldDef::new("recipient_confidence", FieldType::Float, false));
    fields.push(FieldDef::new("recipient_source", FieldType::Str, false));
    fields.push(FieldDef::new("recipient_method", FieldType::Str, false));
    fields.push(FieldDef::new("recipient_evidence", FieldType::Str, false));
    fields.push(FieldDef::new("naics_enriched", FieldType::Str, false));
    fields.push(FieldDef::new("naics_confidence", FieldType::Float, false));
    fields.push(FieldDef::new("naics_source", FieldType::Str, false));
    fields.push(FieldDef::new("naics_evidence", FieldType::Str, false));
    RecordSchema::new(fields)
}

/// Categorization asset schema.
pub fn category_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("award_id", FieldType::Str, true),
        FieldDef::new("primary_category", FieldType::Str, true),
        FieldDef::new("supporting_categories", FieldType::Str, false),
    ])
}

/// Company rollup asset schema.
pub fn company_metrics_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("organization_id", FieldType::Str, true),
        FieldDef::new("award_count", FieldType::Int, true),
        FieldDef::new("total_funding", FieldType::Float, true),
        FieldDef::new("phase_mix", FieldType::Str, false),
        FieldDef::new("category_distribution", FieldType::Str, false),
        FieldDef::new("first_award_date", FieldType::Date, false),
        FieldDef::new("last_award_date", FieldType::Date, false),
        FieldDef::new("sector_code", FieldType::Str, false),
        FieldDef::new("sector_name", FieldType::Str, false),
    ])
}

/// Load summary schema (the `loaded` stage artifact).
pub fn load_summary_schema() -> RecordSchema {
    RecordSchema::new(vec![
        FieldDef::new("target", FieldType::Str, true),
        FieldDef::new("created", FieldType::Int, true),
        FieldDef::new("updated", FieldType::Int, true),
        FieldDef::new("constraint_skipped", FieldType::Int, true),
        FieldDef::new("failed", FieldType::Int, true),
    ])
}

fn opt_str(record: &Record, field: &str) -> Option<String> {
    record.get_str(field).map(str::to_string)
}

/// Converts a validated contract record into the entity. A missing
/// modification number means the base award action (`"0"`).
pub fn contract_from_record(record: &Record) -> Result<FederalContract, EtlError> {
    Ok(FederalContract {
        piid: record
            .get_str("piid")
            .ok_or_else(|| EtlError::row_decode("piid missing"))?
            .to_string(),
        modification: record.get_str("modification").unwrap_or("0").to_string(),
        recipient_supplier_id: record
            .get_str("recipient_uei")
            .and_then(|s| SupplierId::parse(s).ok()),
        recipient_legacy_id: record
            .get_str("recipient_duns")
            .and_then(|s| LegacyId::parse(s).ok()),
        recipient_name: record
            .get_str("recipient_name")
            .ok_or_else(|| EtlError::row_decode("recipient_name missing"))?
            .to_string(),
        amount: record.get_float("amount").unwrap_or(0.0),
        action_date: record
            .get_date("action_date")
            .ok_or_else(|| EtlError::row_decode("action_date missing"))?,
        psc: opt_str(record, "psc"),
    })
}

/// Converts a validated award record into the entity.
pub fn award_from_record(record: &Record) -> Result<Award, EtlError> {
    let award_id = record
        .get_str("award_id")
        .ok_or_else(|| EtlError::row_decode("award_id missing"))?
        .to_string();
    let phase = AwardPhase::parse(
        record
            .get_str("phase")
            .ok_or_else(|| EtlError::row_decode("phase missing"))?,
    )?;
    let award_date = record
        .get_date("award_date")
        .ok_or_else(|| EtlError::row_decode("award_date missing"))?;
    let amount = record
        .get_float("amount")
        .ok_or_else(|| EtlError::row_decode("amount missing"))?;

    Ok(Award {
        award_id,
        company: AwardCompanyRef {
            raw_name: record
                .get_str("company_name")
                .ok_or_else(|| EtlError::row_decode("company_name missing"))?
                .to_string(),
            supplier_id: record.get_str("supplier_id").and_then(|s| SupplierId::parse(s).ok()),
            legacy_id: record.get_str("legacy_id").and_then(|s| LegacyId::parse(s).ok()),
            street: opt_str(record, "street"),
            city: opt_str(record, "city"),
            state: opt_str(record, "state"),
            postcode: opt_str(record, "postcode"),
        },
        agency: record
            .get_str("agency")
            .ok_or_else(|| EtlError::row_decode("agency missing"))?
            .to_string(),
        program: record
            .get_str("program")
            .ok_or_else(|| EtlError::row_decode("program missing"))?
            .to_string(),
        phase,
        amount,
        award_date,
        naics: record.get_str("naics").and_then(|s| NaicsCode::parse(s).ok()),
        abstract_text: opt_str(record, "abstract"),
    })
}

/// Serializes an award back into its record form.
pub fn award_to_record(award: &Award) -> Record {
    let mut record = Record::new();
    record.set("award_id", FieldValue::Str(award.award_id.clone()));
    record.set("company_name", FieldValue::Str(award.company.raw_name.clone()));
    record.set(
        "supplier_id",
        award
            .company
            .supplier_id
            .as_ref()
            .map(|s| FieldValue::Str(s.as_str().to_string()))
            .unwrap_or(FieldValue::Null),
    );
    record.set(
        "legacy_id",
        award
            .company
            .legacy_id
            .as_ref()
            .map(|l| FieldValue::Str(l.as_str().to_string()))
            .unwrap_or(FieldValue::Null),
    );
    record.set("street", opt_field(&award.company.street));
    record.set("city", opt_field(&award.company.city));
    record.set("state", opt_field(&award.company.state));
    record.set("postcode", opt_field(&award.company.postcode));
    record.set("agency", FieldValue::Str(award.agency.clone()));
    record.set("program", FieldValue::Str(award.program.clone()));
    record.set("phase", FieldValue::Str(award.phase.as_str().to_string()));
    record.set("amount", FieldValue::Float(award.amount));
    record.set("award_date", FieldValue::Date(award.award_date));
    record.set(
        "naics",
        award
            .naics
            .as_ref()
            .map(|n| FieldValue::Str(n.as_str().to_string()))
            .unwrap_or(FieldValue::Null),
    );
    record.set("abstract", opt_field(&award.abstract_text));
    record
}

fn opt_field(value: &Option<String>) -> FieldValue {
    value
        .as_ref()
        .map(|s| FieldValue::Str(s.clone()))
        .unwrap_or(FieldValue::Null)
}

/// Converts a joined assignment record into the entity. The `assignors` and
/// `assignees` cells carry semicolon-joined lists from the join step.
pub fn assignment_from_record(record: &Record) -> Result<PatentAssignment, EtlError> {
    let split = |field: &str| -> Vec<String> {
        record
            .get_str(field)
            .map(|s| {
                s.split(';')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    Ok(PatentAssignment {
        rf_id: record
            .get_str("rf_id")
            .ok_or_else(|| EtlError::row_decode("rf_id missing"))?
            .to_string(),
        conveyance: ConveyanceType::from_conveyance_text(record.get_str("conveyance_text").unwrap_or("")),
        execution_date: record.get_date("execution_dt"),
        record_date: record
            .get_date("record_dt")
            .ok_or_else(|| EtlError::row_decode("record_dt missing"))?,
        employer_assignment: matches!(record.get("employer_assign"), Some(FieldValue::Bool(true))),
        patent_key: record
            .get_str("patent_key")
            .ok_or_else(|| EtlError::row_decode("patent_key missing"))?
            .to_string(),
        assignors: split("assignors"),
        assignees: split("assignees"),
        predecessor_rf_id: opt_str(record, "predecessor_rf_id"),
    })
}

/// Serializes an assignment (with chain links) into the chain-asset record.
pub fn assignment_to_chain_record(
    assignment: &PatentAssignment,
    span: (chrono::NaiveDate, chrono::NaiveDate),
    current_owner: &Option<String>,
    last_known_assignee: &Option<String>,
) -> Record {
    let mut record = Record::new();
    record.set("rf_id", FieldValue::Str(assignment.rf_id.clone()));
    record.set("patent_key", FieldValue::Str(assignment.patent_key.clone()));
    record.set(
        "conveyance_text",
        FieldValue::Str(assignment.conveyance.as_str().to_string()),
    );
    record.set("record_dt", FieldValue::Date(assignment.record_date));
    record.set(
        "execution_dt",
        assignment
            .execution_date
            .map(FieldValue::Date)
            .unwrap_or(FieldValue::Null),
    );
    record.set("employer_assign", FieldValue::Bool(assignment.employer_assignment));
    record.set("assignors", FieldValue::Str(assignment.assignors.join(";")));
    record.set("assignees", FieldValue::Str(assignment.assignees.join(";")));
    record.set(
        "predecessor_rf_id",
        assignment
            .predecessor_rf_id
            .as_ref()
            .map(|p| FieldValue::Str(p.clone()))
            .unwrap_or(FieldValue::Null),
    );
    record.set("chain_span_start", FieldValue::Date(span.0));
    record.set("chain_span_end", FieldValue::Date(span.1));
    record.set("current_owner", opt_field(current_owner));
    record.set("last_known_assignee", opt_field(last_known_assignee));
    record
}
