// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects
//!
//! Immutable, validated domain values. Identifier formats are enforced at
//! construction so the rest of the system never handles a malformed supplier
//! id, NAICS code, or confidence score.

pub mod award_phase;
pub mod confidence;
pub mod fingerprint;
pub mod legacy_id;
pub mod naics_code;
pub mod organization_id;
pub mod record;
pub mod run_id;
pub mod supplier_id;

pub use award_phase::AwardPhase;
pub use confidence::{Confidence, ConfidenceBand};
pub use fingerprint::Fingerprint;
pub use legacy_id::LegacyId;
pub use naics_code::NaicsCode;
pub use organization_id::OrganizationId;
pub use record::{FieldDef, FieldType, FieldValue, Record, RecordChunk, RecordSchema};
pub use run_id::RunId;
pub use supplier_id::SupplierId;
