// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SBIR Graph Domain
//!
//! Pure domain layer for the SBIR graph ETL pipeline: the entities of the
//! funding graph (awards, organizations, contracts, patents, assignment
//! chains, taxonomy categories), validated value objects (identifiers,
//! confidence, fingerprints, typed records), domain services (name/address
//! normalization, similarity, validation rules), and the ports the
//! infrastructure layer implements (record sources, graph repository, text
//! classification).
//!
//! This crate has no IO of its own. Everything here is deterministic and
//! reusable: the enrichment engine, asset runtime, and graph loader in the
//! application crate are built entirely against these types.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::{
    Award, EnrichmentResult, EnrichmentSource, Organization, Patent, PatentAssignment, Run,
};
pub use error::EtlError;
pub use value_objects::{Confidence, Fingerprint, Record, RecordChunk, RecordSchema, RunId};
