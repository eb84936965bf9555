// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Entities
//!
//! The core entities of the funding graph: awards, organizations, contracts,
//! patents and their assignment chains, taxonomy categories, enrichment
//! results, artifacts, and runs. Ownership follows the component design: the
//! asset runtime owns artifacts and runs, the enrichment engine owns
//! enrichment results and borrows awards/organizations, and the graph loader
//! is the sole mutator of the persisted graph.

pub mod artifact;
pub mod award;
pub mod cet_area;
pub mod enrichment_record;
pub mod federal_contract;
pub mod organization;
pub mod patent;
pub mod patent_assignment;
pub mod run;

pub use artifact::{ArtifactMeta, CheckResult, CheckSeverity};
pub use award::{Award, AwardCompanyRef};
pub use cet_area::CetArea;
pub use enrichment_record::{AttemptOutcome, EnrichmentResult, EnrichmentSource, StrategyAttempt};
pub use federal_contract::FederalContract;
pub use organization::{Address, MergeProvenance, Organization, OrganizationType};
pub use patent::{Patent, PatentIdentity};
pub use patent_assignment::{ConveyanceType, PatentAssignment};
pub use run::{AssetOutcome, Run, RunMetrics, RunMode};
