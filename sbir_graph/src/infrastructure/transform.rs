// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Transformers
//!
//! Business-logic passes between enrichment and load: organization
//! deduplication, patent assignment chain construction with ownership
//! resolution, company-level aggregation, NAICS→sector mapping, and the
//! categorization transformer driving the classifier contract.

pub mod assignment_chain;
pub mod categorize;
pub mod company_metrics;
pub mod dedup;
pub mod sector_map;

pub use assignment_chain::{build_chains, AssignmentChain, ChainWarning};
pub use categorize::{categorize_awards, AwardCategories};
pub use company_metrics::{CompanyAggregator, CompanyMetrics};
pub use dedup::{OrganizationResolver, ResolvedAward};
pub use sector_map::{sector_for, SectorInfo};
