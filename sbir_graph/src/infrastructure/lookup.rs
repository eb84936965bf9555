// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # External Lookup Index
//!
//! In-memory multi-key indexes over reference corpora, built once per run
//! and shared read-only across enrichment workers.

pub mod index;

pub use index::{IndexEntry, LookupIndex, SharedLookupIndex};
