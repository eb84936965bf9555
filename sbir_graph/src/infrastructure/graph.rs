// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Graph Infrastructure
//!
//! The persisted property graph: SQLite-backed repository implementation,
//! versioned schema migrations, and the batched idempotent loader. The
//! loader is the sole mutator of the graph; every other component reads.

pub mod loader;
pub mod schema;
pub mod sqlite_store;

pub use loader::{FailedRecord, GraphLoader, LoadReport};
pub use schema::{migrations, GRAPH_SCHEMA_VERSION};
pub use sqlite_store::SqliteGraphStore;
