// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Ports
//!
//! Persistence abstractions implemented by the infrastructure layer.

pub mod graph_repository;

pub use graph_repository::{
    BatchOutcome, EdgeSpec, GraphRepository, NodeLabel, NodeSpec, RelType,
};
