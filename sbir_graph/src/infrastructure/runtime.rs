// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Asset Runtime
//!
//! Content-addressed asset materialization: the registry of declared
//! assets, the executor that resolves and runs the DAG, and the memory
//! sampler that applies backpressure under pressure.

pub mod asset;
pub mod executor;
pub mod memory;

pub use asset::{
    AssetContext, AssetDefinition, AssetRegistry, ChunkSink, Materializer, UpstreamArtifact,
};
pub use executor::AssetExecutor;
pub use memory::MemorySampler;
