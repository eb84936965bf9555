// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration Infrastructure
//!
//! Layered, schema-validated configuration for the pipeline.

pub mod settings;

pub use settings::{
    ApiConfig, BenchmarkConfig, BreakerConfig, ClassifierConfig, EnrichmentConfig, EtlConfig,
    GraphConfig, LoaderConfig, MemoryConfig, RetryConfig, RuntimeConfig, SourcesConfig,
    StorageConfig, ValidationConfig,
};
