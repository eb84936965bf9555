// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SBIR Graph ETL
//!
//! A batch ETL pipeline that ingests heterogeneous public datasets about
//! U.S. small-business R&D funding (awards, federal contracts, patent
//! filings and assignments, supplier registrations) and produces a
//! property graph linking companies, awards, contracts, patents, and
//! technology categories.
//!
//! ## Architecture Overview
//!
//! The crate follows the domain / application / infrastructure split of its
//! sibling crates:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Use Cases, Run Wiring, Asset Catalog)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer (sbir-graph-domain)         │
//! │  (Entities, Value Objects, Domain Services, Ports)          │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Extractors, Enrichment Engine, Graph Loader,              │
//! │   Asset Runtime, Storage, Gates, Metrics, Config)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Three Cores
//!
//! - **Enrichment engine** (`infrastructure::enrichment`): hierarchical
//!   per-field fallback chains with confidence, evidence, batched API
//!   lookups behind a token bucket and circuit breaker.
//! - **Asset runtime** (`infrastructure::runtime`): content-addressed
//!   artifacts with fingerprint-driven incremental materialization, chunked
//!   streaming, quality gates, and cooperative cancellation.
//! - **Graph loader** (`infrastructure::graph`): idempotent batched
//!   projection into the property graph with retry-then-split contention
//!   handling and assignment-chain ordering.
//!
//! ## Data Flow
//!
//! A source file is resolved → streamed in chunks → validated → enriched →
//! transformed → loaded. Each stage writes a columnar artifact plus a
//! sidecar check report; the asset runtime consumes and produces these
//! artifacts and skips work whose fingerprints are already sealed.

pub mod application;
pub mod infrastructure;
pub mod presentation;
