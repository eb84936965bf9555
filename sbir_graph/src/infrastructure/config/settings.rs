// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Configuration
//!
//! Typed configuration with layered loading:
//!
//! 1. base TOML file (`--config`, default `config/sbir_graph.toml`)
//! 2. optional environment overlay file (`<base>.<SBIR_GRAPH_ENV>.toml`)
//! 3. `SBIR_GRAPH__`-prefixed environment variables, double underscore
//!    mapping to nesting (`SBIR_GRAPH__LOADER__BATCH_SIZE=500`)
//!
//! Every struct is `deny_unknown_fields`: a typo'd key fails startup with a
//! configuration error instead of being silently ignored. Secrets (database
//! URL, API key) are never stored in files; configuration carries only the
//! *names* of the environment variables to read them from.
//!
//! The configuration snapshot is immutable per run. Asset fingerprints embed
//! a canonical JSON slice of the sections an asset reads, so a config edit
//! re-materializes exactly the affected subtree.

use chrono::NaiveDate;
use config::{Config, Environment, File};
use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exponential backoff schedule shared by extractors, API clients, the
/// loader, and the asset runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry `attempt` (1-based): base × 2^(attempt-1), capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Upper bound on total sleep across all retries, used by the
    /// backoff-bounded property test.
    pub fn total_backoff_bound(&self) -> Duration {
        (1..self.max_attempts)
            .map(|a| self.delay_for_attempt(a))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Root of the artifact tree (local directory or mounted object prefix).
    pub root: PathBuf,
    /// Superseded artifacts kept per (asset, partition).
    pub retention_keep: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/artifacts"),
            retention_keep: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourcesConfig {
    /// Records per extracted chunk.
    pub chunk_size: usize,
    /// Row-decode failures tolerated before the asset fails.
    pub max_error_fraction: f64,
    pub io_retry: RetryConfig,
    /// Directory holding raw source drops, searched for dated artifacts.
    pub inbox: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            max_error_fraction: 0.05,
            io_retry: RetryConfig::default(),
            inbox: PathBuf::from("data/inbox"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ValidationConfig {
    /// Maximum award amount per phase, keyed by roman numeral.
    pub phase_caps: BTreeMap<String, f64>,
    /// Program-active date range awards must fall within.
    pub min_award_date: NaiveDate,
    pub max_award_date: NaiveDate,
    /// Minimum non-null fraction for completeness rules.
    pub completeness_min_fraction: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut phase_caps = BTreeMap::new();
        phase_caps.insert("I".to_string(), 314_363.0);
        phase_caps.insert("II".to_string(), 2_095_748.0);
        phase_caps.insert("III".to_string(), f64::MAX);
        Self {
            phase_caps,
            min_award_date: NaiveDate::from_ymd_opt(1983, 1, 1).expect("static date"),
            max_award_date: NaiveDate::from_ymd_opt(2030, 12, 31).expect("static date"),
            completeness_min_fraction: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
    /// Registry lookup endpoint.
    pub base_url: String,
    /// Environment variable holding the API key; never the key itself.
    pub api_key_env: String,
    pub requests_per_second: f64,
    pub burst: u32,
    /// Targets per batched lookup request.
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    /// Disables the API strategy entirely (offline runs).
    pub enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sam.gov/entity-information/v3/entities".to_string(),
            api_key_env: "SBIR_GRAPH_API_KEY".to_string(),
            requests_per_second: 4.0,
            burst: 8,
            batch_size: 100,
            timeout_secs: 30,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EnrichmentConfig {
    /// First strategy reaching this confidence wins immediately.
    pub stop_threshold: f64,
    /// Similarity required for a high-confidence fuzzy match.
    pub fuzzy_high_threshold: f64,
    /// Similarity required for a medium-confidence fuzzy match.
    pub fuzzy_medium_threshold: f64,
    /// Worker pool size; 0 means one per core.
    pub workers: usize,
    pub api: ApiConfig,
    /// Agency → default two-digit NAICS sector for the domain-default
    /// strategy and the cross-source consistency rule.
    pub agency_sector_defaults: BTreeMap<String, String>,
    /// Catch-all sector code for the last-resort strategy.
    pub sector_fallback_code: String,
    /// Zip-prefix length two addresses must share to pass proximity.
    pub proximity_zip_prefix: usize,
    /// Minimum acceptable per-field match rate, enforced as a gate.
    pub min_match_rate: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        let mut agency_sector_defaults = BTreeMap::new();
        agency_sector_defaults.insert("DOD".to_string(), "33".to_string());
        agency_sector_defaults.insert("HHS".to_string(), "62".to_string());
        agency_sector_defaults.insert("NASA".to_string(), "33".to_string());
        agency_sector_defaults.insert("NSF".to_string(), "54".to_string());
        agency_sector_defaults.insert("DOE".to_string(), "22".to_string());
        Self {
            stop_threshold: 0.80,
            fuzzy_high_threshold: 0.80,
            fuzzy_medium_threshold: 0.70,
            workers: 0,
            api: ApiConfig::default(),
            agency_sector_defaults,
            sector_fallback_code: "541715".to_string(),
            proximity_zip_prefix: 3,
            min_match_rate: 0.70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoaderConfig {
    /// Records per transaction.
    pub batch_size: usize,
    /// Concurrent loader workers, each owning a disjoint key-hash partition.
    pub workers: usize,
    pub retry: RetryConfig,
    /// Opt-in tombstoning: stamp `deprecated_at` on records that vanished
    /// upstream instead of ignoring them. Never deletes.
    pub tombstone_missing: bool,
    /// Environment variable holding the graph database URL.
    pub database_url_env: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1_000,
            workers: 4,
            retry: RetryConfig::default(),
            tombstone_missing: false,
            database_url_env: "SBIR_GRAPH_DATABASE_URL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MemoryConfig {
    pub warn_bytes: u64,
    pub critical_bytes: u64,
    pub sample_interval_ms: u64,
    /// Chunk size multiplier applied when an asset is retried after a kill
    /// at the critical threshold.
    pub chunk_downstep_ratio: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            warn_bytes: 6 * 1024 * 1024 * 1024,
            critical_bytes: 12 * 1024 * 1024 * 1024,
            sample_interval_ms: 500,
            chunk_downstep_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeConfig {
    /// Concurrent assets; 0 means cores - 1.
    pub parallelism: usize,
    /// Wall-clock budget per chunk for streaming assets.
    pub chunk_timeout_secs: u64,
    /// Wall-clock budget for non-streaming assets (loaders get longer).
    pub asset_timeout_secs: u64,
    pub retry: RetryConfig,
    pub memory: MemoryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            chunk_timeout_secs: 300,
            asset_timeout_secs: 3_600,
            retry: RetryConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClassifierConfig {
    /// Model artifact (versioned term-weight table).
    pub artifact_path: PathBuf,
    /// Labels kept per award.
    pub top_k: usize,
    /// Texts per classification batch.
    pub batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("models/cet_lexicon.json"),
            top_k: 3,
            batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BenchmarkConfig {
    /// Relative regression tolerated before `benchmark` fails.
    pub regression_tolerance: f64,
    /// Fixed sample file the benchmark enriches.
    pub sample_path: PathBuf,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            regression_tolerance: 0.02,
            sample_path: PathBuf::from("data/benchmark/sample_awards.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GraphConfig {
    /// Schema version this build expects; loader refuses on mismatch.
    pub expected_schema_version: i64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            expected_schema_version: 2,
        }
    }
}

/// The immutable per-run configuration snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EtlConfig {
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
    pub validation: ValidationConfig,
    pub enrichment: EnrichmentConfig,
    pub loader: LoaderConfig,
    pub runtime: RuntimeConfig,
    pub classifier: ClassifierConfig,
    pub benchmark: BenchmarkConfig,
    pub graph: GraphConfig,
}

/// Environment variable selecting the overlay layer.
const ENV_OVERLAY_VAR: &str = "SBIR_GRAPH_ENV";

/// Prefix for runtime environment overrides.
const ENV_PREFIX: &str = "SBIR_GRAPH";

impl EtlConfig {
    /// Loads the layered configuration: base file → environment overlay →
    /// `SBIR_GRAPH__`-prefixed environment variables. Unknown keys fail.
    pub fn load(base_path: Option<&Path>) -> Result<Self, EtlError> {
        let mut builder = Config::builder();

        if let Some(path) = base_path {
            builder = builder.add_source(File::from(path).required(true));
            if let Ok(env_name) = std::env::var(ENV_OVERLAY_VAR) {
                let overlay = path.with_extension(format!("{}.toml", env_name));
                builder = builder.add_source(File::from(overlay).required(false));
            }
        }

        // Overrides are `SBIR_GRAPH__SECTION__KEY`. The double-underscore
        // prefix separator keeps single-underscore variables (the secret
        // names, `SBIR_GRAPH_ENV`) out of the override namespace.
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| EtlError::invalid_config(format!("configuration load failed: {}", e)))?;

        raw.try_deserialize::<EtlConfig>()
            .map_err(|e| EtlError::invalid_config(format!("configuration invalid: {}", e)))
    }

    /// Canonical JSON for one top-level section, embedded in asset
    /// fingerprints. Serde maps here are `BTreeMap`s, so key order, and
    /// therefore the slice, is deterministic.
    pub fn slice_json(&self, section: &str) -> Result<String, EtlError> {
        let value = serde_json::to_value(self)?;
        let slice = value.get(section).cloned().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::to_string(&slice)?)
    }

    /// Reads a secret named by configuration from the process environment.
    pub fn secret_from_env(var_name: &str) -> Result<String, EtlError> {
        std::env::var(var_name).map_err(|_| {
            EtlError::invalid_config(format!(
                "secret environment variable '{}' is not set",
                var_name
            ))
        })
    }

    pub fn code_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = EtlConfig::default();
        assert_eq!(cfg.sources.chunk_size, 10_000);
        assert_eq!(cfg.loader.batch_size, 1_000);
        assert_eq!(cfg.enrichment.stop_threshold, 0.80);
        assert_eq!(cfg.enrichment.api.batch_size, 100);
        assert_eq!(cfg.runtime.chunk_timeout_secs, 300);
    }

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 4_000,
        };
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(1_000));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(2_000));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(4_000));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_millis(4_000));
        assert_eq!(retry.total_backoff_bound(), Duration::from_millis(11_000));
    }

    #[test]
    fn test_slice_json_is_deterministic_and_section_scoped() {
        let cfg = EtlConfig::default();
        let a = cfg.slice_json("loader").unwrap();
        let b = cfg.slice_json("loader").unwrap();
        assert_eq!(a, b);
        assert!(a.contains("batch_size"));
        assert!(!a.contains("stop_threshold"));
    }

    #[test]
    fn test_unknown_section_slices_to_null() {
        let cfg = EtlConfig::default();
        assert_eq!(cfg.slice_json("nonexistent").unwrap(), "null");
    }
}
