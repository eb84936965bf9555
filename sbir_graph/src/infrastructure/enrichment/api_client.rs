// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Registry API Client
//!
//! Batched entity lookups against the supplier registry. The transport
//! (`HttpRegistryClient`) is separated from the protection wrapper
//! (`ProtectedRegistry`) so tests can drive the retry, rate-limit, and
//! circuit-breaker machinery with a stub transport.
//!
//! ## Failure Classification
//!
//! - 5xx, 429, timeouts, connection errors → `ExternalTransient`, retried
//!   with exponential backoff up to the configured attempts
//! - other 4xx → `ExternalPermanent`, never retried; the engine degrades to
//!   the next strategy
//! - breaker open → `CircuitOpen`, strategy skipped without a request

use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::enrichment::circuit_breaker::CircuitBreaker;
use crate::infrastructure::enrichment::rate_limiter::TokenBucket;
use async_trait::async_trait;
use sbir_graph_domain::value_objects::SupplierId;
use sbir_graph_domain::EtlError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One lookup query. Batches are aligned by index with their results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryQuery {
    pub name: String,
    pub state: Option<String>,
}

/// Authoritative registry answer for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryMatch {
    pub supplier_id: Option<SupplierId>,
    pub legal_name: String,
    pub state: Option<String>,
    pub naics: Option<String>,
}

/// Transport abstraction: one batch request, results aligned by index.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn lookup_batch(&self, queries: &[RegistryQuery]) -> Result<Vec<Option<RegistryMatch>>, EtlError>;
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    queries: &'a [RegistryQuery],
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    results: Vec<Option<RegistryMatch>>,
}

/// Reqwest-backed transport.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRegistryClient {
    pub fn new(config: &ApiConfig, api_key: String) -> Result<Self, EtlError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EtlError::internal_error(format!("http client build failed: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn lookup_batch(&self, queries: &[RegistryQuery]) -> Result<Vec<Option<RegistryMatch>>, EtlError> {
        let response = self
            .http
            .post(&self.base_url)
            .header("X-Api-Key", &self.api_key)
            .json(&BatchRequest { queries })
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            let body: BatchResponse = response
                .json()
                .await
                .map_err(|e| EtlError::external_permanent(format!("malformed registry response: {}", e)))?;
            if body.results.len() != queries.len() {
                return Err(EtlError::external_permanent(format!(
                    "registry returned {} results for {} queries",
                    body.results.len(),
                    queries.len()
                )));
            }
            Ok(body.results)
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(EtlError::external_transient(format!("registry status {}", status)))
        } else {
            Err(EtlError::external_permanent(format!("registry status {}", status)))
        }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> EtlError {
    if e.is_timeout() || e.is_connect() {
        EtlError::external_transient(format!("registry request failed: {}", e))
    } else {
        EtlError::external_permanent(format!("registry request failed: {}", e))
    }
}

/// Retry/rate-limit/breaker wrapper around a transport.
pub struct ProtectedRegistry {
    client: Arc<dyn RegistryClient>,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    config: ApiConfig,
    transient_retries: AtomicU64,
}

impl ProtectedRegistry {
    pub fn new(client: Arc<dyn RegistryClient>, config: ApiConfig) -> Self {
        Self {
            limiter: TokenBucket::new(config.requests_per_second, config.burst),
            breaker: CircuitBreaker::new("registry", &config.breaker),
            client,
            config,
            transient_retries: AtomicU64::new(0),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Total transient retries performed, surfaced in run metadata.
    pub fn transient_retries(&self) -> u64 {
        self.transient_retries.load(Ordering::Relaxed)
    }

    /// One protected batch lookup: breaker gate, token bucket, bounded
    /// backoff on transient failures.
    pub async fn lookup_batch(&self, queries: &[RegistryQuery]) -> Result<Vec<Option<RegistryMatch>>, EtlError> {
        if !self.breaker.allow_request() {
            return Err(EtlError::CircuitOpen("registry breaker open".to_string()));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            match self.client.lookup_batch(queries).await {
                Ok(results) => {
                    self.breaker.record_success();
                    return Ok(results);
                }
                Err(e @ EtlError::ExternalTransient(_)) if attempt < self.config.retry.max_attempts => {
                    self.breaker.record_failure();
                    self.transient_retries.fetch_add(1, Ordering::Relaxed);
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(attempt, "transient registry failure: {}; retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    debug!("registry lookup failed permanently for this batch: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// Splits arbitrary query lists into configured batch sizes, preserving
    /// alignment.
    pub async fn lookup_all(&self, queries: &[RegistryQuery]) -> Result<Vec<Option<RegistryMatch>>, EtlError> {
        let mut out = Vec::with_capacity(queries.len());
        for batch in queries.chunks(self.config.batch_size.max(1)) {
            out.extend(self.lookup_batch(batch).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{BreakerConfig, RetryConfig};
    use parking_lot::Mutex;

    /// Stub transport scripted with a sequence of outcomes.
    struct ScriptedClient {
        script: Mutex<Vec<Result<Vec<Option<RegistryMatch>>, EtlError>>>,
        calls: AtomicU64,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<Vec<Option<RegistryMatch>>, EtlError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl RegistryClient for ScriptedClient {
        async fn lookup_batch(&self, _queries: &[RegistryQuery]) -> Result<Vec<Option<RegistryMatch>>, EtlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            if script.is_empty() {
                Ok(vec![])
            } else {
                script.remove(0)
            }
        }
    }

    fn fast_config() -> ApiConfig {
        ApiConfig {
            requests_per_second: 10_000.0,
            burst: 100,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 2,
            },
            breaker: BreakerConfig {
                failure_threshold: 2,
                cooldown_secs: 60,
            },
            ..ApiConfig::default()
        }
    }

    fn hit(name: &str) -> Vec<Option<RegistryMatch>> {
        vec![Some(RegistryMatch {
            supplier_id: None,
            legal_name: name.to_string(),
            state: None,
            naics: None,
        })]
    }

    #[tokio::test]
    async fn test_transient_then_success_retries() {
        let client = Arc::new(ScriptedClient::new(vec![
            Err(EtlError::external_transient("503")),
            Err(EtlError::external_transient("503")),
            Ok(hit("ACME")),
        ]));
        let protected = ProtectedRegistry::new(client.clone(), fast_config());

        let results = protected
            .lookup_batch(&[RegistryQuery {
                name: "ACME".into(),
                state: None,
            }])
            .await
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().legal_name, "ACME");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(protected.transient_retries(), 2);
        // Success closed the breaker despite the two failures.
        assert!(protected.breaker().allow_request());
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let client = Arc::new(ScriptedClient::new(vec![Err(EtlError::external_permanent("404"))]));
        let protected = ProtectedRegistry::new(client.clone(), fast_config());
        let err = protected.lookup_batch(&[]).await.unwrap_err();
        assert!(matches!(err, EtlError::ExternalPermanent(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_skips_requests() {
        // Each lookup_batch exhausts 3 attempts; threshold 2 opens mid-way.
        let client = Arc::new(ScriptedClient::new(vec![
            Err(EtlError::external_transient("500")),
            Err(EtlError::external_transient("500")),
            Err(EtlError::external_transient("500")),
        ]));
        let protected = ProtectedRegistry::new(client.clone(), fast_config());

        let err = protected.lookup_batch(&[]).await.unwrap_err();
        assert!(matches!(err, EtlError::ExternalTransient(_)));

        // Breaker is open now; no transport call happens.
        let calls_before = client.calls.load(Ordering::SeqCst);
        let err = protected.lookup_batch(&[]).await.unwrap_err();
        assert!(matches!(err, EtlError::CircuitOpen(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_lookup_all_splits_batches() {
        let client = Arc::new(ScriptedClient::new(vec![Ok(hit("A")), Ok(hit("B"))]));
        let mut config = fast_config();
        config.batch_size = 1;
        let protected = ProtectedRegistry::new(client.clone(), config);
        let queries = vec![
            RegistryQuery { name: "A".into(), state: None },
            RegistryQuery { name: "B".into(), state: None },
        ];
        let results = protected.lookup_all(&queries).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }
}
