// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Circuit Breaker
//!
//! Per-source failure isolation for API-backed strategies. The breaker
//! opens after the configured number of consecutive failures; while open,
//! the strategy is skipped and the engine degrades to the next fallback.
//! After the cool-down the breaker half-opens: one probe request is allowed
//! through, and its outcome decides between closing and re-opening.

use crate::infrastructure::config::BreakerConfig;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Breaker state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Shared circuit breaker for one external source.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed. Transitions Open → HalfOpen when the
    /// cool-down has elapsed; in HalfOpen exactly the first caller probes.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if elapsed {
                    info!(source = %self.name, "circuit breaker half-open, probing");
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call; closes from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!(source = %self.name, "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Records a failed call; opens at the threshold, and a failed half-open
    /// probe re-opens immediately.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                source = %self.name,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
        }
        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "registry",
            &BreakerConfig {
                failure_threshold: threshold,
                cooldown_secs,
            },
        )
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let b = breaker(3, 60);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow_request());
    }

    #[test]
    fn test_success_resets_count() {
        let b = breaker(3, 60);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cooldown_then_close_on_success() {
        let b = breaker(1, 60);
        b.record_failure();
        assert!(!b.allow_request());

        tokio::time::advance(Duration::from_secs(61)).await;
        // First caller becomes the probe; others are held.
        assert!(b.allow_request());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(!b.allow_request());

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let b = breaker(1, 60);
        b.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(b.allow_request());
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow_request());
    }
}
