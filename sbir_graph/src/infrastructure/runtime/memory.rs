// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Memory Pressure Sampler
//!
//! Periodic resident-set sampling for the whole process. At the warning
//! threshold it logs; at the critical threshold it raises the backpressure
//! flag that asks in-progress streaming assets to flush at their next
//! checkpoint. Assets that cannot flush are killed by the executor's retry
//! path and re-run with a scaled-down chunk size.
//!
//! On Linux the gauge reads `/proc/self/statm`; elsewhere the sampler is a
//! no-op gauge that never trips, which keeps behavior safe rather than
//! guessy on platforms without a cheap RSS source.

use crate::infrastructure::config::MemoryConfig;
use sbir_graph_bootstrap::CancellationToken;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared sampler state.
#[derive(Clone)]
pub struct MemorySampler {
    config: MemoryConfig,
    backpressure: Arc<AtomicBool>,
    peak_rss: Arc<AtomicU64>,
    baseline_rss: Arc<AtomicU64>,
}

impl MemorySampler {
    pub fn new(config: MemoryConfig) -> Self {
        let baseline = current_rss_bytes().unwrap_or(0);
        Self {
            config,
            backpressure: Arc::new(AtomicBool::new(false)),
            peak_rss: Arc::new(AtomicU64::new(baseline)),
            baseline_rss: Arc::new(AtomicU64::new(baseline)),
        }
    }

    /// The flag streaming assets poll at their backpressure checkpoints.
    pub fn backpressure_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.backpressure)
    }

    /// Peak observed RSS above the run baseline.
    pub fn peak_delta_bytes(&self) -> u64 {
        self.peak_rss
            .load(Ordering::Relaxed)
            .saturating_sub(self.baseline_rss.load(Ordering::Relaxed))
    }

    /// Spawns the sampling loop; it lives until cancellation.
    pub fn spawn(&self, cancel: CancellationToken) {
        let sampler = self.clone();
        tokio::spawn(async move {
            let interval = Duration::from_millis(sampler.config.sample_interval_ms.max(50));
            while !cancel.is_cancelled() {
                sampler.sample_once();
                tokio::time::sleep(interval).await;
            }
        });
    }

    fn sample_once(&self) {
        let Some(rss) = current_rss_bytes() else {
            return;
        };
        self.peak_rss.fetch_max(rss, Ordering::Relaxed);

        if rss >= self.config.critical_bytes {
            if !self.backpressure.swap(true, Ordering::Relaxed) {
                warn!(
                    rss_mb = rss / (1024 * 1024),
                    "memory critical: requesting flush/pause from in-progress assets"
                );
            }
        } else {
            if self.backpressure.swap(false, Ordering::Relaxed) {
                info!("memory pressure relieved, backpressure cleared");
            }
            if rss >= self.config.warn_bytes {
                warn!(rss_mb = rss / (1024 * 1024), "memory above warning threshold");
            }
        }
    }
}

/// Resident set size in bytes, when the platform exposes it cheaply.
#[cfg(target_os = "linux")]
fn current_rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn current_rss_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_delta_monotonic() {
        let sampler = MemorySampler::new(MemoryConfig::default());
        sampler.sample_once();
        let first = sampler.peak_delta_bytes();
        sampler.sample_once();
        assert!(sampler.peak_delta_bytes() >= first);
    }

    #[test]
    fn test_critical_threshold_raises_backpressure() {
        let sampler = MemorySampler::new(MemoryConfig {
            warn_bytes: 1,
            critical_bytes: 1, // any real RSS exceeds this
            sample_interval_ms: 50,
            chunk_downstep_ratio: 0.5,
        });
        sampler.sample_once();
        if current_rss_bytes().is_some() {
            assert!(sampler.backpressure_flag().load(Ordering::Relaxed));
        }
    }
}
