// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Confidence
//!
//! A confidence score in `[0, 1]` attached to every enrichment result, plus
//! the band classification used in quality reporting:
//!
//! - **High**: ≥ 0.80
//! - **Medium**: 0.60 – 0.79
//! - **Low**: < 0.60
//!
//! Construction clamps nothing: out-of-range values are rejected, because a
//! confidence outside `[0, 1]` always indicates a strategy bug rather than a
//! data problem.

use crate::EtlError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Confidence band used in run-level quality aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

/// Confidence score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);

    /// Band boundary: high ≥ 0.80.
    pub const HIGH_THRESHOLD: f64 = 0.80;

    /// Band boundary: medium ≥ 0.60.
    pub const MEDIUM_THRESHOLD: f64 = 0.60;

    pub fn new(value: f64) -> Result<Self, EtlError> {
        if !(0.0..=1.0).contains(&value) || value.is_nan() {
            return Err(EtlError::InternalError(format!(
                "confidence {} outside [0, 1]",
                value
            )));
        }
        Ok(Confidence(value))
    }

    /// Scales a base confidence by a ratio in `[0, 1]`, e.g. fuzzy base 0.70
    /// scaled by the similarity score.
    pub fn scaled(base: f64, ratio: f64) -> Result<Self, EtlError> {
        Self::new(base * ratio.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn band(&self) -> ConfidenceBand {
        if self.0 >= Self::HIGH_THRESHOLD {
            ConfidenceBand::High
        } else if self.0 >= Self::MEDIUM_THRESHOLD {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn meets(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl Eq for Confidence {}

// Total order is safe: construction rejects NaN.
impl Ord for Confidence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Confidence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands() {
        assert_eq!(Confidence::new(0.90).unwrap().band(), ConfidenceBand::High);
        assert_eq!(Confidence::new(0.80).unwrap().band(), ConfidenceBand::High);
        assert_eq!(Confidence::new(0.69).unwrap().band(), ConfidenceBand::Medium);
        assert_eq!(Confidence::new(0.59).unwrap().band(), ConfidenceBand::Low);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(f64::NAN).is_err());
    }

    #[test]
    fn test_scaled_fuzzy() {
        let c = Confidence::scaled(0.70, 0.98).unwrap();
        assert!((c.value() - 0.686).abs() < 1e-9);
        assert_eq!(c.band(), ConfidenceBand::Medium);
    }
}
