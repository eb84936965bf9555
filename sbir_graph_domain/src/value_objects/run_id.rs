// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! ULID identity of a pipeline run. Lexicographic order of run ids matches
//! creation order, which keeps run directories and reports naturally sorted.

use crate::EtlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Unique identity of a single orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        RunId(Ulid::new())
    }

    pub fn from_string(s: &str) -> Result<Self, EtlError> {
        Ulid::from_string(s)
            .map(RunId)
            .map_err(|e| EtlError::ValidationFailed(format!("invalid run id '{}': {}", s, e)))
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let id = RunId::new();
        let parsed = RunId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(RunId::from_string("not-a-ulid").is_err());
    }
}
