// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Exit Codes
//!
//! The command surface's exit-code contract. Scripts driving the pipeline
//! branch on these, so the mapping is part of the public interface:
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | asset failure |
//! | 2 | quality gate blocking failure |
//! | 3 | configuration error |
//! | 4 | infrastructure unreachable |

use std::fmt;

/// Exit code returned by the `sbir-graph` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,

    /// One or more assets failed to materialize.
    AssetFailure = 1,

    /// An ERROR-severity quality gate blocked downstream work.
    GateBlocked = 2,

    /// Configuration invalid or missing; nothing ran.
    ConfigError = 3,

    /// Graph database or object storage unreachable.
    InfrastructureUnreachable = 4,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Terminates the process with this code.
    pub fn exit(self) -> ! {
        std::process::exit(self.as_i32())
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitCode::Success => "success",
            ExitCode::AssetFailure => "asset failure",
            ExitCode::GateBlocked => "quality gate blocked",
            ExitCode::ConfigError => "configuration error",
            ExitCode::InfrastructureUnreachable => "infrastructure unreachable",
        };
        write!(f, "{} ({})", name, self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_contract() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::AssetFailure.as_i32(), 1);
        assert_eq!(ExitCode::GateBlocked.as_i32(), 2);
        assert_eq!(ExitCode::ConfigError.as_i32(), 3);
        assert_eq!(ExitCode::InfrastructureUnreachable.as_i32(), 4);
    }
}
