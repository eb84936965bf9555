// /////////////////////////////////////////////////////////////////////////////
// SBIR Graph ETL
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! Minimal logging abstraction for the bootstrap phase, before the
//! application's tracing subscriber is configured. Trait-based so bootstrap
//! logic stays testable with a no-op implementation.

/// Bootstrap logging abstraction.
pub trait BootstrapLogger: Send + Sync {
    /// Fatal errors during bootstrap that will cause termination.
    fn error(&self, message: &str);

    /// Non-fatal issues that may affect operation.
    fn warn(&self, message: &str);

    /// Normal bootstrap progress messages.
    fn info(&self, message: &str);

    /// Detailed diagnostic information during bootstrap.
    fn debug(&self, message: &str);
}

/// Console logger routing bootstrap logs through the tracing crate.
pub struct ConsoleLogger {
    prefix: String,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::with_prefix("bootstrap")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapLogger for ConsoleLogger {
    fn error(&self, message: &str) {
        tracing::error!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }
}

/// No-op logger for testing bootstrap logic without output.
pub struct NoOpLogger;

impl NoOpLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoOpLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapLogger for NoOpLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_logger_discards() {
        let logger = NoOpLogger::new();
        logger.info("nothing happens");
        logger.error("still nothing");
    }

    #[test]
    fn test_console_logger_prefix() {
        let logger = ConsoleLogger::with_prefix("startup");
        logger.debug("prefixed");
    }
}
