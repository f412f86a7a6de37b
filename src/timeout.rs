//! Timeout utilities for the remote channel.
//!
//! Local analysis runs without a deadline. Every remote session acquisition
//! and remote command is bounded by one connection-level duration; exceeding
//! it fails only the target being read.

use crate::error::{Result, ScanError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Default remote timeout in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Timeout configuration for one kind of remote operation
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the operation
    pub duration: Duration,
    /// Operation name for logging
    pub operation_name: String,
}

impl TimeoutConfig {
    pub fn new(duration: Duration, operation: impl Into<String>) -> Self {
        Self {
            duration,
            operation_name: operation.into(),
        }
    }

    /// Starts counting down from now.
    pub fn start(&self) -> Deadline {
        Deadline {
            start: Instant::now(),
            config: self.clone(),
        }
    }

    fn expired(&self) -> ScanError {
        warn!(
            operation = %self.operation_name,
            after = ?self.duration,
            "Remote operation timed out"
        );
        ScanError::timeout(self.operation_name.clone(), self.duration)
    }
}

/// A running countdown shared by every step of one operation.
///
/// Steps that block (waiting for a lock, then for one or more sessions) each
/// wait for [`Deadline::remaining`], so the whole operation never exceeds
/// the configured duration.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    config: TimeoutConfig,
}

impl Deadline {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the deadline, or a timeout error once it has passed.
    pub fn remaining(&self) -> Result<Duration> {
        self.config
            .duration
            .checked_sub(self.elapsed())
            .filter(|left| !left.is_zero())
            .ok_or_else(|| self.expired())
    }

    /// The timeout error for this operation, logged once.
    pub fn expired(&self) -> ScanError {
        self.config.expired()
    }
}
