//! Retry policy
//!
//! Every attempt uses the current timeout as its deadline. A recoverable
//! failure scales the timeout by the backoff multiplier and counts a retry;
//! once the count passes `max_retries` the last error becomes final.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::RequestError;

/// Default per-attempt timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2500;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default timeout multiplier applied on each retry
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.0;

/// Retry configuration for a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Timeout of the first attempt
    pub initial_timeout_ms: u64,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Factor applied to the timeout after each failure
    pub backoff_multiplier: f64,
    /// Whether 5xx and other non-auth status errors are retried
    pub retry_server_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            retry_server_errors: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_timeout_ms: u64, max_retries: u32, backoff_multiplier: f64) -> Self {
        Self {
            initial_timeout_ms,
            max_retries,
            backoff_multiplier,
            ..Self::default()
        }
    }

    /// Never retry
    pub fn no_retry(initial_timeout_ms: u64) -> Self {
        Self::new(initial_timeout_ms, 0, DEFAULT_BACKOFF_MULTIPLIER)
    }

    /// Fresh state for the first attempt
    pub fn start(&self) -> RetryState {
        RetryState {
            current_timeout_ms: self.initial_timeout_ms,
            retry_count: 0,
            max_retries: self.max_retries,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Progress of one request through its retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    current_timeout_ms: u64,
    retry_count: u32,
    max_retries: u32,
    backoff_multiplier: f64,
}

impl RetryState {
    /// Deadline for the next attempt
    pub fn current_timeout(&self) -> Duration {
        Duration::from_millis(self.current_timeout_ms)
    }

    pub fn current_timeout_ms(&self) -> u64 {
        self.current_timeout_ms
    }

    /// Retries consumed so far
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Record a recoverable failure
    ///
    /// Returns `Err(error)` once the retries are exhausted.
    pub fn next_attempt(&mut self, error: RequestError) -> Result<(), RequestError> {
        self.retry_count += 1;
        self.current_timeout_ms = (self.current_timeout_ms as f64 * self.backoff_multiplier) as u64;
        if self.retry_count > self.max_retries {
            return Err(error);
        }
        Ok(())
    }
}
