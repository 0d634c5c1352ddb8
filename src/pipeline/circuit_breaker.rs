//! Circuit Breaker for remote page requests.
//!
//! Discovery retries a failed page instead of skipping it. The breaker
//! bounds that retry loop: after too many consecutive failures the caller
//! stops and escalates instead of spinning forever against a broken remote.

use crate::error::{AppError, Result};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures tolerated before the breaker trips. Default: 5
    pub max_consecutive_failures: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
        }
    }
}

/// Result of recording a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerResult {
    /// Retry is still allowed
    Retry { failures: usize, remaining: usize },
    /// Too many consecutive failures - give up
    Triggered { failures: usize },
}

/// Consecutive-failure counter.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failures: usize,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Breaker tripping after `max_consecutive_failures` failures.
    pub fn with_limit(max_consecutive_failures: usize) -> Self {
        Self::with_config(CircuitBreakerConfig {
            max_consecutive_failures: max_consecutive_failures.max(1),
        })
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Reset after a successful request.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Count a failure and report whether a retry is still allowed.
    pub fn record_failure(&mut self) -> CircuitBreakerResult {
        self.failures += 1;
        if self.failures >= self.config.max_consecutive_failures {
            CircuitBreakerResult::Triggered {
                failures: self.failures,
            }
        } else {
            CircuitBreakerResult::Retry {
                failures: self.failures,
                remaining: self.config.max_consecutive_failures - self.failures,
            }
        }
    }

    /// Record a failure, returning Err once the breaker trips.
    pub fn check_failure(&mut self, context: &str) -> Result<()> {
        match self.record_failure() {
            CircuitBreakerResult::Retry {
                failures,
                remaining,
            } => {
                log::warn!(
                    "Circuit breaker: {} failed ({} in a row, {} retries left)",
                    context,
                    failures,
                    remaining
                );
                Ok(())
            }
            CircuitBreakerResult::Triggered { failures } => {
                log::error!(
                    "Circuit breaker: TRIGGERED! {} failed {} times in a row",
                    context,
                    failures
                );
                Err(AppError::discovery(format!(
                    "{context} failed {failures} consecutive times"
                )))
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
