//! Bounded retry with exponential backoff
//!
//! Each attempt's result is assessed into an explicit [`Outcome`]; the caller
//! owns the loop. Rate limiting is retried indefinitely and does not count
//! towards the attempt ceiling.

use std::time::Duration;

use crate::error::{ApiError, ClientError, Disposition};

/// Default attempt ceiling for transient failures
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed for transient failures (including the first)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff after the `attempt`-th failure (1-based):
    /// base, 2*base, 4*base, ... capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of assessing one attempt
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Retry { wait: Duration, reason: RetryReason },
    Fatal(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    RateLimited,
    Transient { attempt: u32, message: String },
}

/// Counts transient failures for one logical request.
#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn assess<T>(&mut self, result: Result<T, ApiError>) -> Outcome<T> {
        let err = match result {
            Ok(v) => return Outcome::Success(v),
            Err(e) => e,
        };
        match err.disposition() {
            Disposition::RateLimited(wait) => Outcome::Retry {
                wait,
                reason: RetryReason::RateLimited,
            },
            Disposition::Transient => {
                self.failures += 1;
                if self.failures >= self.policy.max_attempts {
                    Outcome::Fatal(ClientError::Transient {
                        attempts: self.failures,
                        last: err,
                    })
                } else {
                    Outcome::Retry {
                        wait: self.policy.backoff(self.failures),
                        reason: RetryReason::Transient {
                            attempt: self.failures,
                            message: err.to_string(),
                        },
                    }
                }
            }
            Disposition::Fatal => Outcome::Fatal(ClientError::Fatal(err)),
        }
    }
}
