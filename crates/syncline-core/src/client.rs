//! Rate-limit aware client wrapping a [`Transport`]

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{ApiError, ClientError};
use crate::request::{Page, PageRequest};
use crate::retry::{Outcome, RetryPolicy, RetryReason, RetryTracker};

/// One raw attempt at fetching a page. Implementations do not retry.
pub trait Transport: Send + Sync {
    fn fetch(&self, request: &PageRequest) -> Result<Page, ApiError>;
}

/// Executes page requests, retrying transient failures and honoring
/// server-directed backoff.
pub struct RateLimitedClient {
    transport: Box<dyn Transport>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RateLimitedClient {
    pub fn new(transport: Box<dyn Transport>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            policy,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fetch one page, retrying the identical request until it succeeds,
    /// hits a fatal error, or exhausts the transient retry ceiling.
    pub fn execute(&self, request: &PageRequest) -> Result<Page, ClientError> {
        let mut tracker = RetryTracker::new(self.policy);
        loop {
            log::debug!("GET {request}");
            match tracker.assess(self.transport.fetch(request)) {
                Outcome::Success(page) => return Ok(page),
                Outcome::Retry { wait, reason } => {
                    match reason {
                        RetryReason::RateLimited => {
                            log::warn!("{}: rate limited, sleeping {wait:?}", request.resource);
                        }
                        RetryReason::Transient { attempt, message } => {
                            log::warn!(
                                "{}: attempt {attempt}/{} failed: {message}, retrying in {wait:?}",
                                request.resource,
                                self.policy.max_attempts
                            );
                        }
                    }
                    self.clock.sleep(wait);
                }
                Outcome::Fatal(e) => {
                    log::error!("{}: failed permanently: {e}", request.resource);
                    return Err(e);
                }
            }
        }
    }
}
