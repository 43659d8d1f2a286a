//! Syncline Core - shared infrastructure for incremental API extraction
//!
//! This crate holds the pieces every stream sync leans on: the remote API
//! error taxonomy, the retrying rate-limit aware client, the HTTP transport,
//! time and sleep abstraction, logging and shutdown signalling.

pub mod client;
pub mod clock;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod request;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use client::{RateLimitedClient, Transport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, ClientError, Disposition};
pub use http::{HttpSettings, HttpTransport, SHARED_RUNTIME};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use request::{Page, PageRequest};
pub use retry::{Outcome, RetryPolicy, RetryReason, RetryTracker};
pub use shutdown::{
    EXIT_INTERRUPTED, install_signal_handlers, is_shutdown_requested, request_shutdown,
    reset_shutdown, shutdown_flag,
};
