//! Error taxonomy for calls against the remote API

use std::time::Duration;

/// Error from a single attempt against the remote API.
#[derive(Debug)]
pub enum ApiError {
    /// Server said "too many requests" and how long to wait
    RateLimited { retry_after: Duration },
    /// HTTP error with optional status code (None = connection-level failure)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Request exceeded the configured timeout
    Timeout,
    /// Response body could not be decoded
    Decode(String),
}

/// What the retry loop should do with an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sleep the server-directed duration and retry, without counting an attempt
    RateLimited(Duration),
    /// Retry with backoff up to the attempt ceiling
    Transient,
    /// Give up immediately
    Fatal,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited { retry_after } => {
                write!(f, "rate limited (retry after {retry_after:?})")
            }
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Timeout => f.write_str("request timed out"),
            Self::Decode(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Create an API error from a reqwest error.
    ///
    /// The URL is stripped so tokens passed as query parameters never reach logs.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        let status = e.status().map(|s| s.as_u16());
        let is_decode = e.is_decode() || e.is_body();
        let message = e.without_url().to_string();
        if is_decode {
            Self::Decode(message)
        } else {
            Self::Http { status, message }
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Self::RateLimited { retry_after } => Disposition::RateLimited(*retry_after),
            Self::Http { status: None, .. } => Disposition::Transient,
            Self::Http {
                status: Some(s), ..
            } => match s {
                429 => Disposition::RateLimited(Duration::ZERO),
                500..=599 => Disposition::Transient,
                // 401/403/404 and every other client error: waiting will not help
                _ => Disposition::Fatal,
            },
            Self::Timeout | Self::Decode(_) => Disposition::Transient,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() != Disposition::Fatal
    }
}

/// Error surfaced by [`crate::RateLimitedClient`] once it stops retrying.
///
/// Rate limiting never appears here: it is retried for as long as the server asks.
#[derive(Debug)]
pub enum ClientError {
    /// Transient failures exhausted the retry ceiling
    Transient { attempts: u32, last: ApiError },
    /// Failure that cannot be resolved by waiting
    Fatal(ApiError),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transient { last, .. } => Some(last),
            Self::Fatal(e) => Some(e),
        }
    }
}

impl ClientError {
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::Transient { last, .. } => last,
            Self::Fatal(e) => e,
        }
    }
}
