//! HTTP transport against a JSON REST/GraphQL-style API.
//!
//! Uses async reqwest internally on a shared tokio runtime, but presents the
//! sync [`Transport`] interface so the engine stays a plain sequential loop.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;

use crate::client::Transport;
use crate::error::ApiError;
use crate::request::{Page, PageRequest};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait applied to a 429 that carries no usable Retry-After header
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(2);

/// Longest server-directed wait honored before retrying
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// Error bodies are truncated to this many bytes before landing in logs
const MAX_ERROR_BODY: usize = 512;

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Where the API lives and how its responses are shaped
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    /// Header carrying the access token (e.g. "Authorization", "X-Access-Token")
    pub auth_header: String,
    pub token: Option<String>,
    /// JSON pointer to the record array; empty = the body itself is the array
    pub records_pointer: String,
    /// JSON pointer to the continuation token, for cursor-paginated resources
    pub cursor_pointer: Option<String>,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_header: "Authorization".to_string(),
            token: None,
            records_pointer: String::new(),
            cursor_pointer: None,
            request_timeout: Duration::from_secs(300),
        }
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.settings.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(ApiError::from_reqwest)?;
        Ok(Self { client, settings })
    }

    fn url_for(&self, resource: &str) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            resource.trim_start_matches('/')
        )
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let url = self.url_for(&request.resource);
        let body = SHARED_RUNTIME.handle().block_on(async {
            let mut builder = self.client.get(&url).query(&request.params);
            if let Some(token) = &self.settings.token {
                builder = builder.header(self.settings.auth_header.as_str(), token.as_str());
            }
            let response = builder.send().await.map_err(ApiError::from_reqwest)?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ApiError::RateLimited {
                    retry_after: retry_after(response.headers()),
                });
            }
            if !status.is_success() {
                let mut message = response.text().await.unwrap_or_default();
                truncate_utf8(&mut message, MAX_ERROR_BODY);
                return Err(ApiError::Http {
                    status: Some(status.as_u16()),
                    message,
                });
            }
            response.bytes().await.map_err(ApiError::from_reqwest)
        })?;

        parse_page(
            &body,
            &self.settings.records_pointer,
            self.settings.cursor_pointer.as_deref(),
        )
    }
}

/// Server-directed wait from a Retry-After header (delta-seconds form)
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map_or(DEFAULT_RATE_LIMIT_WAIT, |wait| wait.min(MAX_RATE_LIMIT_WAIT))
}

fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

/// Decode a response body into a [`Page`].
///
/// A body that is not JSON, or has no array at `records_pointer`, is a
/// malformed response (transient: proxies and overloaded servers produce these).
pub fn parse_page(
    body: &[u8],
    records_pointer: &str,
    cursor_pointer: Option<&str>,
) -> Result<Page, ApiError> {
    let mut doc: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    let next_cursor = cursor_pointer
        .and_then(|p| doc.pointer(p))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let records = match doc.pointer_mut(records_pointer).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) => Vec::new(),
        Some(_) => {
            return Err(ApiError::Decode(format!(
                "value at '{records_pointer}' is not an array"
            )));
        }
        None => {
            return Err(ApiError::Decode(format!(
                "no records at '{records_pointer}'"
            )));
        }
    };

    Ok(Page {
        records,
        next_cursor,
    })
}
