//! Error types for stream synchronisation

use std::path::PathBuf;

use syncline_core::ClientError;

use crate::paginator::OrderingViolation;

/// Failure reading or persisting the bookmark state file
#[derive(Debug)]
pub enum BookmarkError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "state file {}: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "state file {} is not valid JSON: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for BookmarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

/// Error aborting a stream tree's sync.
///
/// Every variant is fatal for the current run. Bookmarks committed before the
/// error remain valid resume points.
#[derive(Debug)]
pub enum SyncError {
    /// Remote API failed permanently or exhausted transient retries
    Client(ClientError),
    /// Remote pagination broke its ordering contract
    OutOfOrder(OrderingViolation),
    /// A record lacks a field the engine needs (e.g. the parent id for child scoping)
    MalformedRecord { stream: String, reason: String },
    Bookmark(BookmarkError),
    Sink(std::io::Error),
    /// Stream configuration is inconsistent
    Config(String),
    /// Shutdown requested; progress up to the last committed window is saved
    Interrupted,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(e) => write!(f, "API: {e}"),
            Self::OutOfOrder(v) => write!(f, "{v}"),
            Self::MalformedRecord { stream, reason } => {
                write!(f, "{stream}: malformed record: {reason}")
            }
            Self::Bookmark(e) => write!(f, "{e}"),
            Self::Sink(e) => write!(f, "sink: {e}"),
            Self::Config(msg) => write!(f, "invalid stream configuration: {msg}"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Client(e) => Some(e),
            Self::OutOfOrder(v) => Some(v),
            Self::Bookmark(e) => Some(e),
            Self::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ClientError> for SyncError {
    fn from(e: ClientError) -> Self {
        Self::Client(e)
    }
}

impl From<OrderingViolation> for SyncError {
    fn from(v: OrderingViolation) -> Self {
        Self::OutOfOrder(v)
    }
}

impl From<BookmarkError> for SyncError {
    fn from(e: BookmarkError) -> Self {
        Self::Bookmark(e)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::Sink(e)
    }
}
