//! "How to ask for the next page", one variant per API pagination shape

use syncline_core::{Page, PageRequest};

use crate::stream::{CursorKind, StreamConfig};

/// Query parameter names understood by the remote API
pub mod params {
    pub const UPDATED_MIN: &str = "updated_at_min";
    pub const UPDATED_MAX: &str = "updated_at_max";
    pub const ORDER: &str = "order";
    pub const LIMIT: &str = "limit";
    pub const PAGE: &str = "page";
    pub const CURSOR: &str = "cursor";
    pub const SINCE_ID: &str = "since_id";
}

/// Pagination position within one window.
///
/// Neither variant carries position across windows: a PageNumber resume
/// restarts at page 1 of the current window, and an opaque token is never
/// reused once its window is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorStrategy {
    PageNumber { page: u32 },
    OpaqueCursor { token: Option<String> },
    SinceId { id_field: String, since_id: u64 },
}

impl CursorStrategy {
    pub fn for_stream(stream: &StreamConfig) -> Self {
        match stream.cursor {
            CursorKind::PageNumber => Self::PageNumber { page: 1 },
            CursorKind::OpaqueCursor => Self::OpaqueCursor { token: None },
            CursorKind::SinceId => Self::SinceId {
                id_field: stream.id_field().to_string(),
                since_id: 0,
            },
        }
    }

    /// Ordering field the remote API must sort by for this strategy
    pub fn order_field<'a>(&'a self, replication_key: Option<&'a str>) -> Option<&'a str> {
        match self {
            Self::SinceId { id_field, .. } => Some(id_field.as_str()),
            _ => replication_key,
        }
    }

    /// Rewind to the start of the window
    pub fn reset(&mut self) {
        match self {
            Self::PageNumber { page } => *page = 1,
            Self::OpaqueCursor { token } => *token = None,
            Self::SinceId { since_id, .. } => *since_id = 0,
        }
    }

    /// Request for the first page of the window described by `base`
    pub fn first_request(&mut self, base: &PageRequest) -> PageRequest {
        self.reset();
        self.apply(base)
    }

    /// Request following `prior`, or `None` when the window is exhausted
    pub fn next_request(
        &mut self,
        prior: &Page,
        base: &PageRequest,
        page_size: usize,
    ) -> Option<PageRequest> {
        match self {
            Self::PageNumber { page } => {
                if prior.len() < page_size {
                    return None;
                }
                *page += 1;
            }
            Self::OpaqueCursor { token } => {
                let next = prior.next_cursor.clone()?;
                if token.as_deref() == Some(next.as_str()) {
                    log::warn!("{}: server repeated cursor {next}, stopping", base.resource);
                    return None;
                }
                *token = Some(next);
            }
            Self::SinceId { id_field, since_id } => {
                if prior.len() < page_size {
                    return None;
                }
                let last = prior.records.last()?.get(id_field.as_str())?;
                *since_id = match last {
                    serde_json::Value::Number(n) => n.as_u64()?,
                    serde_json::Value::String(s) => s.parse().ok()?,
                    _ => return None,
                };
            }
        }
        Some(self.apply(base))
    }

    fn apply(&self, base: &PageRequest) -> PageRequest {
        let mut request = base.clone();
        match self {
            Self::PageNumber { page } => request.set(params::PAGE, page.to_string()),
            Self::OpaqueCursor { token: Some(token) } => request.set(params::CURSOR, token.clone()),
            Self::OpaqueCursor { token: None } => {}
            Self::SinceId { since_id, .. } => request.set(params::SINCE_ID, since_id.to_string()),
        }
        request
    }
}
