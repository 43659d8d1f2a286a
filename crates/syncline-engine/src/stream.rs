//! Stream configuration: one tagged description per entity type
//!
//! A stream is data, not a subclass: resource path, cursor kind, replication
//! key and optional parent link are all the engine needs to sync it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder in a child resource path replaced by the parent's id
pub const PARENT_ID_PLACEHOLDER: &str = "{parent_id}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    #[default]
    Incremental,
    FullTable,
}

impl ReplicationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "INCREMENTAL",
            Self::FullTable => "FULL_TABLE",
        }
    }
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the remote API pages through a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// Incrementing `page` parameter
    #[default]
    PageNumber,
    /// Server-issued continuation token
    OpaqueCursor,
    /// `since_id` = largest primary key seen so far; ordering is verified
    SinceId,
}

impl fmt::Display for CursorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PageNumber => "page_number",
            Self::OpaqueCursor => "opaque_cursor",
            Self::SinceId => "since_id",
        })
    }
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_string()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Unique stream name
    pub name: String,
    /// Resource path relative to the API base; children may use `{parent_id}`
    pub resource: String,
    /// Watermark field; absent for full-table streams
    #[serde(default)]
    pub replication_key: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub replication_method: ReplicationMethod,
    #[serde(default)]
    pub cursor: CursorKind,
    /// Parent stream name, for streams traversed per parent record
    #[serde(default)]
    pub parent: Option<String>,
    /// Request parameter carrying the parent id (in addition to path templating)
    #[serde(default)]
    pub parent_param: Option<String>,
    /// Subtracted from this child's bookmark when computing the parent sweep start
    #[serde(default)]
    pub lookback_secs: u64,
    #[serde(default = "default_true")]
    pub selected: bool,
    /// JSON schema forwarded to the sink; `{"type": "object"}` when absent
    #[serde(default)]
    pub schema: Option<Value>,
}

impl StreamConfig {
    /// Incremental page-number stream keyed on `id`, with no replication key yet
    pub fn new(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            replication_key: None,
            primary_key: default_primary_key(),
            replication_method: ReplicationMethod::Incremental,
            cursor: CursorKind::PageNumber,
            parent: None,
            parent_param: None,
            lookback_secs: 0,
            selected: true,
            schema: None,
        }
    }

    pub fn incremental(mut self, replication_key: &str) -> Self {
        self.replication_method = ReplicationMethod::Incremental;
        self.replication_key = Some(replication_key.to_string());
        self
    }

    pub fn full_table(mut self) -> Self {
        self.replication_method = ReplicationMethod::FullTable;
        self.replication_key = None;
        self
    }

    pub fn with_cursor(mut self, cursor: CursorKind) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn child_of(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn with_parent_param(mut self, param: &str) -> Self {
        self.parent_param = Some(param.to_string());
        self
    }

    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback_secs = lookback.num_seconds().max(0) as u64;
        self
    }

    pub fn deselected(mut self) -> Self {
        self.selected = false;
        self
    }

    /// Replication key, if this stream is bookmarked
    pub fn bookmark_key(&self) -> Option<&str> {
        match self.replication_method {
            ReplicationMethod::Incremental => self.replication_key.as_deref(),
            ReplicationMethod::FullTable => None,
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.bookmark_key().is_some()
    }

    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    pub fn lookback(&self) -> chrono::Duration {
        i64::try_from(self.lookback_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Field used for since-id ordering and parent scoping
    pub fn id_field(&self) -> &str {
        self.primary_key.first().map_or("id", String::as_str)
    }

    pub fn schema(&self) -> Value {
        self.schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({"type": "object"}))
    }

    /// Resource path for this stream scoped beneath one parent record
    pub fn scoped_resource(&self, parent_id: &str) -> String {
        self.resource.replace(PARENT_ID_PLACEHOLDER, parent_id)
    }

    /// Replication-key value of a record, when present and parseable
    pub fn replication_value(&self, record: &Value) -> Option<DateTime<Utc>> {
        self.bookmark_key()
            .and_then(|key| record.get(key))
            .and_then(parse_timestamp)
    }

    /// Numeric primary key (since-id pagination)
    pub fn record_id(&self, record: &Value) -> Option<u64> {
        match record.get(self.id_field())? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Primary key rendered for use in a child request
    pub fn record_key(&self, record: &Value) -> Option<String> {
        match record.get(self.id_field())? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// RFC 3339 string or integer epoch seconds
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}
