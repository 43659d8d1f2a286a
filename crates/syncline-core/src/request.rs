//! Request and page shapes exchanged with the remote API

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// One logical page request: a resource path plus its filter parameters.
///
/// Parameters are kept in a `BTreeMap` so that the rendered request (and the
/// log line describing it) is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub resource: String,
    pub params: BTreeMap<String, String>,
}

impl PageRequest {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insert
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

/// One fetched page of records.
///
/// `next_cursor` is the server-issued continuation token, if the API uses
/// opaque cursors; page-number and since-id pagination ignore it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
