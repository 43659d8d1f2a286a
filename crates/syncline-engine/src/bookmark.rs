//! Durable per-stream watermarks
//!
//! Persisted layout (one JSON document):
//! ```text
//! {
//!   "bookmarks": {
//!     "orders":   { "updated_at": "2021-04-21T00:00:00Z" },
//!     "products": { "updated_at": "...",
//!                   "variants": { "updated_at": "..." } }   // child beneath parent
//!   },
//!   "currently_syncing": "products"
//! }
//! ```

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BookmarkError;
use crate::stream::parse_timestamp;

/// Address of one bookmark
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BookmarkPath {
    Root(String),
    Nested { parent: String, child: String },
}

impl BookmarkPath {
    pub fn root(stream: &str) -> Self {
        Self::Root(stream.to_string())
    }

    pub fn nested(parent: &str, child: &str) -> Self {
        Self::Nested {
            parent: parent.to_string(),
            child: child.to_string(),
        }
    }

    /// Stream whose progress this path records
    pub fn stream(&self) -> &str {
        match self {
            Self::Root(stream) => stream,
            Self::Nested { child, .. } => child,
        }
    }
}

impl fmt::Display for BookmarkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(stream) => f.write_str(stream),
            Self::Nested { parent, child } => write!(f, "{parent}/{child}"),
        }
    }
}

/// Serialized state document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub bookmarks: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currently_syncing: Option<String>,
}

/// One stored watermark, flattened for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkEntry {
    pub path: BookmarkPath,
    pub key: String,
    pub value: String,
}

/// Single-writer bookmark store with write-through persistence.
///
/// `set` is monotonic: a watermark below the stored one is ignored. Only
/// [`BookmarkStore::reset`] can move a bookmark backwards.
#[derive(Debug)]
pub struct BookmarkStore {
    state: State,
    path: Option<PathBuf>,
}

pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl BookmarkStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            state: State::default(),
            path: None,
        }
    }

    pub fn from_state(state: State) -> Self {
        Self { state, path: None }
    }

    /// Open the state file at `path`; a missing file is an empty state.
    pub fn open(path: &Path) -> Result<Self, BookmarkError> {
        let state = match fs::read_to_string(path) {
            Ok(json) if json.trim().is_empty() => State::default(),
            Ok(json) => serde_json::from_str(&json).map_err(|source| BookmarkError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No state at {}, starting fresh", path.display());
                State::default()
            }
            Err(source) => {
                return Err(BookmarkError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Ok(Self {
            state,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Container object holding `path`'s watermark keys, if it exists
    fn container(&self, path: &BookmarkPath) -> Option<&Map<String, Value>> {
        match path {
            BookmarkPath::Root(stream) => self.state.bookmarks.get(stream)?.as_object(),
            BookmarkPath::Nested { parent, child } => {
                let Some(parent_map) = self.state.bookmarks.get(parent).and_then(Value::as_object)
                else {
                    log::debug!("{path}: no bookmarks for parent {parent}");
                    return None;
                };
                let Some(child_map) = parent_map.get(child).and_then(Value::as_object) else {
                    log::debug!("{path}: parent {parent} has no entry for {child}");
                    return None;
                };
                Some(child_map)
            }
        }
    }

    fn container_mut(&mut self, path: &BookmarkPath) -> &mut Map<String, Value> {
        fn object_at<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
            let slot = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                log::warn!("Replacing non-object bookmark entry '{key}'");
                *slot = Value::Object(Map::new());
            }
            match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            }
        }

        match path {
            BookmarkPath::Root(stream) => object_at(&mut self.state.bookmarks, stream),
            BookmarkPath::Nested { parent, child } => {
                let parent_map = object_at(&mut self.state.bookmarks, parent);
                object_at(parent_map, child)
            }
        }
    }

    /// Stored watermark, or `None` when any level of the path is missing
    pub fn get(&self, path: &BookmarkPath, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.container(path)?.get(key)?;
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            log::warn!("{path}: ignoring unparseable bookmark {key}={raw}");
        }
        parsed
    }

    /// Stored watermark, falling back to `floor` when absent
    pub fn get_or(&self, path: &BookmarkPath, key: &str, floor: DateTime<Utc>) -> DateTime<Utc> {
        self.get(path, key).unwrap_or(floor)
    }

    /// Advance a watermark. Returns `false` (and stores nothing) if `value`
    /// is below the current one.
    pub fn set(&mut self, path: &BookmarkPath, key: &str, value: DateTime<Utc>) -> bool {
        if let Some(current) = self.get(path, key) {
            if value < current {
                log::warn!(
                    "{path}: refusing to move bookmark {key} back from {} to {}",
                    format_watermark(current),
                    format_watermark(value)
                );
                return false;
            }
        }
        self.container_mut(path)
            .insert(key.to_string(), Value::String(format_watermark(value)));
        true
    }

    /// Explicit override: drop the watermark(s) stored at `path`.
    ///
    /// Resetting a root stream leaves bookmarks of its children intact.
    pub fn reset(&mut self, path: &BookmarkPath) -> bool {
        match path {
            BookmarkPath::Root(stream) => {
                let Some(map) = self
                    .state
                    .bookmarks
                    .get_mut(stream)
                    .and_then(Value::as_object_mut)
                else {
                    return false;
                };
                let before = map.len();
                map.retain(|_, v| v.is_object());
                let removed = map.len() != before;
                if map.is_empty() {
                    self.state.bookmarks.remove(stream);
                }
                removed
            }
            BookmarkPath::Nested { parent, child } => {
                let Some(map) = self
                    .state
                    .bookmarks
                    .get_mut(parent)
                    .and_then(Value::as_object_mut)
                else {
                    return false;
                };
                let removed = map.remove(child).is_some();
                if map.is_empty() {
                    self.state.bookmarks.remove(parent);
                }
                removed
            }
        }
    }

    pub fn currently_syncing(&self) -> Option<&str> {
        self.state.currently_syncing.as_deref()
    }

    pub fn set_currently_syncing(&mut self, stream: Option<&str>) {
        self.state.currently_syncing = stream.map(String::from);
    }

    /// Current state as JSON, for state messages
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(&self.state).unwrap_or(Value::Null)
    }

    /// Every stored watermark, in path order
    pub fn entries(&self) -> Vec<BookmarkEntry> {
        let mut out = Vec::new();
        for (stream, value) in &self.state.bookmarks {
            let Some(map) = value.as_object() else { continue };
            for (key, v) in map {
                match v {
                    Value::Object(child_map) => {
                        for (child_key, cv) in child_map {
                            out.push(BookmarkEntry {
                                path: BookmarkPath::nested(stream, key),
                                key: child_key.clone(),
                                value: render(cv),
                            });
                        }
                    }
                    other => out.push(BookmarkEntry {
                        path: BookmarkPath::root(stream),
                        key: key.clone(),
                        value: render(other),
                    }),
                }
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.key.cmp(&b.key)));
        out
    }

    /// Durably persist the current state: write `*.tmp`, then rename over the file.
    pub fn flush(&self) -> Result<(), BookmarkError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| BookmarkError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.state).map_err(|source| {
            BookmarkError::Json {
                path: path.clone(),
                source,
            }
        })?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = File::create(&tmp).map_err(io_err)?;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

fn render(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
