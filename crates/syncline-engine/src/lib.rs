//! Syncline Engine - incremental replication over paginated APIs
//!
//! Turns "everything changed since T" into bounded, windowed, paginated
//! sweeps; tracks per-stream bookmarks (including children scoped beneath a
//! parent) and commits them at window granularity so an interrupted run
//! resumes with at most one window of duplicate work.

pub mod bookmark;
pub mod context;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod paginator;
pub mod runner;
pub mod sink;
pub mod stream;
pub mod window;

// Re-exports
pub use bookmark::{BookmarkEntry, BookmarkPath, BookmarkStore, State};
pub use context::{MAX_PAGE_SIZE, SyncConfig, SyncContext};
pub use cursor::CursorStrategy;
pub use engine::{StreamEngine, StreamStats, SyncPlan};
pub use error::{BookmarkError, SyncError};
pub use hierarchy::StreamHierarchy;
pub use paginator::{OrderingGuard, OrderingViolation, Sweep, ViolationKind, WindowedPaginator};
pub use runner::{RunSummary, plan_trees, run_sync};
pub use sink::{JsonLinesSink, MemorySink, Message, Sink};
pub use stream::{CursorKind, ReplicationMethod, StreamConfig};
pub use window::{Window, Windows};
