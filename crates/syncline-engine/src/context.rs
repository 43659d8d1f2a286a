//! Explicit per-run context handed to every engine

use std::sync::Arc;

use chrono::{DateTime, Utc};
use syncline_core::{ProgressContext, RateLimitedClient, SharedProgress, is_shutdown_requested};

use crate::bookmark::BookmarkStore;
use crate::sink::Sink;

/// Largest page the remote API serves
pub const MAX_PAGE_SIZE: usize = 250;

pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// Sync-wide settings
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Floor for every bookmark
    pub start_date: DateTime<Utc>,
    /// Caps `stop` below the current time
    pub end_date: Option<DateTime<Utc>>,
    pub window_size: chrono::Duration,
    pub page_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_date: DateTime::<Utc>::UNIX_EPOCH,
            end_date: None,
            window_size: chrono::Duration::days(DEFAULT_WINDOW_DAYS),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl SyncConfig {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> usize {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Upper bound of a tree sync started at `now`
    pub fn stop(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end_date.map_or(now, |end| end.min(now))
    }
}

type InterruptCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Everything a stream sync reads from or writes to.
pub struct SyncContext<S: Sink> {
    pub config: SyncConfig,
    pub client: Arc<RateLimitedClient>,
    pub bookmarks: BookmarkStore,
    pub sink: S,
    pub progress: SharedProgress,
    interrupt: InterruptCheck,
}

impl<S: Sink> std::fmt::Debug for SyncContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("bookmarks", &self.bookmarks)
            .finish_non_exhaustive()
    }
}

impl<S: Sink> SyncContext<S> {
    pub fn new(
        config: SyncConfig,
        client: Arc<RateLimitedClient>,
        bookmarks: BookmarkStore,
        sink: S,
    ) -> Self {
        Self {
            config,
            client,
            bookmarks,
            sink,
            progress: Arc::new(ProgressContext::hidden()),
            interrupt: Box::new(is_shutdown_requested),
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the process shutdown flag as the interrupt source
    pub fn with_interrupt(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.interrupt = Box::new(check);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.client.clock().now()
    }

    /// Stop time for a sync starting now
    pub fn stop(&self) -> DateTime<Utc> {
        self.config.stop(self.now())
    }

    pub fn interrupted(&self) -> bool {
        (self.interrupt)()
    }
}
