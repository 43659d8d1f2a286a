//! One stream's incremental sync: windows from bookmark to stop, committed
//! one window at a time

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use syncline_core::fmt_num;

use crate::bookmark::{BookmarkPath, BookmarkStore, format_watermark};
use crate::context::SyncContext;
use crate::error::SyncError;
use crate::hierarchy::ChildTraversal;
use crate::paginator::WindowedPaginator;
use crate::sink::Sink;
use crate::stream::StreamConfig;
use crate::window::{Window, Windows};

/// Records emitted and windows committed for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub stream: String,
    pub records: u64,
    pub windows: u64,
}

impl StreamStats {
    pub fn new(stream: &str) -> Self {
        Self {
            stream: stream.to_string(),
            ..Self::default()
        }
    }
}

/// Bounds of one sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPlan {
    /// First window's lower bound
    pub start: DateTime<Utc>,
    /// Captured once; last window ends here
    pub stop: DateTime<Utc>,
    /// Records below this replication value are fetched but not emitted
    pub emit_floor: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StreamEngine {
    stream: StreamConfig,
    path: BookmarkPath,
}

impl StreamEngine {
    pub fn new(stream: &StreamConfig) -> Self {
        let path = match &stream.parent {
            Some(parent) => BookmarkPath::nested(parent, &stream.name),
            None => BookmarkPath::root(&stream.name),
        };
        Self {
            stream: stream.clone(),
            path,
        }
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn path(&self) -> &BookmarkPath {
        &self.path
    }

    /// Stored bookmark, never below `floor`
    pub fn bookmark(&self, store: &BookmarkStore, floor: DateTime<Utc>) -> DateTime<Utc> {
        self.stream
            .bookmark_key()
            .and_then(|key| store.get(&self.path, key))
            .map_or(floor, |bm| bm.max(floor))
    }

    /// Whether `record` is new relative to `emit_floor`.
    ///
    /// Records without a parseable replication value cannot be proven old and
    /// are emitted.
    pub(crate) fn is_new(&self, record: &Value, emit_floor: DateTime<Utc>) -> bool {
        if !self.stream.is_incremental() {
            return true;
        }
        match self.stream.replication_value(record) {
            Some(value) => value >= emit_floor,
            None => {
                log::debug!(
                    "{}: record without usable {} emitted",
                    self.stream.name,
                    self.stream.replication_key.as_deref().unwrap_or_default()
                );
                true
            }
        }
    }

    pub(crate) fn emit_schema<S: Sink>(&self, ctx: &mut SyncContext<S>) -> Result<(), SyncError> {
        if !self.stream.selected {
            return Ok(());
        }
        ctx.sink.emit_schema(
            &self.stream.name,
            &self.stream.schema(),
            &self.stream.primary_key,
            self.stream.bookmark_key(),
        )?;
        Ok(())
    }

    /// Sync this stream alone, from its bookmark up to now.
    pub fn sync<S: Sink>(&self, ctx: &mut SyncContext<S>) -> Result<StreamStats, SyncError> {
        let floor = ctx.config.start_date;
        let bookmark = self.bookmark(&ctx.bookmarks, floor);
        let plan = SyncPlan {
            start: bookmark,
            stop: ctx.stop(),
            emit_floor: bookmark,
        };
        self.emit_schema(ctx)?;
        self.execute(ctx, plan, &mut [])
    }

    /// Sweep every window of `plan`, visiting `children` for each record.
    ///
    /// After each window this stream's bookmark advances to `window.max`, a
    /// state message is emitted and state is flushed. Child bookmarks stay put
    /// until the last window: a parent in a later window may still own child
    /// records older than an early `window.max`.
    pub(crate) fn execute<S: Sink>(
        &self,
        ctx: &mut SyncContext<S>,
        plan: SyncPlan,
        children: &mut [ChildTraversal<'_>],
    ) -> Result<StreamStats, SyncError> {
        let name = self.stream.name.as_str();
        let client = Arc::clone(&ctx.client);
        let page_size = ctx.config.page_size();
        let paginator = WindowedPaginator::new(&client, &self.stream, page_size);
        let pb = ctx.progress.stream_line(name);
        let mut stats = StreamStats::new(name);

        // Full-table streams get one unbounded pass
        let windows: Vec<Option<Window>> = if self.stream.is_incremental() {
            Windows::new(plan.start, plan.stop, ctx.config.window_size)
                .map(Some)
                .collect()
        } else {
            vec![None]
        };

        log::info!(
            "{name}: syncing {} -> {} ({} windows)",
            format_watermark(plan.start),
            format_watermark(plan.stop),
            windows.len()
        );

        let last = windows.len().saturating_sub(1);
        for (index, window) in windows.into_iter().enumerate() {
            let mut emitted = 0u64;
            for record in paginator.sweep(window, None) {
                let record = record?;
                if self.stream.selected && self.is_new(&record, plan.emit_floor) {
                    let extracted = ctx.now();
                    ctx.sink.emit_record(name, &record, extracted)?;
                    emitted += 1;
                }
                for child in children.iter_mut() {
                    child.visit(ctx, &client, &self.stream, &record, plan.stop)?;
                }
            }

            let watermark = window.map_or(plan.stop, |w| w.max);
            // A lookback-widened sweep revisits windows below the bookmark
            if self.stream.selected && watermark > plan.emit_floor {
                if let Some(key) = self.stream.bookmark_key() {
                    ctx.bookmarks.set(&self.path, key, watermark);
                }
            }
            for child in children.iter_mut() {
                child.window_done();
                if index == last {
                    child.commit(ctx, plan.stop);
                }
            }
            ctx.sink.emit_state(&ctx.bookmarks.snapshot())?;
            ctx.bookmarks.flush()?;

            stats.records += emitted;
            stats.windows += 1;
            match window {
                Some(w) => log::info!("{name}: committed {w}, {emitted} records"),
                None => log::info!("{name}: full table pass, {emitted} records"),
            }
            pb.set_message(format!(
                "{} · {} records",
                format_watermark(watermark),
                fmt_num(stats.records as usize)
            ));

            if ctx.interrupted() {
                log::warn!("{name}: interrupted after committing {}", format_watermark(watermark));
                pb.abandon();
                return Err(SyncError::Interrupted);
            }
        }

        pb.finish_and_clear();
        log::info!(
            "{name}: done, {} records in {} windows",
            stats.records,
            stats.windows
        );
        Ok(stats)
    }
}
