//! Parent stream plus the child streams traversed once per parent record
//!
//! The parent sweep has to start early enough to revisit every parent whose
//! children changed since the oldest child bookmark, so the start is the
//! minimum over the parent's and all selected children's bookmarks. Child
//! bookmarks only advance once the whole parent sweep up to `stop` is done.

use chrono::{DateTime, Utc};
use serde_json::Value;
use syncline_core::RateLimitedClient;

use crate::bookmark::BookmarkStore;
use crate::context::SyncContext;
use crate::engine::{StreamEngine, StreamStats, SyncPlan};
use crate::error::SyncError;
use crate::paginator::WindowedPaginator;
use crate::sink::Sink;
use crate::stream::StreamConfig;
use crate::window::Window;

#[derive(Debug, Clone)]
pub struct StreamHierarchy {
    parent: StreamEngine,
    children: Vec<StreamEngine>,
}

impl StreamHierarchy {
    /// Unselected children are dropped; an unselected parent is still
    /// traversed for its children.
    pub fn new(parent: &StreamConfig, children: &[StreamConfig]) -> Self {
        Self {
            parent: StreamEngine::new(parent),
            children: children
                .iter()
                .filter(|c| c.selected)
                .map(StreamEngine::new)
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.parent.stream().name
    }

    pub fn parent(&self) -> &StreamEngine {
        &self.parent
    }

    pub fn children(&self) -> &[StreamEngine] {
        &self.children
    }

    /// Nothing in the tree would be emitted
    pub fn is_idle(&self) -> bool {
        !self.parent.stream().selected && self.children.is_empty()
    }

    /// `max(floor, min(parent bookmark, min over children of (bookmark - lookback)))`
    pub fn effective_start(
        &self,
        store: &BookmarkStore,
        floor: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let parent = self
            .parent
            .stream()
            .selected
            .then(|| self.parent.bookmark(store, floor));
        let children = self
            .children
            .iter()
            .filter(|c| c.stream().is_incremental())
            .map(|c| child_sweep_start(c, store, floor));

        parent
            .into_iter()
            .chain(children)
            .min()
            .map_or(floor, |start| start.max(floor))
    }

    /// Sync the parent and, per parent record, every selected child.
    pub fn sync<S: Sink>(&self, ctx: &mut SyncContext<S>) -> Result<Vec<StreamStats>, SyncError> {
        let floor = ctx.config.start_date;
        let plan = SyncPlan {
            start: self.effective_start(&ctx.bookmarks, floor),
            stop: ctx.stop(),
            emit_floor: self.parent.bookmark(&ctx.bookmarks, floor),
        };

        self.parent.emit_schema(ctx)?;
        for child in &self.children {
            child.emit_schema(ctx)?;
        }

        let mut traversals: Vec<ChildTraversal<'_>> = self
            .children
            .iter()
            .map(|engine| ChildTraversal::new(engine, &ctx.bookmarks, floor))
            .collect();
        if !traversals.is_empty() {
            log::info!(
                "{}: sweeping from {} to cover {} child stream(s)",
                self.name(),
                plan.start.to_rfc3339(),
                traversals.len()
            );
        }

        let parent = self.parent.execute(ctx, plan, &mut traversals)?;
        let mut stats = Vec::with_capacity(traversals.len() + 1);
        if self.parent.stream().selected {
            stats.push(parent);
        }
        stats.extend(traversals.into_iter().map(|t| t.stats));
        Ok(stats)
    }
}

fn child_sweep_start(
    child: &StreamEngine,
    store: &BookmarkStore,
    floor: DateTime<Utc>,
) -> DateTime<Utc> {
    child
        .bookmark(store, floor)
        .checked_sub_signed(child.stream().lookback())
        .map_or(floor, |start| start.max(floor))
}

/// Per-sync state of one child stream beneath the parent.
#[derive(Debug)]
pub(crate) struct ChildTraversal<'a> {
    engine: &'a StreamEngine,
    /// Child bookmark captured at sync start; emission filter
    emit_floor: DateTime<Utc>,
    sweep_start: DateTime<Utc>,
    stats: StreamStats,
}

impl<'a> ChildTraversal<'a> {
    pub(crate) fn new(
        engine: &'a StreamEngine,
        store: &BookmarkStore,
        floor: DateTime<Utc>,
    ) -> Self {
        Self {
            engine,
            emit_floor: engine.bookmark(store, floor),
            sweep_start: child_sweep_start(engine, store, floor),
            stats: StreamStats::new(&engine.stream().name),
        }
    }

    /// Sweep this child scoped to one parent record and emit what is new.
    pub(crate) fn visit<S: Sink>(
        &mut self,
        ctx: &mut SyncContext<S>,
        client: &RateLimitedClient,
        parent: &StreamConfig,
        parent_record: &Value,
        stop: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let engine = self.engine;
        let stream = engine.stream();
        let parent_id = parent
            .record_key(parent_record)
            .ok_or_else(|| SyncError::MalformedRecord {
                stream: parent.name.clone(),
                reason: format!(
                    "no '{}' to scope child stream {}",
                    parent.id_field(),
                    stream.name
                ),
            })?;

        let window = if stream.is_incremental() {
            let window = Window::new(self.sweep_start, stop);
            if window.is_empty() {
                return Ok(());
            }
            Some(window)
        } else {
            None
        };

        let paginator = WindowedPaginator::new(client, stream, ctx.config.page_size());
        for record in paginator.sweep(window, Some(&parent_id)) {
            let record = record?;
            if engine.is_new(&record, self.emit_floor) {
                let extracted = ctx.now();
                ctx.sink.emit_record(&stream.name, &record, extracted)?;
                self.stats.records += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn window_done(&mut self) {
        self.stats.windows += 1;
    }

    /// Parent sweep complete: advance the nested bookmark.
    pub(crate) fn commit<S: Sink>(&mut self, ctx: &mut SyncContext<S>, watermark: DateTime<Utc>) {
        if let Some(key) = self.engine.stream().bookmark_key() {
            ctx.bookmarks.set(self.engine.path(), key, watermark);
        }
    }
}
