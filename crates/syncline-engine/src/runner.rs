//! Run driver: group configured streams into trees and sync them in turn

use std::collections::HashSet;

use crate::context::SyncContext;
use crate::engine::StreamStats;
use crate::error::SyncError;
use crate::hierarchy::StreamHierarchy;
use crate::sink::Sink;
use crate::stream::StreamConfig;

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub streams: Vec<StreamStats>,
}

impl RunSummary {
    pub fn total_records(&self) -> u64 {
        self.streams.iter().map(|s| s.records).sum()
    }

    pub fn get(&self, stream: &str) -> Option<&StreamStats> {
        self.streams.iter().find(|s| s.stream == stream)
    }
}

/// Build one hierarchy per root stream, in configuration order.
///
/// Children must name an existing root stream; nesting deeper than one level
/// and duplicate names are rejected.
pub fn plan_trees(streams: &[StreamConfig]) -> Result<Vec<StreamHierarchy>, SyncError> {
    let mut seen = HashSet::new();
    for stream in streams {
        if !seen.insert(stream.name.as_str()) {
            return Err(SyncError::Config(format!(
                "duplicate stream name '{}'",
                stream.name
            )));
        }
    }

    for child in streams.iter().filter(|s| s.is_child()) {
        let parent_name = child.parent.as_deref().unwrap_or_default();
        let Some(parent) = streams.iter().find(|s| s.name == parent_name) else {
            return Err(SyncError::Config(format!(
                "stream '{}' names unknown parent '{parent_name}'",
                child.name
            )));
        };
        if parent.is_child() {
            return Err(SyncError::Config(format!(
                "stream '{}' is a child of child stream '{parent_name}'",
                child.name
            )));
        }
    }

    Ok(streams
        .iter()
        .filter(|s| !s.is_child())
        .map(|root| {
            let children: Vec<StreamConfig> = streams
                .iter()
                .filter(|s| s.parent.as_deref() == Some(root.name.as_str()))
                .cloned()
                .collect();
            StreamHierarchy::new(root, &children)
        })
        .collect())
}

/// Sync every configured stream tree.
///
/// A tree left unfinished by a previous run (`currently_syncing`) goes
/// first. The first error aborts the run; bookmarks committed so far stay.
pub fn run_sync<S: Sink>(
    ctx: &mut SyncContext<S>,
    streams: &[StreamConfig],
) -> Result<RunSummary, SyncError> {
    let mut trees = plan_trees(streams)?;
    trees.retain(|tree| {
        if tree.is_idle() {
            log::debug!("{}: nothing selected, skipping", tree.name());
        }
        !tree.is_idle()
    });

    if let Some(resumed) = ctx.bookmarks.currently_syncing() {
        if let Some(pos) = trees.iter().position(|t| t.name() == resumed) {
            log::info!("Resuming interrupted sync of {resumed}");
            let tree = trees.remove(pos);
            trees.insert(0, tree);
        }
    }

    let mut summary = RunSummary::default();
    for tree in &trees {
        ctx.bookmarks.set_currently_syncing(Some(tree.name()));
        ctx.bookmarks.flush()?;
        match tree.sync(ctx) {
            Ok(stats) => summary.streams.extend(stats),
            Err(e) => {
                if !matches!(e, SyncError::Interrupted) {
                    log::error!("{}: sync aborted: {e}", tree.name());
                }
                return Err(e);
            }
        }
    }

    ctx.bookmarks.set_currently_syncing(None);
    ctx.sink.emit_state(&ctx.bookmarks.snapshot())?;
    ctx.bookmarks.flush()?;
    log::info!(
        "Sync complete: {} records across {} streams",
        summary.total_records(),
        summary.streams.len()
    );
    Ok(summary)
}
