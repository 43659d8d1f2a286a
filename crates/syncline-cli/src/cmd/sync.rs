//! `syncline sync` - run every configured stream tree

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use syncline_core::{HttpTransport, RateLimitedClient, SharedProgress, SystemClock, fmt_num};
use syncline_engine::{BookmarkStore, JsonLinesSink, RunSummary, Sink, StreamConfig, SyncContext, run_sync};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Write messages to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only sync these streams (comma-separated); parents of listed
    /// children are still traversed
    #[arg(long, value_delimiter = ',')]
    pub streams: Vec<String>,
}

pub fn run(args: SyncArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let sync_config = config.sync_config()?;
    let streams = select(&config.streams, &args.streams)?;
    if streams.is_empty() {
        bail!("No streams configured");
    }

    let transport = HttpTransport::new(config.http_settings()).context("Failed to build HTTP client")?;
    let client = RateLimitedClient::new(
        Box::new(transport),
        config.retry_policy(),
        Arc::new(SystemClock),
    );
    let bookmarks = BookmarkStore::open(&config.state_path)?;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    log::info!(
        "Syncing {} streams from {} (state: {})",
        streams.len(),
        sync_config.start_date.to_rfc3339(),
        config.state_path.display()
    );

    let mut ctx = SyncContext::new(sync_config, Arc::new(client), bookmarks, JsonLinesSink::new(writer))
        .with_progress(Arc::clone(progress));
    let result = run_sync(&mut ctx, &streams);
    ctx.sink.flush().context("Failed to flush output")?;
    let summary = result?;

    print_summary(&summary);
    Ok(())
}

/// Apply `--streams`: listed streams stay selected, everything else is deselected
fn select(streams: &[StreamConfig], only: &[String]) -> Result<Vec<StreamConfig>> {
    if only.is_empty() {
        return Ok(streams.to_vec());
    }
    if let Some(unknown) = only.iter().find(|n| !streams.iter().any(|s| &s.name == *n)) {
        bail!("Unknown stream '{unknown}'");
    }
    Ok(streams
        .iter()
        .cloned()
        .map(|mut s| {
            s.selected = s.selected && only.contains(&s.name);
            s
        })
        .collect())
}

fn print_summary(summary: &RunSummary) {
    let mut table = super::table(&["Stream", "Records", "Windows"]);
    for stats in &summary.streams {
        table.add_row(vec![
            stats.stream.clone(),
            fmt_num(stats.records as usize),
            stats.windows.to_string(),
        ]);
    }
    eprintln!("\n{table}");
    eprintln!("Total: {} records", fmt_num(summary.total_records() as usize));
}
