//! `syncline state` - inspect or reset stored bookmarks

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use syncline_engine::{BookmarkPath, BookmarkStore};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub action: StateAction,
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// List stored bookmarks
    Show,
    /// Remove a bookmark so the next sync starts from start_date
    Reset {
        /// Stream (or parent stream with --child)
        stream: String,

        /// Child stream nested beneath STREAM
        #[arg(long)]
        child: Option<String>,
    },
}

pub fn run(args: StateArgs, config: &Config) -> Result<()> {
    let mut store = BookmarkStore::open(&config.state_path)
        .with_context(|| format!("Failed to open state {}", config.state_path.display()))?;
    match args.action {
        StateAction::Show => {
            show(&store);
            Ok(())
        }
        StateAction::Reset { stream, child } => {
            let path = match &child {
                Some(child) => BookmarkPath::nested(&stream, child),
                None => BookmarkPath::root(&stream),
            };
            reset(&mut store, &path)
        }
    }
}

fn show(store: &BookmarkStore) {
    let entries = store.entries();
    if entries.is_empty() {
        eprintln!("No bookmarks stored.");
        return;
    }
    let mut table = super::table(&["Stream", "Key", "Bookmark"]);
    for entry in &entries {
        table.add_row(vec![entry.path.to_string(), entry.key.clone(), entry.value.clone()]);
    }
    eprintln!("\n{table}");
    if let Some(stream) = store.currently_syncing() {
        eprintln!("Interrupted during: {stream}");
    }
}

fn reset(store: &mut BookmarkStore, path: &BookmarkPath) -> Result<()> {
    if store.reset(path) {
        store.flush()?;
        eprintln!("Reset bookmark for {path}");
    } else {
        eprintln!("No bookmark stored for {path}");
    }
    Ok(())
}
