//! `syncline config` - show effective settings

use anyhow::Result;

use crate::config::Config;

pub fn show(config: &Config) -> Result<()> {
    let mut table = super::table(&["Setting", "Value"]);
    let or_unset = |v: Option<&str>| v.unwrap_or("not set").to_string();

    table.add_row(vec!["Start date".to_string(), or_unset(config.start_date.as_deref())]);
    table.add_row(vec!["End date".to_string(), or_unset(config.end_date.as_deref())]);
    table.add_row(vec![
        "Window".to_string(),
        format!("{} days", config.window_size_days),
    ]);
    table.add_row(vec!["Page size".to_string(), config.page_size.to_string()]);
    table.add_row(vec![
        "Request timeout".to_string(),
        format!("{}s", config.request_timeout),
    ]);
    table.add_row(vec![
        "State file".to_string(),
        config.state_path.display().to_string(),
    ]);
    table.add_row(vec!["API base URL".to_string(), config.api.base_url.clone()]);
    table.add_row(vec![
        "API token".to_string(),
        if config.api.token.is_some() {
            format!("configured ({})", config.api.auth_header)
        } else {
            "not set".to_string()
        },
    ]);
    table.add_row(vec![
        "Retries".to_string(),
        format!(
            "{} attempts, {}s-{}s backoff",
            config.retry.max_attempts, config.retry.base_delay_secs, config.retry.max_delay_secs
        ),
    ]);
    eprintln!("\n{table}");

    if config.streams.is_empty() {
        eprintln!("No streams configured.");
        return Ok(());
    }
    let mut streams = super::table(&["Stream", "Parent", "Method", "Cursor", "Key", "Selected"]);
    for s in &config.streams {
        streams.add_row(vec![
            s.name.clone(),
            s.parent.clone().unwrap_or_default(),
            s.replication_method.to_string(),
            s.cursor.to_string(),
            s.bookmark_key().unwrap_or("-").to_string(),
            if s.selected { "yes" } else { "no" }.to_string(),
        ]);
    }
    eprintln!("{streams}");
    Ok(())
}
