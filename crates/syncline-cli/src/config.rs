//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use syncline_core::{HttpSettings, RetryPolicy};
use syncline_engine::{StreamConfig, SyncConfig};

/// Global configuration for syncline
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Floor for every bookmark (`YYYY-MM-DD` or RFC 3339)
    pub start_date: Option<String>,
    /// Upper bound for every sync
    pub end_date: Option<String>,
    pub window_size_days: i64,
    pub page_size: usize,
    /// Per-request timeout in seconds
    pub request_timeout: u64,
    pub state_path: PathBuf,
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub streams: Vec<StreamConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            window_size_days: 7,
            page_size: 250,
            request_timeout: 300,
            state_path: PathBuf::from("state.json"),
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            streams: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub token: Option<String>,
    pub auth_header: String,
    /// JSON pointer to the record array in a response body
    pub records_pointer: String,
    /// JSON pointer to the continuation token
    pub cursor_pointer: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: std::env::var("SYNCLINE_TOKEN").ok(),
            auth_header: "Authorization".to_string(),
            records_pointer: String::new(),
            cursor_pointer: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_secs: policy.base_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
        }
    }
}

/// Deserialize a string that may contain environment variable references like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_vars(&s)))
}

/// Expand every ${VAR}; `None` if any referenced variable is unset
fn expand_env_vars(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&std::env::var(name).ok()?);
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    Some(out)
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}' (expected YYYY-MM-DD or RFC 3339)"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("Invalid date '{s}'"))?;
    Ok(midnight.and_utc())
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./syncline.toml (current directory)
    /// 2. ~/.config/syncline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("syncline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "syncline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Engine settings; `start_date` is required
    pub fn sync_config(&self) -> Result<SyncConfig> {
        let Some(start) = self.start_date.as_deref() else {
            bail!("start_date is not configured");
        };
        if self.window_size_days < 1 {
            bail!("window_size_days must be at least 1");
        }
        let config = SyncConfig {
            start_date: parse_datetime(start)?,
            end_date: self.end_date.as_deref().map(parse_datetime).transpose()?,
            window_size: chrono::Duration::days(self.window_size_days),
            page_size: self.page_size,
        };
        if config.page_size() != self.page_size {
            log::warn!(
                "page_size {} out of range, using {}",
                self.page_size,
                config.page_size()
            );
        }
        Ok(config)
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            base_url: self.api.base_url.clone(),
            auth_header: self.api.auth_header.clone(),
            token: self.api.token.clone(),
            records_pointer: self.api.records_pointer.clone(),
            cursor_pointer: self.api.cursor_pointer.clone(),
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_secs(self.retry.base_delay_secs),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
        }
    }
}
