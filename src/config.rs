use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::query::FetchOptions;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub fetch: FetchConfig,
  pub http: HttpConfig,
  pub cache: CacheConfig,
  pub log: LogConfig,
}

/// Freshness and retry policy, in milliseconds
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
  pub stale_after_ms: u64,
  pub max_retries: u32,
  pub initial_retry_delay_ms: u64,
  /// Upper bound for a single backoff delay (unbounded when null)
  pub max_retry_delay_ms: Option<u64>,
}

impl Default for FetchConfig {
  fn default() -> Self {
    let defaults = FetchOptions::default();
    Self {
      stale_after_ms: defaults.stale_after.as_millis() as u64,
      max_retries: defaults.max_retries,
      initial_retry_delay_ms: defaults.initial_retry_delay.as_millis() as u64,
      max_retry_delay_ms: defaults.max_retry_delay.map(|d| d.as_millis() as u64),
    }
  }
}

impl FetchConfig {
  pub fn options(&self) -> FetchOptions {
    FetchOptions {
      stale_after: Duration::from_millis(self.stale_after_ms),
      max_retries: self.max_retries,
      initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
      max_retry_delay: self.max_retry_delay_ms.map(Duration::from_millis),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  /// Prefix for resource keys that are not absolute URLs
  pub base_url: Option<String>,
  pub timeout_ms: u64,
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      timeout_ms: 10_000,
      user_agent: concat!("swrfetch/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// Persistent SQLite database
  #[default]
  Sqlite,
  /// Process-local map, gone on exit
  Memory,
  /// Caching disabled
  None,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub backend: CacheBackend,
  /// Database file (defaults to the data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Write logs to a daily rolling file instead of stderr
  pub file: bool,
  pub directory: Option<PathBuf>,
  /// tracing filter directive, e.g. "swrfetch=debug"
  pub filter: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swrfetch.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swrfetch/config.yaml
  ///
  /// Falls back to defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swrfetch.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swrfetch").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the bearer token from the environment, if set.
  ///
  /// Checks SWRFETCH_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("SWRFETCH_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}
