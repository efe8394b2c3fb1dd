mod app;
mod event;
mod logging;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use swrfetch::config::{CacheBackend, Config};

#[derive(Parser, Debug)]
#[command(name = "swrfetch")]
#[command(about = "Fetch JSON resources with a stale-while-revalidate local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swrfetch/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Log debug output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Disable the local cache for this run
  #[arg(long, global = true)]
  no_cache: bool,

  /// Serve cached values younger than this without a request
  #[arg(long, global = true)]
  stale_after_ms: Option<u64>,

  /// Retries after the first failed attempt
  #[arg(long, global = true)]
  max_retries: Option<u32>,

  /// Delay before the first retry (doubles per retry)
  #[arg(long, global = true)]
  retry_delay_ms: Option<u64>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
  /// Fetch a resource once and print every state until it settles
  Get {
    /// URL, or path relative to http.base_url
    key: String,
  },
  /// Keep a resource subscribed and refetch it periodically
  Watch {
    key: String,
    #[arg(long, default_value_t = 30_000)]
    interval_ms: u64,
  },
  /// Inspect or maintain the local cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum CacheAction {
  /// List cached keys
  List,
  /// Remove one key
  Remove { key: String },
  /// Remove every entry
  Clear,
  /// Remove entries fetched longer ago than the given age
  Prune {
    #[arg(long)]
    older_than_ms: u64,
  },
}

impl Args {
  /// Apply command-line overrides on top of the loaded configuration
  fn apply(&self, mut config: Config) -> Config {
    if self.no_cache {
      config.cache.backend = CacheBackend::None;
    }
    if let Some(ms) = self.stale_after_ms {
      config.fetch.stale_after_ms = ms;
    }
    if let Some(retries) = self.max_retries {
      config.fetch.max_retries = retries;
    }
    if let Some(ms) = self.retry_delay_ms {
      config.fetch.initial_retry_delay_ms = ms;
    }
    config
  }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = args.apply(Config::load(args.config.as_deref())?);
  let _log_guard = logging::init(&config.log, args.verbose)?;

  let app = app::App::new(&config)?;

  match args.command {
    Command::Get { key } => {
      if !app.get(&key).await? {
        return Ok(ExitCode::FAILURE);
      }
    }
    Command::Watch { key, interval_ms } => {
      app.watch(&key, Duration::from_millis(interval_ms)).await?;
    }
    Command::Cache { action } => match action {
      CacheAction::List => app.cache_list()?,
      CacheAction::Remove { key } => app.cache_remove(&key)?,
      CacheAction::Clear => {
        let removed = app.cache_clear()?;
        eprintln!("removed {} entries", removed);
      }
      CacheAction::Prune { older_than_ms } => {
        let removed = app.cache_prune(Duration::from_millis(older_than_ms))?;
        eprintln!("removed {} entries", removed);
      }
    },
  }

  Ok(ExitCode::SUCCESS)
}
