use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use swrfetch::config::LogConfig;

const DEFAULT_FILTER: &str = "swrfetch=warn";

/// Install the global tracing subscriber.
///
/// `SWRFETCH_LOG` wins over the configured filter; `verbose` raises the
/// default to debug. The returned guard must be held until exit so buffered
/// file output is flushed.
pub fn init(config: &LogConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
  let fallback = match (&config.filter, verbose) {
    (_, true) => "swrfetch=debug".to_string(),
    (Some(filter), false) => filter.clone(),
    (None, false) => DEFAULT_FILTER.to_string(),
  };
  let filter =
    EnvFilter::try_from_env("SWRFETCH_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

  if config.file {
    let directory = match &config.directory {
      Some(dir) => dir.clone(),
      None => default_log_dir()?,
    };
    std::fs::create_dir_all(&directory)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

    let appender = tracing_appender::rolling::daily(&directory, "swrfetch.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
      .try_init()
      .map_err(|e| eyre!("Failed to install logger: {}", e))?;

    Ok(Some(guard))
  } else {
    tracing_subscriber::registry()
      .with(filter)
      .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
      .try_init()
      .map_err(|e| eyre!("Failed to install logger: {}", e))?;

    Ok(None)
  }
}

fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("swrfetch").join("logs"))
}
