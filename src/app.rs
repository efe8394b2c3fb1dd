use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use swrfetch::cache::{CacheLookup, CacheStore, MemoryStore, NoopStore, SqliteStore};
use swrfetch::config::{CacheBackend, Config};
use swrfetch::{CachedFetcher, FetchState, HttpFetcher};

use crate::event::{Event, EventHandler};

/// Command implementations for the CLI
pub struct App {
  fetcher: CachedFetcher,
}

/// One line of `cache list` output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListedEntry<'a> {
  key: &'a str,
  fetched_at_epoch_millis: i64,
  stale: bool,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let store: Arc<dyn CacheStore> = match config.cache.backend {
      CacheBackend::Sqlite => Arc::new(SqliteStore::open(config.cache.path.as_deref())?),
      CacheBackend::Memory => Arc::new(MemoryStore::new()),
      CacheBackend::None => Arc::new(NoopStore),
    };

    let token = Config::get_api_token();
    let network = HttpFetcher::new(&config.http, token.as_deref())?;

    let fetcher =
      CachedFetcher::new(store, Arc::new(network)).with_options(config.fetch.options());

    Ok(Self { fetcher })
  }

  /// Observe `key` until it settles, printing every state.
  ///
  /// Returns whether the final state is free of errors.
  pub async fn get(&self, key: &str) -> Result<bool> {
    let subscription = self.fetcher.observe::<Value>(key);
    let mut rx = subscription.watch();

    loop {
      let state = rx.borrow_and_update().clone();
      print_state(&state)?;
      if state.is_settled() {
        return Ok(!state.is_error);
      }
      rx.changed()
        .await
        .map_err(|e| eyre!("Subscription closed: {}", e))?;
    }
  }

  /// Observe `key` and refetch it every `interval` until interrupted.
  pub async fn watch(&self, key: &str, interval: Duration) -> Result<()> {
    let mut subscription = self.fetcher.observe::<Value>(key);
    let mut rx = subscription.watch();
    let mut events = EventHandler::new(interval);

    print_state(&rx.borrow_and_update().clone())?;

    loop {
      tokio::select! {
        changed = rx.changed() => {
          changed.map_err(|e| eyre!("Subscription closed: {}", e))?;
          let state = rx.borrow_and_update().clone();
          print_state(&state)?;
        }
        event = events.next() => match event {
          Some(Event::Tick) => {
            info!(key, "refetching");
            subscription.refetch();
          }
          Some(Event::Interrupt) | None => {
            subscription.stop();
            return Ok(());
          }
        }
      }
    }
  }

  /// Print every cached key with its fetch time and freshness.
  pub fn cache_list(&self) -> Result<()> {
    let cache = self.fetcher.cache();
    let now = self.fetcher.now_millis();
    let stale_after = self.fetcher.options().stale_after;

    for key in cache.keys()? {
      let (entry, stale) = match cache.lookup::<Value>(&key, now, stale_after) {
        CacheLookup::Fresh(entry) => (entry, false),
        CacheLookup::Stale(entry) => (entry, true),
        CacheLookup::Miss => continue,
      };

      let line = serde_json::to_string(&ListedEntry {
        key: &key,
        fetched_at_epoch_millis: entry.fetched_at_epoch_millis,
        stale,
      })?;
      println!("{}", line);
    }

    Ok(())
  }

  pub fn cache_remove(&self, key: &str) -> Result<()> {
    self.fetcher.cache().remove(key)
  }

  pub fn cache_clear(&self) -> Result<usize> {
    self.fetcher.cache().clear()
  }

  pub fn cache_prune(&self, older_than: Duration) -> Result<usize> {
    let now = self.fetcher.now_millis();
    self.fetcher.cache().prune(older_than, now)
  }
}

fn print_state(state: &FetchState<Value>) -> Result<()> {
  println!("{}", serde_json::to_string(state)?);
  Ok(())
}
