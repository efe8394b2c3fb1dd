//! Stale-while-revalidate fetching with retry backoff.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, CacheLookup, CacheStore, Cacheable};
use crate::clock::{Clock, SystemClock};
use crate::http::{FetchError, Fetcher};
use crate::query::{FetchOptions, Publisher, Subscription};

/// Combines a local cache with network revalidation.
///
/// Cheap to clone; clones share the store, the network client and the clock.
/// Each [`Subscription`] runs its own fetch sequence: two subscriptions to the
/// same key issue two requests.
#[derive(Clone)]
pub struct CachedFetcher {
  cache: CacheLayer,
  network: Arc<dyn Fetcher>,
  clock: Arc<dyn Clock>,
  options: FetchOptions,
}

impl CachedFetcher {
  pub fn new(store: Arc<dyn CacheStore>, network: Arc<dyn Fetcher>) -> Self {
    Self {
      cache: CacheLayer::new(store),
      network,
      clock: Arc::new(SystemClock),
      options: FetchOptions::default(),
    }
  }

  pub fn with_options(mut self, options: FetchOptions) -> Self {
    self.options = options;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn options(&self) -> &FetchOptions {
    &self.options
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  pub fn now_millis(&self) -> i64 {
    self.clock.now_millis()
  }

  /// Create a subscription for `key` without starting it.
  pub fn subscribe<T: Cacheable>(&self, key: impl Into<String>) -> Subscription<T> {
    Subscription::new(self.clone(), key.into())
  }

  /// Create a subscription for `key` and start it.
  ///
  /// Must be called from within a tokio runtime unless the cache is fresh.
  pub fn observe<T: Cacheable>(&self, key: impl Into<String>) -> Subscription<T> {
    let mut subscription = self.subscribe(key);
    subscription.start();
    subscription
  }

  /// Check the cache and, unless it is fresh, spawn the network sequence.
  ///
  /// `force` skips the freshness short-circuit but still shows the cached value.
  pub(crate) fn begin<T: Cacheable>(
    &self,
    key: &str,
    publisher: Publisher<T>,
    force: bool,
  ) -> Option<JoinHandle<()>> {
    let now = self.clock.now_millis();

    match self.cache.lookup::<T>(key, now, self.options.stale_after) {
      CacheLookup::Fresh(entry) if !force => {
        debug!(key, age_ms = entry.age_millis(now), "cache hit");
        publisher.publish(|state| {
          state.value = Some(entry.value);
          state.is_loading = false;
          state.is_error = false;
          state.error = None;
        });
        return None;
      }
      CacheLookup::Fresh(entry) | CacheLookup::Stale(entry) => {
        debug!(key, age_ms = entry.age_millis(now), "revalidating cached value");
        publisher.publish(|state| {
          state.value = Some(entry.value);
          state.is_loading = true;
          state.is_error = false;
          state.error = None;
        });
      }
      CacheLookup::Miss => {
        debug!(key, "cache miss");
        publisher.publish(|state| {
          state.is_loading = true;
          state.is_error = false;
          state.error = None;
        });
      }
    }

    let fetcher = self.clone();
    let key = key.to_string();
    Some(tokio::spawn(async move {
      fetcher.revalidate(&key, publisher).await;
    }))
  }

  /// Fetch `key` until it succeeds, retries run out, or the sequence is cancelled.
  async fn revalidate<T: Cacheable>(&self, key: &str, publisher: Publisher<T>) {
    let cancel = publisher.token().clone();
    let mut attempt: u32 = 0;

    loop {
      let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          debug!(key, attempt, "fetch cancelled");
          return;
        }
        result = self.network.fetch(key) => result,
      };

      let error = match result.and_then(|body| decode::<T>(&body)) {
        Ok(value) => {
          self.complete(key, value, &publisher);
          return;
        }
        Err(error) => error,
      };

      if !error.is_retryable() || attempt >= self.options.max_retries {
        warn!(key, attempt, error = %error, "fetch failed");
        publisher.publish(|state| {
          state.is_loading = false;
          state.is_error = true;
          state.error = Some(error.to_string());
        });
        return;
      }

      let delay = self.options.retry_delay(attempt);
      warn!(
        key,
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "fetch failed, retrying"
      );

      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          debug!(key, attempt, "retry cancelled");
          return;
        }
        _ = tokio::time::sleep(delay) => {}
      }
      attempt += 1;
    }
  }

  fn complete<T: Cacheable>(&self, key: &str, value: T, publisher: &Publisher<T>) {
    let now = self.clock.now_millis();

    // Written under the watch lock: a cancelled sequence writes neither cache nor state
    let published = publisher.publish(|state| {
      if let Err(e) = self.cache.store(key, &value, now) {
        warn!(key, error = %e, "failed to write cache entry");
      }
      state.value = Some(value);
      state.is_loading = false;
      state.is_error = false;
      state.error = None;
    });

    if published {
      debug!(key, "fetch succeeded");
    }
  }
}

fn decode<T: Cacheable>(body: &str) -> Result<T, FetchError> {
  serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
}
