//! Subscriptions to cached resources.
//!
//! Inspired by TanStack Query, a [`Subscription<T>`] tracks one resource key and
//! exposes a continuously updated [`FetchState<T>`]: the latest known value plus
//! loading and error flags.
//!
//! # Example
//!
//! ```ignore
//! let mut users = fetcher.observe::<User>("/users/1");
//!
//! // Cached value (if any) is available immediately
//! render(&users.state());
//!
//! // Wake up whenever the state changes
//! while users.changed().await.is_ok() {
//!     render(&users.state());
//! }
//!
//! // Switching keys cancels the old request and any pending retry
//! users.set_key("/users/2");
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::Cacheable;
use crate::fetcher::CachedFetcher;

/// What a consumer sees of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchState<T> {
  /// Last known value, kept through retries and failures
  pub value: Option<T>,
  pub is_loading: bool,
  /// Set once retries are exhausted
  pub is_error: bool,
  /// Message of the error that ended the sequence
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl<T> Default for FetchState<T> {
  fn default() -> Self {
    Self {
      value: None,
      is_loading: false,
      is_error: false,
      error: None,
    }
  }
}

impl<T> FetchState<T> {
  pub fn is_settled(&self) -> bool {
    !self.is_loading
  }

  pub fn is_success(&self) -> bool {
    self.value.is_some() && !self.is_loading && !self.is_error
  }
}

/// Freshness and retry policy for a [`CachedFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
  /// Cached values younger than this are served without a network call
  pub stale_after: Duration,
  /// Retries after the first failed attempt
  pub max_retries: u32,
  /// Delay before the first retry; doubles on every further retry
  pub initial_retry_delay: Duration,
  /// Optional cap for a single retry delay. Unbounded by default.
  pub max_retry_delay: Option<Duration>,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      stale_after: Duration::from_secs(5 * 60),
      max_retries: 3,
      initial_retry_delay: Duration::from_millis(1000),
      max_retry_delay: None,
    }
  }
}

impl FetchOptions {
  pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
    self.stale_after = stale_after;
    self
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
    self.initial_retry_delay = delay;
    self
  }

  pub fn with_max_retry_delay(mut self, cap: Option<Duration>) -> Self {
    self.max_retry_delay = cap;
    self
  }

  /// Delay before retry `attempt` (0-indexed): `initial * 2^attempt`, capped.
  pub fn retry_delay(&self, attempt: u32) -> Duration {
    let delay = self
      .initial_retry_delay
      .saturating_mul(2u32.saturating_pow(attempt));
    match self.max_retry_delay {
      Some(cap) => delay.min(cap),
      None => delay,
    }
  }
}

/// Write handle for one fetch sequence.
///
/// Every write takes the watch lock and re-checks the sequence's token under
/// it, so nothing is published once the sequence has been cancelled.
pub(crate) struct Publisher<T> {
  state: Arc<watch::Sender<FetchState<T>>>,
  cancel: CancellationToken,
}

impl<T> Publisher<T> {
  pub(crate) fn new(
    state: Arc<watch::Sender<FetchState<T>>>,
    cancel: CancellationToken,
  ) -> Self {
    Self { state, cancel }
  }

  /// Apply `update` unless cancelled. Returns whether it was applied.
  pub(crate) fn publish(&self, update: impl FnOnce(&mut FetchState<T>)) -> bool {
    self.state.send_if_modified(|state| {
      if self.cancel.is_cancelled() {
        return false;
      }
      update(state);
      true
    })
  }

  pub(crate) fn token(&self) -> &CancellationToken {
    &self.cancel
  }
}

/// A running (or finished) fetch sequence for one key.
struct Sequence {
  cancel: CancellationToken,
  task: Option<JoinHandle<()>>,
}

/// A live view of one resource key.
///
/// Created by [`CachedFetcher::subscribe`] or [`CachedFetcher::observe`].
/// Dropping the subscription stops it.
pub struct Subscription<T: Cacheable> {
  fetcher: CachedFetcher,
  key: String,
  state: Arc<watch::Sender<FetchState<T>>>,
  receiver: watch::Receiver<FetchState<T>>,
  sequence: Option<Sequence>,
}

impl<T: Cacheable> Subscription<T> {
  pub(crate) fn new(fetcher: CachedFetcher, key: String) -> Self {
    let (tx, rx) = watch::channel(FetchState::default());
    Self {
      fetcher,
      key,
      state: Arc::new(tx),
      receiver: rx,
      sequence: None,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// Snapshot of the current state.
  pub fn state(&self) -> FetchState<T> {
    self.receiver.borrow().clone()
  }

  /// A receiver that is notified on every state change.
  pub fn watch(&self) -> watch::Receiver<FetchState<T>> {
    self.state.subscribe()
  }

  /// Wait for the next state change.
  pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
    self.receiver.changed().await
  }

  /// Wait until the current sequence stops loading and return that state.
  ///
  /// Never resolves if the sequence is stopped while loading.
  pub async fn settled(&self) -> FetchState<T> {
    let mut receiver = self.state.subscribe();
    let settled = match receiver.wait_for(|state| state.is_settled()).await {
      Ok(state) => state.clone(),
      // The sender lives as long as `self`
      Err(_) => self.state(),
    };
    settled
  }

  /// Whether a network sequence is still in flight or waiting to retry.
  pub fn is_running(&self) -> bool {
    self
      .sequence
      .as_ref()
      .and_then(|s| s.task.as_ref())
      .is_some_and(|task| !task.is_finished())
  }

  /// Start observing the current key.
  ///
  /// The cache is checked synchronously: a fresh entry is published before this
  /// returns and no request is made. This is a no-op while a sequence is running.
  pub fn start(&mut self) {
    if self.is_running() {
      return;
    }
    self.launch(false);
  }

  /// Stop observing. Aborts the in-flight request and any pending retry.
  ///
  /// The published state is left as it was. Calling this repeatedly, or after
  /// the sequence finished, is harmless.
  pub fn stop(&mut self) {
    if let Some(sequence) = self.sequence.take() {
      self.state.send_if_modified(|_| {
        sequence.cancel.cancel();
        false
      });
    }
  }

  /// Observe a different key.
  ///
  /// Cancels the old key's sequence, resets the state, and starts the new key
  /// if this subscription had been started. The same key is a no-op.
  pub fn set_key(&mut self, key: impl Into<String>) {
    let key = key.into();
    if key == self.key {
      return;
    }

    let was_started = self.sequence.is_some();
    let sequence = self.sequence.take();
    self.state.send_modify(|state| {
      if let Some(sequence) = &sequence {
        sequence.cancel.cancel();
      }
      *state = FetchState::default();
    });

    self.key = key;
    if was_started {
      self.launch(false);
    }
  }

  /// Fetch again regardless of cache freshness.
  ///
  /// The currently published value stays visible while the request runs.
  pub fn refetch(&mut self) {
    self.stop();
    self.launch(true);
  }

  fn launch(&mut self, force: bool) {
    let cancel = CancellationToken::new();
    let publisher = Publisher::new(Arc::clone(&self.state), cancel.clone());
    let task = self.fetcher.begin(&self.key, publisher, force);
    self.sequence = Some(Sequence { cancel, task });
  }
}

impl<T: Cacheable> Drop for Subscription<T> {
  fn drop(&mut self) {
    self.stop();
  }
}

impl<T: Cacheable + std::fmt::Debug> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("state", &*self.receiver.borrow())
      .field("running", &self.is_running())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_state_is_idle() {
    let state = FetchState::<u32>::default();
    assert_eq!(state.value, None);
    assert!(!state.is_loading);
    assert!(!state.is_error);
    assert!(!state.is_success());
  }

  #[test]
  fn test_backoff_doubles() {
    let options = FetchOptions::default();
    let delays: Vec<u128> = (0..4).map(|n| options.retry_delay(n).as_millis()).collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
  }

  #[test]
  fn test_backoff_cap_is_opt_in() {
    let options = FetchOptions::default();
    assert_eq!(options.max_retry_delay, None);
    assert_eq!(options.retry_delay(5), Duration::from_millis(32_000));

    let capped = options.with_max_retry_delay(Some(Duration::from_secs(30)));
    assert_eq!(capped.retry_delay(4), Duration::from_millis(16_000));
    assert_eq!(capped.retry_delay(5), Duration::from_secs(30));
    assert_eq!(capped.retry_delay(40), Duration::from_secs(30));
  }

  #[test]
  fn test_uncapped_backoff_saturates() {
    let options = FetchOptions::default();
    assert_eq!(options.retry_delay(6), Duration::from_millis(64_000));
    assert_eq!(
      options.retry_delay(64),
      Duration::from_secs(u64::from(u32::MAX))
    );
  }

  #[test]
  fn test_state_serializes_camel_case() {
    let state = FetchState {
      value: Some(1),
      is_loading: false,
      is_error: false,
      error: None,
    };
    assert_eq!(
      serde_json::to_string(&state).unwrap(),
      r#"{"value":1,"isLoading":false,"isError":false}"#
    );
  }

  #[test]
  fn test_publisher_stops_after_cancel() {
    let (tx, rx) = watch::channel(FetchState::<u32>::default());
    let cancel = CancellationToken::new();
    let publisher = Publisher::new(Arc::new(tx), cancel.clone());

    assert!(publisher.publish(|s| s.value = Some(1)));
    cancel.cancel();
    assert!(!publisher.publish(|s| s.value = Some(2)));
    assert_eq!(rx.borrow().value, Some(1));
  }
}
