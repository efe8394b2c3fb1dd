//! Core traits and types for the caching system.

use color_eyre::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// Trait for resource values that can be fetched and cached.
///
/// Blanket-implemented for every type that round-trips through JSON and can be
/// shared across tasks.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Cacheable for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Key-value store holding one serialized [`CacheEntry`] per resource key.
///
/// Implementations are shared process-wide. Concurrent writers to the same key
/// race with last-write-wins semantics.
pub trait CacheStore: Send + Sync {
  /// Get the raw stored string for a key.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store a raw string, replacing any previous value for the key.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove the value for a key. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// List every key currently stored.
  fn keys(&self) -> Result<Vec<String>>;
}

/// A cached value together with the time it was fetched.
///
/// Serialized as `{"value": ..., "fetchedAtEpochMillis": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
  pub value: T,
  pub fetched_at_epoch_millis: i64,
}

impl<T> CacheEntry<T> {
  pub fn new(value: T, fetched_at_epoch_millis: i64) -> Self {
    Self {
      value,
      fetched_at_epoch_millis,
    }
  }

  /// Milliseconds elapsed between the fetch and `now`. Negative under clock skew,
  /// saturating for out-of-range timestamps.
  pub fn age_millis(&self, now: i64) -> i64 {
    now.saturating_sub(self.fetched_at_epoch_millis)
  }

  /// An entry is stale once its age reaches `stale_after`.
  pub fn is_stale(&self, now: i64, stale_after: Duration) -> bool {
    let stale_after = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
    self.age_millis(now) >= stale_after
  }
}

/// Outcome of a typed cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
  /// Entry younger than the stale time
  Fresh(CacheEntry<T>),
  /// Entry present but old enough to revalidate
  Stale(CacheEntry<T>),
  /// Nothing usable stored for the key
  Miss,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_entry_uses_camel_case_fields() {
    let entry = CacheEntry::new(serde_json::json!({"id": 1}), 1_700_000_000_000);
    let raw = serde_json::to_string(&entry).unwrap();
    assert_eq!(
      raw,
      r#"{"value":{"id":1},"fetchedAtEpochMillis":1700000000000}"#
    );
  }

  #[test]
  fn test_stale_boundary_is_inclusive() {
    let entry = CacheEntry::new(1, 1_000);
    let stale_after = Duration::from_millis(500);

    assert!(!entry.is_stale(1_499, stale_after));
    assert!(entry.is_stale(1_500, stale_after));
    assert!(entry.is_stale(10_000, stale_after));
  }

  #[test]
  fn test_extreme_timestamps_saturate() {
    let ancient = CacheEntry::new(1, i64::MIN);
    assert_eq!(ancient.age_millis(1_000), i64::MAX);
    assert!(ancient.is_stale(1_000, Duration::from_secs(1)));

    let far_future = CacheEntry::new(1, i64::MAX);
    assert_eq!(far_future.age_millis(-1_000), i64::MIN);
    assert!(!far_future.is_stale(-1_000, Duration::from_secs(1)));
  }

  #[test]
  fn test_future_entry_is_fresh() {
    let entry = CacheEntry::new(1, 5_000);
    assert_eq!(entry.age_millis(4_000), -1_000);
    assert!(!entry.is_stale(4_000, Duration::from_secs(1)));
  }
}
