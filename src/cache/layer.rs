//! Typed cache access on top of a raw [`CacheStore`].

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{CacheEntry, CacheLookup, CacheStore};

/// Cache layer that serializes entries and classifies them by age.
///
/// Storage failures on the read path are logged and reported as misses so a
/// broken store degrades to plain network fetching.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStore>,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: Arc<dyn CacheStore>) -> Self {
    Self { storage }
  }

  /// Look up `key` and classify the entry relative to `now`.
  ///
  /// An entry that fails to parse as `CacheEntry<T>` is removed and reported
  /// as a miss.
  pub fn lookup<T: DeserializeOwned>(
    &self,
    key: &str,
    now: i64,
    stale_after: Duration,
  ) -> CacheLookup<T> {
    let raw = match self.storage.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return CacheLookup::Miss,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return CacheLookup::Miss;
      }
    };

    match serde_json::from_str::<CacheEntry<T>>(&raw) {
      Ok(entry) if entry.is_stale(now, stale_after) => CacheLookup::Stale(entry),
      Ok(entry) => CacheLookup::Fresh(entry),
      Err(e) => {
        warn!(key, error = %e, "discarding corrupt cache entry");
        if let Err(e) = self.storage.remove(key) {
          warn!(key, error = %e, "failed to remove corrupt cache entry");
        }
        CacheLookup::Miss
      }
    }
  }

  /// Write `value` for `key`, replacing any previous entry.
  pub fn store<T: Serialize>(&self, key: &str, value: &T, now: i64) -> Result<()> {
    let raw = serde_json::to_string(&CacheEntry::new(value, now))
      .map_err(|e| eyre!("Failed to serialize cache entry {}: {}", key, e))?;
    self.storage.set(key, &raw)
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    self.storage.remove(key)
  }

  pub fn keys(&self) -> Result<Vec<String>> {
    self.storage.keys()
  }

  /// Remove every entry older than `older_than`, plus any corrupt entry.
  ///
  /// Returns the number of entries removed.
  pub fn prune(&self, older_than: Duration, now: i64) -> Result<usize> {
    let mut removed = 0;

    for key in self.storage.keys()? {
      let Some(raw) = self.storage.get(&key)? else {
        continue;
      };

      let expired = match serde_json::from_str::<EntryHeader>(&raw) {
        Ok(header) => {
          CacheEntry::new((), header.fetched_at_epoch_millis).is_stale(now, older_than)
        }
        Err(_) => true,
      };

      if expired {
        self.storage.remove(&key)?;
        removed += 1;
      }
    }

    debug!(removed, "pruned cache");
    Ok(removed)
  }

  /// Remove every entry.
  pub fn clear(&self) -> Result<usize> {
    let keys = self.storage.keys()?;
    for key in &keys {
      self.storage.remove(key)?;
    }
    Ok(keys.len())
  }
}

/// Entry metadata without the value, for maintenance passes.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryHeader {
  fetched_at_epoch_millis: i64,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct User {
    id: u32,
    name: String,
  }

  const FIVE_MINUTES: Duration = Duration::from_secs(300);

  fn layer() -> (Arc<MemoryStore>, CacheLayer) {
    let store = Arc::new(MemoryStore::new());
    let layer = CacheLayer::new(store.clone());
    (store, layer)
  }

  fn leanne() -> User {
    User {
      id: 1,
      name: "Leanne".to_string(),
    }
  }

  #[test]
  fn test_round_trip_is_fresh() {
    let (_, layer) = layer();
    layer.store("/users/1", &leanne(), 1_000).unwrap();

    let lookup = layer.lookup::<User>("/users/1", 1_000, FIVE_MINUTES);
    assert_eq!(lookup, CacheLookup::Fresh(CacheEntry::new(leanne(), 1_000)));
  }

  #[test]
  fn test_old_entry_is_stale() {
    let (_, layer) = layer();
    layer.store("/users/1", &leanne(), 0).unwrap();

    let lookup = layer.lookup::<User>("/users/1", 600_000, FIVE_MINUTES);
    assert!(matches!(lookup, CacheLookup::Stale(entry) if entry.value == leanne()));
  }

  #[test]
  fn test_missing_entry() {
    let (_, layer) = layer();
    let lookup = layer.lookup::<User>("/users/1", 0, FIVE_MINUTES);
    assert_eq!(lookup, CacheLookup::Miss);
  }

  #[test]
  fn test_corrupt_entry_is_removed() {
    let (store, layer) = layer();
    store.set("/users/1", "{not json").unwrap();

    let lookup = layer.lookup::<User>("/users/1", 0, FIVE_MINUTES);
    assert_eq!(lookup, CacheLookup::Miss);
    assert_eq!(store.get("/users/1").unwrap(), None);
  }

  #[test]
  fn test_wrong_shape_is_treated_as_corrupt() {
    let (store, layer) = layer();
    store
      .set("/users/1", r#"{"value":"just a string","fetchedAtEpochMillis":0}"#)
      .unwrap();

    let lookup = layer.lookup::<User>("/users/1", 0, FIVE_MINUTES);
    assert_eq!(lookup, CacheLookup::Miss);
    assert_eq!(store.get("/users/1").unwrap(), None);
  }

  #[test]
  fn test_extreme_timestamp_is_stale_not_a_panic() {
    let (store, layer) = layer();
    store
      .set(
        "/users/1",
        r#"{"value":{"id":1,"name":"Leanne"},"fetchedAtEpochMillis":-9223372036854775808}"#,
      )
      .unwrap();

    let lookup = layer.lookup::<User>("/users/1", 1_700_000_000_000, FIVE_MINUTES);
    assert!(matches!(lookup, CacheLookup::Stale(entry) if entry.value == leanne()));

    assert_eq!(layer.prune(FIVE_MINUTES, 1_700_000_000_000).unwrap(), 1);
    assert!(layer.keys().unwrap().is_empty());
  }

  #[test]
  fn test_store_overwrites_wholesale() {
    let (store, layer) = layer();
    layer.store("/users/1", &leanne(), 0).unwrap();
    layer
      .store("/users/1", &serde_json::json!({"id": 1}), 5)
      .unwrap();

    assert_eq!(
      store.get("/users/1").unwrap().as_deref(),
      Some(r#"{"value":{"id":1},"fetchedAtEpochMillis":5}"#)
    );
  }

  #[test]
  fn test_prune_removes_old_and_corrupt_entries() {
    let (store, layer) = layer();
    layer.store("/old", &1, 0).unwrap();
    layer.store("/new", &2, 9_000).unwrap();
    store.set("/broken", "nope").unwrap();

    let removed = layer.prune(Duration::from_secs(5), 10_000).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(layer.keys().unwrap(), vec!["/new"]);
  }

  #[test]
  fn test_clear() {
    let (_, layer) = layer();
    layer.store("/a", &1, 0).unwrap();
    layer.store("/b", &2, 0).unwrap();

    assert_eq!(layer.clear().unwrap(), 2);
    assert!(layer.keys().unwrap().is_empty());
  }
}
