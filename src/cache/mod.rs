//! Local caching for fetched resources.
//!
//! This module provides the persistent side of stale-while-revalidate:
//! - One serialized [`CacheEntry`] per resource key, replaced wholesale on write
//! - Pluggable stores (SQLite on disk, in-memory, disabled)
//! - Freshness classification and self-healing of corrupt entries

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{MemoryStore, NoopStore, SqliteStore};
pub use traits::{CacheEntry, CacheLookup, CacheStore, Cacheable};
