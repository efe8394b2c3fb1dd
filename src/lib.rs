//! Stale-while-revalidate JSON fetching.
//!
//! A [`CachedFetcher`] serves the locally cached value for a resource key right
//! away, revalidates it over the network once it is stale, and retries failed
//! requests with exponential backoff. Consumers hold a [`Subscription`] and read
//! a [`FetchState`] of `value`, `is_loading` and `is_error`.

pub mod cache;
pub mod clock;
pub mod config;
pub mod fetcher;
pub mod http;
pub mod query;

pub use cache::{
  CacheEntry, CacheLayer, CacheStore, Cacheable, MemoryStore, NoopStore, SqliteStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fetcher::CachedFetcher;
pub use http::{FetchError, Fetcher, HttpFetcher};
pub use query::{FetchOptions, FetchState, Subscription};
