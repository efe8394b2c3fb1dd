pub mod client;
pub mod types;

pub use client::HttpFetcher;
pub use types::{FetchError, Fetcher};
