//! Network contract used by the cached fetcher.

use futures::future::BoxFuture;

/// Why a network attempt did not produce a body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
  /// The server answered with a non-success status
  #[error("HTTP {status}")]
  Status { status: u16 },
  /// Connection, TLS, timeout or body read failure
  #[error("network error: {0}")]
  Network(String),
  /// The body arrived but is not the expected JSON shape
  #[error("failed to decode response: {0}")]
  Decode(String),
  /// The resource key cannot be turned into a URL
  #[error("invalid URL {0}")]
  InvalidUrl(String),
}

impl FetchError {
  /// Whether another attempt could succeed.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, FetchError::InvalidUrl(_))
  }
}

/// An abortable GET returning the raw response body.
///
/// Dropping the returned future aborts the request. Cancellation is never
/// reported as an error.
pub trait Fetcher: Send + Sync {
  fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}
