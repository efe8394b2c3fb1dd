use crate::config::HttpConfig;
use crate::http::types::{FetchError, Fetcher};
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client that resolves resource keys to URLs and GETs them
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base_url: Option<String>,
}

impl HttpFetcher {
  pub fn new(config: &HttpConfig, token: Option<&str>) -> Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
      let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| eyre!("Invalid API token: {}", e))?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    let client = reqwest::Client::builder()
      .timeout(Duration::from_millis(config.timeout_ms))
      .user_agent(config.user_agent.clone())
      .default_headers(headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let base_url = match &config.base_url {
      Some(base) => {
        Url::parse(base).map_err(|e| eyre!("Invalid base URL {}: {}", base, e))?;
        Some(base.trim_end_matches('/').to_string())
      }
      None => None,
    };

    Ok(Self { client, base_url })
  }

  /// Resolve a resource key to a URL.
  ///
  /// Absolute keys are used as-is; anything else is appended to the base URL.
  pub fn resolve(&self, key: &str) -> Result<Url, FetchError> {
    if let Ok(url) = Url::parse(key) {
      return Ok(url);
    }

    let base = self
      .base_url
      .as_deref()
      .ok_or_else(|| FetchError::InvalidUrl(key.to_string()))?;

    Url::parse(&format!("{}/{}", base, key.trim_start_matches('/')))
      .map_err(|_| FetchError::InvalidUrl(key.to_string()))
  }

  /// GET the resource and return its body
  pub async fn get(&self, key: &str) -> Result<String, FetchError> {
    let url = self.resolve(key)?;
    debug!(%url, "GET");

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        status: status.as_u16(),
      });
    }

    response
      .text()
      .await
      .map_err(|e| FetchError::Network(e.to_string()))
  }
}

impl Fetcher for HttpFetcher {
  fn fetch<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
    Box::pin(self.get(key))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(base_url: Option<String>) -> HttpConfig {
    HttpConfig {
      base_url,
      ..HttpConfig::default()
    }
  }

  #[test]
  fn test_resolve_relative_against_base() {
    let fetcher =
      HttpFetcher::new(&config(Some("http://localhost:8000/v1/".to_string())), None).unwrap();

    assert_eq!(
      fetcher.resolve("/lps/3").unwrap().as_str(),
      "http://localhost:8000/v1/lps/3"
    );
    assert_eq!(
      fetcher.resolve("lps?cursor=2").unwrap().as_str(),
      "http://localhost:8000/v1/lps?cursor=2"
    );
  }

  #[test]
  fn test_resolve_absolute_ignores_base() {
    let fetcher =
      HttpFetcher::new(&config(Some("http://localhost:8000".to_string())), None).unwrap();

    assert_eq!(
      fetcher
        .resolve("https://jsonplaceholder.typicode.com/users/1")
        .unwrap()
        .as_str(),
      "https://jsonplaceholder.typicode.com/users/1"
    );
  }

  #[test]
  fn test_relative_without_base_is_invalid() {
    let fetcher = HttpFetcher::new(&config(None), None).unwrap();
    let err = fetcher.resolve("/users/1").unwrap_err();
    assert_eq!(err, FetchError::InvalidUrl("/users/1".to_string()));
    assert!(!err.is_retryable());
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(HttpFetcher::new(&config(Some("not a url".to_string())), None).is_err());
  }

  #[tokio::test]
  async fn test_get_returns_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/users/1")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"id":1,"name":"Leanne"}"#)
      .create_async()
      .await;

    let fetcher = HttpFetcher::new(&config(Some(server.url())), None).unwrap();
    let body = fetcher.fetch("/users/1").await.unwrap();

    assert_eq!(body, r#"{"id":1,"name":"Leanne"}"#);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_non_success_status_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("GET", "/users/1")
      .with_status(500)
      .create_async()
      .await;

    let fetcher = HttpFetcher::new(&config(Some(server.url())), None).unwrap();
    let err = fetcher.fetch("/users/1").await.unwrap_err();

    assert_eq!(err, FetchError::Status { status: 500 });
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn test_bearer_token_is_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/v1/users/me")
      .match_header("authorization", "Bearer secret-token")
      .with_status(200)
      .with_body("{}")
      .create_async()
      .await;

    let base = format!("{}/v1", server.url());
    let fetcher = HttpFetcher::new(&config(Some(base)), Some("secret-token")).unwrap();
    fetcher.fetch("/users/me").await.unwrap();

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_connection_failure_is_network_error() {
    // Nothing listens on port 9 locally
    let fetcher =
      HttpFetcher::new(&config(Some("http://127.0.0.1:9".to_string())), None).unwrap();
    let err = fetcher.fetch("/users/1").await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
  }
}
