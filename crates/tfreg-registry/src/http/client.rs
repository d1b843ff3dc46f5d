//! HTTP client for the metadata service.
//!
//! A thin wrapper around `reqwest` that posts JSON documents and decodes
//! JSON answers. Requests are never retried; a fixed timeout bounds every
//! call.
//!
//! ```no_run
//! use tfreg_registry::http::{HttpClient, HttpClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::with_config(
//!     HttpClientConfig::new().with_timeout(Duration::from_secs(5)),
//! )?;
//! let answer: serde_json::Value = client
//!     .post_json("http://localhost:8081/graphql", &serde_json::json!({"query": "{}"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = concat!("tfreg/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response body excerpt kept in an error
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}: {body}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("JSON deserialization error: {0}")]
    JsonParse(String),
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// POST `body` as JSON and deserialize the answer
    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(HttpError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate(&text, ERROR_BODY_LIMIT),
            });
        }

        serde_json::from_str(&text).map_err(|e| HttpError::JsonParse(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// Serve one request with `status` and `body`, returning the request body
    fn serve_once(status: u16, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/graphql", server.server_addr().to_ip().unwrap());
        let handle = thread::spawn(move || {
            let mut request = server.recv().unwrap();
            let mut received = String::new();
            request.as_reader().read_to_string(&mut received).unwrap();
            let response = tiny_http::Response::from_string(body).with_status_code(status);
            request.respond(response).unwrap();
            received
        });
        (url, handle)
    }

    #[test]
    fn test_config_builder() {
        let config = HttpClientConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("Test/1.0".to_string());

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "Test/1.0");
    }

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("tfreg/"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("ééé", 3), "é...");
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::new().unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_post_json() {
        let (url, handle) = serve_once(200, r#"{"data":{"ok":true}}"#);
        let client = HttpClient::new().unwrap();

        let answer: serde_json::Value = client
            .post_json(&url, &serde_json::json!({"query": "{ ping }"}))
            .await
            .unwrap();

        assert_eq!(answer["data"]["ok"], true);
        let sent: serde_json::Value = serde_json::from_str(&handle.join().unwrap()).unwrap();
        assert_eq!(sent["query"], "{ ping }");
    }

    #[tokio::test]
    async fn test_error_status() {
        let (url, handle) = serve_once(502, "bad gateway");
        let client = HttpClient::new().unwrap();

        let result: Result<serde_json::Value, _> =
            client.post_json(&url, &serde_json::json!({})).await;
        handle.join().unwrap();

        match result {
            Err(HttpError::HttpStatus { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("expected HttpStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let (url, handle) = serve_once(200, "<html>");
        let client = HttpClient::new().unwrap();

        let result: Result<serde_json::Value, _> =
            client.post_json(&url, &serde_json::json!({})).await;
        handle.join().unwrap();

        assert!(matches!(result, Err(HttpError::JsonParse(_))));
    }
}
