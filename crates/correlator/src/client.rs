//! HTTP client for the ping server

use async_trait::async_trait;
use klaatu_common::{CorrelatorConfig, Ping};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{CorrelationError, CorrelationResult};

/// Anything the correlator can read the current ping list from
#[async_trait]
pub trait PingSource: Send + Sync {
    /// Current pings in arrival order
    async fn fetch_pings(&self) -> CorrelationResult<Vec<Ping>>;
}

/// Client for the ping server's `/pings` routes
#[derive(Debug, Clone)]
pub struct PingClient {
    http: reqwest::Client,
    base_url: String,
}

impl PingClient {
    /// Create a client for the server at `base_url`
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> CorrelationResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| CorrelationError::Transport {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &CorrelatorConfig) -> CorrelationResult<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch every stored ping
    pub async fn list(&self) -> CorrelationResult<Vec<Ping>> {
        let url = self.url("/pings");
        let body = self.send(self.http.get(&url), &url).await?;

        serde_json::from_slice(&body).map_err(|source| CorrelationError::Decode { url, source })
    }

    /// Submit one document as a ping
    pub async fn submit(&self, document: &Value) -> CorrelationResult<()> {
        let url = self.url("/pings");
        self.send(self.http.post(&url).json(document), &url).await?;
        Ok(())
    }

    /// Reset the store
    pub async fn clear(&self) -> CorrelationResult<()> {
        let url = self.url("/pings");
        self.send(self.http.delete(&url), &url).await?;
        debug!("Cleared pings at {}", self.base_url);
        Ok(())
    }

    /// Server health document
    pub async fn health(&self) -> CorrelationResult<Value> {
        let url = self.url("/");
        let body = self.send(self.http.get(&url), &url).await?;

        serde_json::from_slice(&body).map_err(|source| CorrelationError::Decode { url, source })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> CorrelationResult<Vec<u8>> {
        let transport = |source: reqwest::Error| CorrelationError::Transport {
            url: url.to_string(),
            source,
        };

        let resp = request.send().await.map_err(transport)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(CorrelationError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body.to_vec())
    }
}

#[async_trait]
impl PingSource for PingClient {
    async fn fetch_pings(&self) -> CorrelationResult<Vec<Ping>> {
        self.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = PingClient::new("http://127.0.0.1:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
        assert_eq!(client.url("/pings"), "http://127.0.0.1:5000/pings");
    }

    #[test]
    fn test_from_config() {
        let client = PingClient::from_config(&CorrelatorConfig::default()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5000");
    }
}
