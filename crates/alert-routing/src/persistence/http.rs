//! HTTP persistence backend for the console API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, warn};

use super::{PersistencePort, Snapshot};
use crate::config::RoutingConfig;
use crate::error::PersistError;

/// Path prefix of the routing configuration resource.
const RESOURCE: &str = "alert-routing";

/// Stores routing configuration through the console backend API.
///
/// - `GET  {base}/alert-routing` returns the full [`Snapshot`]
/// - `PUT  {base}/alert-routing/nodes/{key}` stores one subtree
pub struct HttpPersistence {
    base_url: Option<String>,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    node_key: &'a str,
    snapshot: &'a Snapshot,
}

impl HttpPersistence {
    /// Create a backend from configuration.
    #[must_use]
    pub fn from_config(config: &RoutingConfig) -> Self {
        if config.api_url.is_some() {
            debug!("HTTP persistence enabled");
        } else {
            debug!("HTTP persistence disabled (ROUTING_API_URL not set)");
        }

        Self {
            base_url: config.api_url.clone(),
            token: config.api_token.clone(),
            timeout: config.request_timeout(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a backend for a specific base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            token: None,
            timeout: Duration::from_secs(10),
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Whether a base URL is configured.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.base_url.is_some()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, PersistError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| PersistError::NotConfigured("ROUTING_API_URL".to_string()))?;

        let mut url = Url::parse(base)
            .map_err(|e| PersistError::Other(format!("invalid ROUTING_API_URL '{base}': {e}")))?;
        url.path_segments_mut()
            .map_err(|()| PersistError::Other(format!("ROUTING_API_URL '{base}' cannot be a base")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url).timeout(self.timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map a non-success response to an error.
    async fn check(response: Response) -> Result<Response, PersistError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);

            warn!(
                backend = "http",
                retry_after_secs = retry_after,
                "Rate limited by routing backend"
            );

            return Err(PersistError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            backend = "http",
            status = %status,
            body = %body,
            "Routing backend request failed"
        );

        Err(PersistError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PersistencePort for HttpPersistence {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn save(&self, node_key: &str, snapshot: &Snapshot) -> Result<(), PersistError> {
        let url = self.url(&[RESOURCE, "nodes", node_key])?;
        let payload = SaveRequest { node_key, snapshot };

        debug!(backend = "http", node = %node_key, url = %url, "Saving routing snapshot");

        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&payload)
            .send()
            .await?;
        Self::check(response).await?;

        debug!(backend = "http", node = %node_key, "Routing snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Snapshot, PersistError> {
        let url = self.url(&[RESOURCE])?;

        debug!(backend = "http", url = %url, "Loading routing configuration");

        let response = self.request(reqwest::Method::GET, url).send().await?;
        let body = Self::check(response).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let backend = HttpPersistence::new("https://console.example.com/api/");
        let url = backend.url(&[RESOURCE, "nodes", "server deploy"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://console.example.com/api/alert-routing/nodes/server%20deploy"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_backend_fails_fast() {
        let backend = HttpPersistence::from_config(&RoutingConfig {
            api_url: None,
            ..RoutingConfig::default()
        });
        assert!(!backend.enabled());
        assert!(matches!(
            backend.load().await,
            Err(PersistError::NotConfigured(_))
        ));
    }
}
