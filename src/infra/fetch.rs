use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::FetchSettings;

use super::error::InfraError;

/// Transfer-level failure downloading a page or stylesheet.
#[derive(Debug, Clone, Error)]
#[error("failed to fetch `{url}`: {message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Capability to download a resource as raw bytes.
///
/// The body is returned regardless of HTTP status; content checks happen in
/// the pipeline, so a 404 error page is handled by the HTML-marker guard
/// rather than here.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// `reqwest`-backed fetcher with the service's identifying User-Agent and
/// permissive TLS validation.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Build the shared HTTP client used for page fetches and webhook delivery.
pub fn build_client(settings: &FetchSettings) -> Result<reqwest::Client, InfraError> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .timeout(settings.timeout)
        .build()
        .map_err(|err| InfraError::http_client(err.to_string()))
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| FetchError::new(url.as_str(), err.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::new(url.as_str(), err.to_string()))?;

        Ok(body.to_vec())
    }
}
