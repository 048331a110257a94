use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::domain::{request::Viewport, rules::SelectorRules};

/// Parameters for one per-viewport extraction call.
pub struct ExtractionTask<'a> {
    pub page_url: &'a Url,
    /// Reference to the combined stylesheet the engine should read.
    pub css_path: &'a Path,
    pub viewport: Viewport,
    pub force_include: &'a SelectorRules,
    /// Largest image, in bytes, the engine may inline as base64.
    pub max_embedded_image_bytes: u32,
}

#[derive(Debug, Error)]
#[error("rendering engine failed: {message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// External rendering capability that computes critical CSS for one viewport.
///
/// The engine is an opaque collaborator: it loads the page, applies the
/// referenced stylesheet, and returns the rules needed above the fold.
#[async_trait]
pub trait CriticalCssEngine: Send + Sync {
    async fn extract(&self, task: ExtractionTask<'_>) -> Result<String, EngineError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderServiceRequest<'a> {
    url: &'a str,
    css: &'a str,
    width: u32,
    height: u32,
    force_include: Vec<&'a str>,
    force_include_re: Vec<&'a str>,
    max_embedded_base64_length: u32,
}

/// Client for an HTTP rendering service with a penthouse-style contract.
pub struct HttpRenderEngine {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpRenderEngine {
    pub fn new(client: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl CriticalCssEngine for HttpRenderEngine {
    async fn extract(&self, task: ExtractionTask<'_>) -> Result<String, EngineError> {
        let css = tokio::fs::read_to_string(task.css_path)
            .await
            .map_err(|err| {
                EngineError::new(format!("combined stylesheet is unreadable: {err}"))
            })?;

        let body = RenderServiceRequest {
            url: task.page_url.as_str(),
            css: &css,
            width: task.viewport.width,
            height: task.viewport.height,
            force_include: task
                .force_include
                .literals()
                .iter()
                .map(String::as_str)
                .collect(),
            force_include_re: task.force_include.pattern_sources().collect(),
            max_embedded_base64_length: task.max_embedded_image_bytes,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| EngineError::new(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| EngineError::new(err.to_string()))?;

        if !status.is_success() {
            return Err(EngineError::new(format!(
                "render service returned {status}: {text}"
            )));
        }

        Ok(text)
    }
}
