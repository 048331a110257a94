//! The generation pipeline: resolve stylesheets, fan out per-viewport
//! extraction, aggregate and filter the results.

pub mod css;
pub mod resolver;

use std::sync::Arc;

use futures::future;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    domain::{error::DomainError, request::GenerationRequest},
    infra::{
        engine::{CriticalCssEngine, EngineError, ExtractionTask},
        fetch::{FetchError, ResourceFetcher},
        storage::CombinedStylesheet,
    },
};

/// Default ceiling for images the engine may inline, in bytes.
pub const DEFAULT_MAX_EMBEDDED_IMAGE_BYTES: u32 = 10240;

/// Failure of one job's pipeline. Any variant aborts the job; none of them
/// affect other jobs or the worker loop.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("page at `{url}` did not return an HTML document")]
    InvalidContent { url: String },
    #[error(transparent)]
    Extraction(#[from] EngineError),
    #[error("css aggregation failed: {0}")]
    Css(String),
    #[error("failed to persist combined stylesheet: {0}")]
    Storage(#[from] std::io::Error),
    #[error(transparent)]
    Rules(#[from] DomainError),
}

impl GenerateError {
    pub fn invalid_content(url: impl Into<String>) -> Self {
        Self::InvalidContent { url: url.into() }
    }

    pub fn css(message: impl Into<String>) -> Self {
        Self::Css(message.into())
    }
}

/// Executes the full pipeline for one request at a time.
///
/// The fetcher and engine are injected so the queue can be exercised without
/// a network or a live rendering service.
#[derive(Clone)]
pub struct GenerationPipeline {
    fetcher: Arc<dyn ResourceFetcher>,
    engine: Arc<dyn CriticalCssEngine>,
}

impl GenerationPipeline {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, engine: Arc<dyn CriticalCssEngine>) -> Self {
        Self { fetcher, engine }
    }

    /// Run resolve → extract → combine → filter for `request`.
    ///
    /// A page without stylesheets completes with an empty stylesheet: no
    /// transient document is written and no extraction calls are made. The
    /// transient document, when created, is released on success and failure
    /// alike.
    pub async fn run(&self, request: &GenerationRequest) -> Result<String, GenerateError> {
        let Some(document) = resolver::resolve(self.fetcher.as_ref(), &request.url).await? else {
            info!(
                target = "application::generator",
                url = %request.url,
                "no stylesheets discovered; nothing to extract"
            );
            return Ok(String::new());
        };

        let outcome = self.extract_and_aggregate(request, &document).await;
        document.release();
        outcome
    }

    async fn extract_and_aggregate(
        &self,
        request: &GenerationRequest,
        document: &CombinedStylesheet,
    ) -> Result<String, GenerateError> {
        let force_include = request.force_include_rules()?;
        let max_embedded_image_bytes = request
            .max_image_file_size
            .unwrap_or(DEFAULT_MAX_EMBEDDED_IMAGE_BYTES);

        // Fan-out: one engine call per viewport, awaited together. A failure
        // on any viewport fails the job; no partial results are kept.
        let calls = request.dimensions.iter().map(|viewport| {
            self.engine.extract(ExtractionTask {
                page_url: &request.url,
                css_path: document.path(),
                viewport: *viewport,
                force_include: &force_include,
                max_embedded_image_bytes,
            })
        });
        let fragments = future::try_join_all(calls).await?;

        debug!(
            target = "application::generator",
            url = %request.url,
            viewports = fragments.len(),
            "per-viewport extraction finished"
        );

        let merged = css::combine(&fragments)?;
        css::filter(&merged, &request.ignore_rules()?)
    }
}
