//! FIFO job queue with a single worker task.
//!
//! The queue owns its pending list (the channel) and its single-flight
//! guarantee (the one worker consuming it). Enqueueing never runs pipeline
//! work on the caller's stack; the worker picks jobs up on its own task.
//! At most one job's pipeline executes at a time; the per-viewport fan-out
//! inside the pipeline is the only intra-job concurrency.

use std::{any::Any, time::Instant};

use futures::FutureExt;
use metrics::{counter, histogram};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::domain::request::GenerationRequest;

use super::generator::GenerationPipeline;

/// A request with its queue-assigned identity.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub request: GenerationRequest,
}

/// Raised exactly once per successfully completed job, in FIFO order.
///
/// Failed jobs raise nothing: there is no failure event in this design, so
/// a caller can only distinguish "failed" from "still pending" by timeout.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub job: GenerationJob,
    pub critical_css: String,
}

/// Handle for submitting generation requests.
pub struct GenerationQueue {
    jobs: UnboundedSender<GenerationJob>,
}

impl GenerationQueue {
    /// Create the queue and spawn its worker task. Completion events arrive
    /// on the returned receiver, one per successful job.
    pub fn start(pipeline: GenerationPipeline) -> (Self, UnboundedReceiver<CompletionEvent>) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(jobs_rx, events_tx, pipeline));
        (Self { jobs: jobs_tx }, events_rx)
    }

    /// Assign a fresh id, append the request to the tail of the pending
    /// list, and return immediately.
    pub fn enqueue(&self, request: GenerationRequest) -> Uuid {
        let id = Uuid::new_v4();
        counter!("ccsss_jobs_enqueued_total").increment(1);
        info!(
            target = "application::queue",
            generation_id = %id,
            url = %request.url,
            "generation request enqueued"
        );

        if self.jobs.send(GenerationJob { id, request }).is_err() {
            // Only possible while the process is shutting down.
            error!(
                target = "application::queue",
                generation_id = %id,
                "worker is gone; dropping generation request"
            );
        }

        id
    }
}

/// One job at a time, strict FIFO. Every per-job failure, panics included,
/// is caught at the job boundary so the loop always returns to idle.
async fn worker_loop(
    mut jobs: UnboundedReceiver<GenerationJob>,
    events: UnboundedSender<CompletionEvent>,
    pipeline: GenerationPipeline,
) {
    while let Some(job) = jobs.recv().await {
        let started_at = Instant::now();
        let span = info_span!(
            target: "application::queue",
            "generation",
            generation_id = %job.id
        );
        let outcome = std::panic::AssertUnwindSafe(pipeline.run(&job.request))
            .catch_unwind()
            .instrument(span)
            .await;
        histogram!("ccsss_generation_ms").record(started_at.elapsed().as_millis() as f64);

        match outcome {
            Ok(Ok(critical_css)) => {
                counter!("ccsss_jobs_completed_total").increment(1);
                info!(
                    target = "application::queue",
                    generation_id = %job.id,
                    url = %job.request.url,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    css_bytes = critical_css.len(),
                    "critical css generated"
                );
                if events.send(CompletionEvent { job, critical_css }).is_err() {
                    error!(
                        target = "application::queue",
                        "completion listener is gone; result dropped"
                    );
                }
            }
            Ok(Err(err)) => {
                counter!("ccsss_jobs_failed_total").increment(1);
                error!(
                    target = "application::queue",
                    generation_id = %job.id,
                    url = %job.request.url,
                    error = %err,
                    "generation failed"
                );
            }
            Err(panic) => {
                counter!("ccsss_jobs_failed_total").increment(1);
                error!(
                    target = "application::queue",
                    generation_id = %job.id,
                    url = %job.request.url,
                    panic = panic_message(panic.as_ref()),
                    "generation panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "opaque panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc, time::Duration};

    use async_trait::async_trait;
    use tokio::time::timeout;
    use url::Url;

    use crate::{
        domain::request::{GenerationRequest, Viewport},
        infra::{
            engine::{CriticalCssEngine, EngineError, ExtractionTask},
            fetch::{FetchError, ResourceFetcher},
        },
    };

    use super::*;

    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    struct StaticFetcher {
        resources: HashMap<String, Vec<u8>>,
    }

    impl StaticFetcher {
        fn new(resources: &[(&str, &str)]) -> Self {
            Self {
                resources: resources
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ResourceFetcher for StaticFetcher {
        async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
            self.resources
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| FetchError::new(url.as_str(), "connection refused"))
        }
    }

    /// Engine that echoes the combined stylesheet back unchanged.
    struct EchoEngine;

    #[async_trait]
    impl CriticalCssEngine for EchoEngine {
        async fn extract(&self, task: ExtractionTask<'_>) -> Result<String, EngineError> {
            tokio::fs::read_to_string(task.css_path)
                .await
                .map_err(|err| EngineError::new(err.to_string()))
        }
    }

    struct PanickingEngine;

    #[async_trait]
    impl CriticalCssEngine for PanickingEngine {
        async fn extract(&self, _task: ExtractionTask<'_>) -> Result<String, EngineError> {
            panic!("engine fell over");
        }
    }

    fn sample_site() -> StaticFetcher {
        StaticFetcher::new(&[
            (
                "http://site.test/page",
                r#"<html><link rel="stylesheet" href="style.css"></html>"#,
            ),
            ("http://site.test/style.css", ".blue{color:blue}"),
        ])
    }

    fn request_for(url: &str) -> GenerationRequest {
        GenerationRequest {
            url: Url::parse(url).expect("valid url"),
            dimensions: vec![Viewport {
                width: 800,
                height: 600,
            }],
            ignore: Vec::new(),
            ignore_re: Vec::new(),
            force_include: Vec::new(),
            force_include_re: Vec::new(),
            notification_url: None,
            max_image_file_size: None,
            result_endpoint: String::new(),
        }
    }

    fn pipeline_with(fetcher: StaticFetcher, engine: impl CriticalCssEngine + 'static) -> GenerationPipeline {
        GenerationPipeline::new(Arc::new(fetcher), Arc::new(engine))
    }

    #[tokio::test]
    async fn identical_requests_receive_distinct_ids() {
        let (queue, _events) = GenerationQueue::start(pipeline_with(sample_site(), EchoEngine));
        let first = queue.enqueue(request_for("http://site.test/page"));
        let second = queue.enqueue(request_for("http://site.test/page"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn jobs_complete_in_enqueue_order() {
        let (queue, mut events) = GenerationQueue::start(pipeline_with(sample_site(), EchoEngine));

        let ids: Vec<_> = (0..3)
            .map(|_| queue.enqueue(request_for("http://site.test/page")))
            .collect();

        for expected in ids {
            let event = timeout(RECV_TIMEOUT, events.recv())
                .await
                .expect("event in time")
                .expect("worker alive");
            assert_eq!(event.job.id, expected);
            assert_eq!(event.critical_css, ".blue{color:#00f}");
        }
    }

    #[tokio::test]
    async fn failed_job_produces_no_event_and_does_not_block_the_next() {
        let (queue, mut events) = GenerationQueue::start(pipeline_with(sample_site(), EchoEngine));

        let _failing = queue.enqueue(request_for("http://unreachable.test/page"));
        let ok = queue.enqueue(request_for("http://site.test/page"));

        let event = timeout(RECV_TIMEOUT, events.recv())
            .await
            .expect("event in time")
            .expect("worker alive");
        assert_eq!(event.job.id, ok);
    }

    #[tokio::test]
    async fn worker_survives_a_panicking_stage() {
        let fetcher = StaticFetcher::new(&[
            (
                "http://site.test/page",
                r#"<html><link rel="stylesheet" href="style.css"></html>"#,
            ),
            ("http://site.test/style.css", ".blue{color:blue}"),
            (
                "http://other.test/page",
                r#"<html><link rel="stylesheet" href="style.css"></html>"#,
            ),
            ("http://other.test/style.css", ".red{color:red}"),
        ]);

        // First job panics inside the engine; the worker must still pick up
        // nothing further from it and keep serving the queue.
        struct FlakyEngine;

        #[async_trait]
        impl CriticalCssEngine for FlakyEngine {
            async fn extract(&self, task: ExtractionTask<'_>) -> Result<String, EngineError> {
                if task.page_url.host_str() == Some("site.test") {
                    panic!("engine fell over");
                }
                tokio::fs::read_to_string(task.css_path)
                    .await
                    .map_err(|err| EngineError::new(err.to_string()))
            }
        }

        let (queue, mut events) = GenerationQueue::start(pipeline_with(fetcher, FlakyEngine));

        let _panicking = queue.enqueue(request_for("http://site.test/page"));
        let ok = queue.enqueue(request_for("http://other.test/page"));

        let event = timeout(RECV_TIMEOUT, events.recv())
            .await
            .expect("event in time")
            .expect("worker alive");
        assert_eq!(event.job.id, ok);
        assert_eq!(event.critical_css, ".red{color:red}");
    }

    #[tokio::test]
    async fn page_without_stylesheets_completes_with_empty_css() {
        let fetcher = StaticFetcher::new(&[(
            "http://site.test/page",
            "<html><body>no styles here</body></html>",
        )]);
        let (queue, mut events) = GenerationQueue::start(pipeline_with(fetcher, PanickingEngine));

        let id = queue.enqueue(request_for("http://site.test/page"));

        // The panicking engine proves no extraction call is made.
        let event = timeout(RECV_TIMEOUT, events.recv())
            .await
            .expect("event in time")
            .expect("worker alive");
        assert_eq!(event.job.id, id);
        assert_eq!(event.critical_css, "");
    }
}
