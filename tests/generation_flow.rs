//! End-to-end pipeline tests against a stubbed origin and rendering engine.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use ccsss::{
    application::{
        generator::GenerationPipeline,
        notify::{self, CompletionNotifier},
        queue::GenerationQueue,
        results::ResultStore,
    },
    config::FetchSettings,
    domain::request::{GenerationRequest, Viewport},
    infra::{
        engine::{CriticalCssEngine, EngineError, ExtractionTask},
        fetch::{self, HttpFetcher},
        http::{HttpState, build_router},
    },
};
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const PAGE_HTML: &str = r#"<html><head>
    <link rel="stylesheet" href="/style.css">
</head><body><div class="blue">hello</div></body></html>"#;

const PAGE_CSS: &str =
    ".blue { color: blue; } .thick { border-width: 10px; } .small-margin { margin: 5px; }";

/// Stand-in for the rendering engine: a rule survives extraction when its
/// selector is present in the combined stylesheet and either counts as used
/// on the page or is force-included by the request.
struct UsedSelectorEngine {
    used: Vec<&'static str>,
}

const KNOWN_RULES: &[(&str, &str)] = &[
    (".blue", ".blue { color: blue; }"),
    (".thick", ".thick { border-width: 10px; }"),
    (".small-margin", ".small-margin { margin: 5px; }"),
];

#[async_trait]
impl CriticalCssEngine for UsedSelectorEngine {
    async fn extract(&self, task: ExtractionTask<'_>) -> Result<String, EngineError> {
        let css = tokio::fs::read_to_string(task.css_path)
            .await
            .map_err(|err| EngineError::new(err.to_string()))?;

        let fragments: Vec<&str> = KNOWN_RULES
            .iter()
            .filter(|(selector, _)| {
                css.contains(selector)
                    && (self.used.contains(selector) || task.force_include.matches(selector))
            })
            .map(|(_, rule)| *rule)
            .collect();

        Ok(fragments.join(" "))
    }
}

async fn stub_origin() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_HTML))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_CSS))
        .mount(&server)
        .await;
    server
}

fn http_fetcher() -> Arc<HttpFetcher> {
    let client = fetch::build_client(&FetchSettings {
        user_agent: "ccsss".to_string(),
        accept_invalid_certs: true,
        timeout: Duration::from_secs(5),
    })
    .expect("client should build");
    Arc::new(HttpFetcher::new(client))
}

fn request_for(origin: &MockServer) -> GenerationRequest {
    GenerationRequest {
        url: Url::parse(&format!("{}/page", origin.uri())).expect("valid url"),
        dimensions: vec![
            Viewport {
                width: 800,
                height: 600,
            },
            Viewport {
                width: 1280,
                height: 1024,
            },
        ],
        ignore: Vec::new(),
        ignore_re: Vec::new(),
        force_include: Vec::new(),
        force_include_re: Vec::new(),
        notification_url: None,
        max_image_file_size: None,
        result_endpoint: String::new(),
    }
}

#[tokio::test]
async fn generates_minified_critical_css_across_viewports() {
    let origin = stub_origin().await;
    let pipeline = GenerationPipeline::new(
        http_fetcher(),
        Arc::new(UsedSelectorEngine {
            used: vec![".blue"],
        }),
    );

    let css = pipeline
        .run(&request_for(&origin))
        .await
        .expect("generation should succeed");

    // Identical per-viewport fragments collapse into one minified rule.
    assert_eq!(css, ".blue{color:#00f}");
}

#[tokio::test]
async fn ignore_rules_strip_selectors_from_the_result() {
    let origin = stub_origin().await;
    let pipeline = GenerationPipeline::new(
        http_fetcher(),
        Arc::new(UsedSelectorEngine {
            used: vec![".blue", ".thick"],
        }),
    );

    let mut request = request_for(&origin);
    request.ignore = vec![".thick".to_string()];

    let css = pipeline
        .run(&request)
        .await
        .expect("generation should succeed");
    assert!(css.contains(".blue"));
    assert!(!css.contains(".thick"));
}

#[tokio::test]
async fn force_include_keeps_rules_the_engine_would_drop() {
    let origin = stub_origin().await;
    let pipeline = GenerationPipeline::new(
        http_fetcher(),
        Arc::new(UsedSelectorEngine {
            used: vec![".blue"],
        }),
    );

    let mut request = request_for(&origin);
    request.force_include = vec![".small-margin".to_string()];

    let css = pipeline
        .run(&request)
        .await
        .expect("generation should succeed");
    assert!(css.contains(".blue{color:#00f}"));
    assert!(css.contains(".small-margin{margin:5px}"));
}

#[tokio::test]
async fn invalid_page_content_fails_without_blocking_later_jobs() {
    let origin = stub_origin().await;
    Mock::given(method("GET"))
        .and(path("/notpage"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("{\"this\": \"is not a web page\"}"),
        )
        .mount(&origin)
        .await;

    let pipeline = GenerationPipeline::new(
        http_fetcher(),
        Arc::new(UsedSelectorEngine {
            used: vec![".blue"],
        }),
    );
    let (queue, events) = GenerationQueue::start(pipeline);
    let results = Arc::new(ResultStore::new());
    tokio::spawn(notify::listen(
        events,
        results.clone(),
        CompletionNotifier::new(reqwest::Client::new()),
    ));

    let mut bad = request_for(&origin);
    bad.url = Url::parse(&format!("{}/notpage", origin.uri())).expect("valid url");
    let bad_id = queue.enqueue(bad);
    let good_id = queue.enqueue(request_for(&origin));

    let css = await_result(&results, &good_id).await;
    assert_eq!(css, ".blue{color:#00f}");
    assert_eq!(results.take(&bad_id), None);
}

#[tokio::test]
async fn full_round_trip_delivers_webhook_and_one_shot_result() {
    let origin = stub_origin().await;
    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let pipeline = GenerationPipeline::new(
        http_fetcher(),
        Arc::new(UsedSelectorEngine {
            used: vec![".blue"],
        }),
    );
    let (queue, events) = GenerationQueue::start(pipeline);
    let results = Arc::new(ResultStore::new());
    tokio::spawn(notify::listen(
        events,
        results.clone(),
        CompletionNotifier::new(reqwest::Client::new()),
    ));

    let router = build_router(HttpState {
        queue: Arc::new(queue),
        results,
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port");
    let addr = listener.local_addr().expect("bound address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });

    let client = reqwest::Client::new();
    let submission = client
        .post(format!("http://{addr}/generation/request"))
        .json(&json!({
            "url": format!("{}/page", origin.uri()),
            "dimensions": [{ "width": 800, "height": 600 }],
            "notificationUrl": format!("{}/notifications", webhook.uri())
        }))
        .send()
        .await
        .expect("submission should reach the service");
    assert_eq!(submission.status().as_u16(), 202);
    let accepted: Value = submission.json().await.expect("pending body");
    let generation_id = accepted["generationId"].as_str().expect("generation id");

    let delivery = await_webhook(&webhook).await;
    assert_eq!(delivery["generationId"], generation_id);
    assert_eq!(delivery["status"], "success");

    let result_location = delivery["resultLocation"].as_str().expect("result location");
    assert!(result_location.ends_with(generation_id));

    let first = client
        .get(result_location)
        .send()
        .await
        .expect("result should be reachable");
    assert_eq!(first.status().as_u16(), 200);
    assert!(
        first
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/css"))
    );
    assert_eq!(first.text().await.expect("css body"), ".blue{color:#00f}");

    // Results are collectable exactly once.
    let second = client
        .get(result_location)
        .send()
        .await
        .expect("service still up");
    assert_eq!(second.status().as_u16(), 404);
}

async fn await_result(results: &ResultStore, id: &Uuid) -> String {
    for _ in 0..100 {
        if let Some(css) = results.take(id) {
            return css;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("generation did not complete in time");
}

async fn await_webhook(webhook: &MockServer) -> Value {
    for _ in 0..100 {
        if let Some(requests) = webhook.received_requests().await
            && let Some(request) = requests.first()
        {
            return serde_json::from_slice(&request.body).expect("webhook body should be json");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("webhook was not delivered in time");
}
