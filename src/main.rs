use std::{process, sync::Arc};

use ccsss::{
    application::{
        error::AppError,
        generator::GenerationPipeline,
        notify::{self, CompletionNotifier},
        queue::GenerationQueue,
        results::ResultStore,
    },
    config,
    infra::{
        engine::HttpRenderEngine,
        error::InfraError,
        fetch::{self, HttpFetcher},
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let engine_endpoint = settings
        .engine
        .endpoint
        .clone()
        .ok_or_else(|| InfraError::configuration("rendering engine endpoint is not configured"))
        .map_err(AppError::from)?;

    let client = fetch::build_client(&settings.fetch).map_err(AppError::from)?;
    let fetcher = Arc::new(HttpFetcher::new(client.clone()));
    let engine = Arc::new(HttpRenderEngine::new(
        client.clone(),
        engine_endpoint,
        settings.engine.timeout,
    ));

    let pipeline = GenerationPipeline::new(fetcher, engine);
    let (queue, events) = GenerationQueue::start(pipeline);
    let results = Arc::new(ResultStore::new());

    let notifier = CompletionNotifier::new(client);
    let listener = tokio::spawn(notify::listen(events, results.clone(), notifier));

    let state = HttpState {
        queue: Arc::new(queue),
        results,
    };
    let router = http::build_router(state);

    let listener_socket = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "ccsss::startup",
        addr = %settings.server.addr,
        "listening for generation requests"
    );

    let result = axum::serve(listener_socket, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    listener.abort();
    let _ = listener.await;

    result
}
