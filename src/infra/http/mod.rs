pub mod error;
mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{queue::GenerationQueue, results::ResultStore};

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub queue: Arc<GenerationQueue>,
    pub results: Arc<ResultStore>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/generation/request", post(handlers::request_generation))
        .route("/generation/result/{id}", get(handlers::get_result))
        .route("/_health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
