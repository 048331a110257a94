use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::domain::request::GenerationRequest;

use super::{HttpState, error::ApiError};

const RESULT_PATH_PREFIX: &str = "/generation/result/";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingBody {
    generation_id: Uuid,
    status: &'static str,
}

fn example_of_valid_request() -> Value {
    json!({
        "url": "http://www.example.com/",
        "dimensions": [
            { "width": 800, "height": 600 },
            { "width": 1280, "height": 1024 }
        ],
        "forceInclude": [".keep-this-selector"],
        "forceIncludeRe": ["^\\.keep-matching-"],
        "ignore": ["font-face"],
        "ignoreRe": ["\\.generated-"],
        "notificationUrl": "http://api.example.com/notifications/critical-css",
        "maxImageFileSize": 10240
    })
}

pub async fn request_generation(
    State(state): State<HttpState>,
    headers: HeaderMap,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(mut request) = payload.map_err(|rejection| {
        ApiError::invalid_request(rejection.body_text(), example_of_valid_request())
    })?;

    request
        .validate()
        .map_err(|err| ApiError::invalid_request(err.to_string(), example_of_valid_request()))?;

    // The result location is derived from how the caller addressed us, so
    // it stays valid behind whatever name or port the service runs under.
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    request.result_endpoint = format!("http://{host}{RESULT_PATH_PREFIX}");

    let result_endpoint = request.result_endpoint.clone();
    let generation_id = state.queue.enqueue(request);
    let location = format!("{result_endpoint}{generation_id}");

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, location)],
        Json(PendingBody {
            generation_id,
            status: "pending",
        }),
    )
        .into_response())
}

pub async fn get_result(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::not_found("No generation result with this id"))?;

    let css = state
        .results
        .take(&id)
        .ok_or_else(|| ApiError::not_found("No generation result with this id"))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        css,
    )
        .into_response())
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
