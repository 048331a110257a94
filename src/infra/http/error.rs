use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
    #[serde(rename = "exampleOfValidRequest", skip_serializing_if = "Option::is_none")]
    pub example_of_valid_request: Option<Value>,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
}

/// Diagnostic attached to error responses so the shared logging middleware
/// can emit the underlying cause without leaking it to the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub message: String,
}

impl ErrorReport {
    pub fn from_message(source: &'static str, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    example_of_valid_request: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            example_of_valid_request: None,
        }
    }

    /// Invalid submissions carry an example of an acceptable request body.
    pub fn invalid_request(message: impl Into<String>, example: Value) -> Self {
        let mut error = Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message);
        error.example_of_valid_request = Some(example);
        error
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.message.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
            },
            example_of_valid_request: self.example_of_valid_request,
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message("infra::http", format!("{}: {detail}", self.code))
            .attach(&mut response);
        response
    }
}
