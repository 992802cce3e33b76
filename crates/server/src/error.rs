//! Converts [`CoreError`] into an HTTP response for request/response
//! endpoints that haven't started a session yet. Once a session exists,
//! failures become terminal SSE events instead, handled inline by each
//! stream handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use callforge_core::CoreError;
use serde_json::json;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::SessionNotFound(_) | CoreError::CallRecordNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self.0, "request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
