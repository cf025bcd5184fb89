use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error surface for the operator endpoints (history, strategies, status).
///
/// The trading webhook never returns these: a rejected or failed order still
/// answers 200 with an error envelope, so the alert sender does not
/// re-deliver a signal that already reached the exchange.
#[derive(Debug)]
pub enum ApiError {
    /// Unknown strategy id or webhook id.
    NotFound(String),
    /// Storage failure behind a read endpoint.
    Internal(String),
    /// History endpoints on a deployment without a database.
    ServiceUnavailable,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "api_internal_error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "history storage is not configured".into(),
            ),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
