//! Error handling and sanitization
//!
//! Upstream failures are forwarded with the backend's status and either its
//! `message`/`detail` or its whole body. Internal failures are logged in full
//! and answered with a generic message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use iot_console_client::ClientError;
use iot_console_common::constants::CLIENT_CLOSED_REQUEST;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by route handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Backend call failed
    #[error(transparent)]
    Upstream(#[from] ClientError),

    /// Missing or malformed input, answered as `{"error": ...}`
    #[error("{0}")]
    BadRequest(String),

    /// Field errors in the backend's nested shape, answered as `{"response": ...}`
    #[error("Invalid input")]
    Invalid(Value),

    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Type alias for handler results
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<iot_console_common::ConsoleError> for ApiError {
    fn from(e: iot_console_common::ConsoleError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl From<iot_console_common::validation::ValidationError> for ApiError {
    fn from(e: iot_console_common::validation::ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Upstream(e) => upstream_error_response(&e),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Invalid(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "response": errors }))).into_response()
            }
            ApiError::Unauthorized => unauthorized(),
            ApiError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": sanitize_error(&e) })),
            )
                .into_response(),
        }
    }
}

/// `401 {"error": "Unauthorized"}`
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

/// `499 {"error": "Request aborted"}`
pub fn aborted() -> Response {
    let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({ "error": "Request aborted" }))).into_response()
}

/// Map a failed backend call to the console's error response
///
/// HTTP errors keep the upstream status: `{"message": ...}` when the body has a
/// `message` or `detail`, otherwise `{"response": <body>}`.
pub fn upstream_error_response(e: &ClientError) -> Response {
    match e {
        ClientError::Http(http) => {
            let body = match http.message() {
                Some(message) => json!({ "message": message }),
                None => json!({ "response": http.data }),
            };
            warn!("Upstream {} responded {}", http.endpoint, http.status);
            (http.status, Json(body)).into_response()
        }
        ClientError::Timeout => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "message": e.to_string() })),
        )
            .into_response(),
        ClientError::Aborted => aborted(),
        _ => {
            let message = get_client_error_message(e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": message })),
            )
                .into_response()
        }
    }
}

/// Sanitize error messages for client responses
///
/// Logs the full error internally but returns a generic message to the client
/// to prevent information disclosure of internal implementation details.
pub fn sanitize_error(e: &anyhow::Error) -> String {
    error!("Internal error: {:#}", e);
    "Internal Server Error".to_string()
}

/// Sanitize error with a custom client message
pub fn sanitize_error_with_message(e: &anyhow::Error, client_message: &str) -> String {
    error!("Error ({}): {:#}", client_message, e);
    client_message.to_string()
}

/// Check if an error should be shown to the client (for known safe errors)
///
/// Timeouts, aborts and exhausted refreshes are safe to show; transport and
/// decode failures may carry internal addresses and are sanitized.
pub fn is_safe_error(e: &ClientError) -> bool {
    matches!(
        e,
        ClientError::Timeout
            | ClientError::Aborted
            | ClientError::RefreshExhausted
            | ClientError::RefreshFailed(_)
    )
}

/// Get a user-friendly error message
pub fn get_client_error_message(e: &ClientError) -> String {
    if is_safe_error(e) {
        warn!("Client error: {}", e);
        e.to_string()
    } else {
        sanitize_error(&anyhow::Error::new(e.clone()))
    }
}
