use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::request::RequestConfig;

/// Errors surfaced by the request engine
///
/// Cloneable so one refresh failure can be handed to every queued caller.
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Request timeout, please try again later")]
    Timeout,

    #[error("Request aborted")]
    Aborted,

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Http(Box<HttpError>),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Max refresh attempts exceeded")]
    RefreshExhausted,

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Non-2xx response, with everything needed to replay the request
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: StatusCode,
    pub status_text: String,
    /// Response body parsed as JSON, `{}` when it was not JSON
    pub data: Value,
    /// Endpoint as passed to the engine
    pub endpoint: String,
    /// Request config after `on_request` interceptors ran
    pub config: RequestConfig,
}

impl HttpError {
    /// `message` or `detail` from the response body
    pub fn message(&self) -> Option<&str> {
        ["message", "detail"]
            .iter()
            .find_map(|key| self.data.get(*key).and_then(Value::as_str))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message().unwrap_or("Request failed"))
    }
}

impl ClientError {
    pub fn http(&self) -> Option<&HttpError> {
        match self {
            ClientError::Http(e) => Some(e),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.http().map(|e| e.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_builder() {
            ClientError::InvalidRequest(e.to_string())
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidRequest(format!("invalid URL: {}", e))
    }
}

/// Type alias for Results using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;
