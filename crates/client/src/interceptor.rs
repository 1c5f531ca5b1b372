use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde_json::Value;
use tracing::warn;

use crate::engine::RequestEngine;
use crate::error::{ClientError, Result};
use crate::request::RequestConfig;

/// Hooks around every request issued by a [`RequestEngine`]
///
/// Interceptors run in registration order. `on_error` stops at the first
/// interceptor that recovers a value.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig> {
        Ok(config)
    }

    async fn on_response(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        Ok(response)
    }

    /// Recover from a failed request, or pass the error on
    async fn on_error(&self, _engine: &RequestEngine, error: ClientError) -> Result<Value> {
        Err(error)
    }
}

/// Injects `Authorization: Bearer <access>` from the request's access token
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerAuth;

#[async_trait]
impl Interceptor for BearerAuth {
    async fn on_request(&self, mut config: RequestConfig) -> Result<RequestConfig> {
        let Some(token) = config.access_token.as_deref() else {
            return Ok(config);
        };

        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(value) => {
                config.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => warn!("Access token is not a valid header value, sending without it"),
        }
        Ok(config)
    }
}
