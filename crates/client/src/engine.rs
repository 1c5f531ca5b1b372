use std::sync::Arc;
use std::time::Duration;

use iot_console_common::constants::REQUEST_TIMEOUT_MS;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, HttpError, Result};
use crate::interceptor::Interceptor;
use crate::request::{RequestBody, RequestConfig};

/// Timed, intercepted HTTP requests returning JSON
///
/// Cheap to clone; clones share the HTTP client and interceptors.
#[derive(Clone)]
pub struct RequestEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    http: reqwest::Client,
    base_url: Option<Url>,
    timeout: Duration,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl RequestEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.inner.base_url.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Resolve an endpoint: absolute URLs pass through, paths join the base URL
    pub fn url(&self, endpoint: &str) -> Result<Url> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(Url::parse(endpoint)?);
        }

        let base = self.inner.base_url.as_ref().ok_or_else(|| {
            ClientError::InvalidRequest(format!("no base URL for endpoint {}", endpoint))
        })?;
        Ok(base.join(endpoint.trim_start_matches('/'))?)
    }

    /// Issue a request, letting `on_error` interceptors recover failures
    pub async fn request(&self, endpoint: &str, config: RequestConfig) -> Result<Value> {
        match self.dispatch(endpoint, config).await {
            Ok(value) => Ok(value),
            Err(error) => self.handle_error(error).await,
        }
    }

    /// Issue a request and decode the JSON result
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<T> {
        let value = self.request(endpoint, config).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn get(&self, endpoint: &str, config: RequestConfig) -> Result<Value> {
        self.request(endpoint, config.method(Method::GET)).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<Value> {
        self.request(endpoint, config.method(Method::POST).json(body)?)
            .await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<Value> {
        self.request(endpoint, config.method(Method::PUT).json(body)?)
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        config: RequestConfig,
    ) -> Result<Value> {
        self.request(endpoint, config.method(Method::PATCH).json(body)?)
            .await
    }

    pub async fn delete(&self, endpoint: &str, config: RequestConfig) -> Result<Value> {
        self.request(endpoint, config.method(Method::DELETE)).await
    }

    /// Issue a request without `on_error` recovery
    ///
    /// Applies `on_request` and `on_response`, the timeout and the caller's
    /// cancellation token. Non-2xx responses become [`ClientError::Http`].
    pub async fn dispatch(&self, endpoint: &str, config: RequestConfig) -> Result<Value> {
        if config.is_cancelled() {
            return Err(ClientError::Aborted);
        }

        let mut config = config;
        for interceptor in &self.inner.interceptors {
            config = interceptor.on_request(config).await?;
        }

        let timeout = config.timeout.unwrap_or(self.inner.timeout);
        let cancel = config.cancel.clone().unwrap_or_default();
        let call = self.execute(endpoint, config);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Request to {} aborted by caller", endpoint);
                Err(ClientError::Aborted)
            }
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(result) => result,
                Err(_) => {
                    warn!("Request to {} timed out after {:?}", endpoint, timeout);
                    Err(ClientError::Timeout)
                }
            },
        }
    }

    async fn execute(&self, endpoint: &str, config: RequestConfig) -> Result<Value> {
        let url = self.url(endpoint)?;
        debug!("{} {}", config.method, url);

        let mut builder = self
            .inner
            .http
            .request(config.method.clone(), url)
            .headers(config.headers.clone());

        if !config.query.is_empty() {
            builder = builder.query(&config.query);
        }

        builder = match &config.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(form)) => builder.multipart(form.to_multipart()?),
            None => builder,
        };

        let mut response = builder.send().await?;
        for interceptor in &self.inner.interceptors {
            response = interceptor.on_response(response).await?;
        }

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(json!({}));
        }

        let bytes = response.bytes().await?;

        if !status.is_success() {
            let data = serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}));
            debug!("{} responded {}", endpoint, status);
            return Err(ClientError::Http(Box::new(HttpError {
                status,
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                data,
                endpoint: endpoint.to_string(),
                config,
            })));
        }

        if bytes.is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn handle_error(&self, error: ClientError) -> Result<Value> {
        let mut error = error;
        for interceptor in &self.inner.interceptors {
            match interceptor.on_error(self, error).await {
                Ok(value) => return Ok(value),
                Err(e) => error = e,
            }
        }
        Err(error)
    }
}

/// Builder for [`RequestEngine`]
pub struct EngineBuilder {
    base_url: Option<String>,
    timeout: Duration,
    http: Option<reqwest::Client>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            http: None,
            interceptors: Vec::new(),
        }
    }

    /// Base URL that relative endpoints are joined onto
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use an existing HTTP client (for example one holding a cookie store)
    pub fn client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> Result<RequestEngine> {
        let base_url = match self.base_url {
            Some(raw) => {
                let mut url = Url::parse(&raw)?;
                if !url.path().ends_with('/') {
                    url.set_path(&format!("{}/", url.path()));
                }
                Some(url)
            }
            None => None,
        };

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .user_agent(format!("iot-console/{}", env!("CARGO_PKG_VERSION")))
                .build()?,
        };

        Ok(RequestEngine {
            inner: Arc::new(EngineInner {
                http,
                base_url,
                timeout: self.timeout,
                interceptors: self.interceptors,
            }),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
