//! Session extraction and the route guard
//!
//! The session lives in the chunked session cookies; the tenant comes from the
//! `default_organization` cookie, falling back to the session's own claim.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::Response;
use iot_console_client::RequestConfig;
use iot_console_common::constants::{
    ORGANIZATION_COOKIE_NAME, ORGANIZATION_HEADER, REQUEST_ID_HEADER,
};
use iot_console_common::validation::{
    requires_session, sanitize_header_value, validate_resource_id,
};
use iot_console_common::{CookieJar, Session, SessionCodec, generate_id};
use tracing::{debug, warn};

use crate::AppState;
use crate::error_handling::{ApiError, ApiResult, unauthorized};

/// Per-request view of the caller: cookies, session, tenant and request id
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub jar: CookieJar,
    pub session: Option<Session>,
    pub organization: Option<String>,
    pub request_id: String,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, codec: &SessionCodec) -> Self {
        let jar = CookieJar::from_headers(headers);
        let session = codec.decode(&jar);
        Self::with_session(headers, jar, session)
    }

    fn with_session(headers: &HeaderMap, jar: CookieJar, session: Option<Session>) -> Self {
        let organization = jar
            .get(ORGANIZATION_COOKIE_NAME)
            .and_then(|value| sanitize_header_value(value).ok())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                session
                    .as_ref()
                    .and_then(Session::default_organization)
                    .map(str::to_string)
            });

        // Keep a caller supplied id when it is a plain token
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| validate_resource_id(value).is_ok())
            .map(str::to_string)
            .unwrap_or_else(generate_id);

        Self {
            jar,
            session,
            organization,
            request_id,
        }
    }

    pub fn require_session(&self) -> ApiResult<&Session> {
        self.session.as_ref().ok_or(ApiError::Unauthorized)
    }

    /// Backend request carrying the bearer token and request id
    pub fn upstream(&self, method: Method) -> RequestConfig {
        let mut config = RequestConfig::new(method);
        if let Some(session) = &self.session {
            config = config.access_token(session.access.as_str());
        }
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            config = config.header(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        config
    }

    /// [`Self::upstream`] plus the tenant header
    pub fn tenant(&self, method: Method) -> RequestConfig {
        let config = self.upstream(method);
        let Some(organization) = self.organization.as_deref() else {
            return config;
        };

        match HeaderValue::from_str(organization) {
            Ok(value) => config.header(HeaderName::from_static(ORGANIZATION_HEADER), value),
            Err(_) => {
                warn!(request_id = %self.request_id, "Organization cookie is not a valid header value");
                config
            }
        }
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // The guard already verified the session for protected routes
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            let jar = CookieJar::from_headers(&parts.headers);
            return Ok(Self::with_session(&parts.headers, jar, Some(session)));
        }
        Ok(Self::from_headers(&parts.headers, &state.codec))
    }
}

/// Reject protected routes without a valid session
///
/// The decoded session is stored in the request extensions for the handler.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !requires_session(&path) {
        return next.run(request).await;
    }

    let jar = CookieJar::from_headers(request.headers());
    match state.codec.decode(&jar) {
        Some(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        None => {
            debug!("No valid session for {}", path);
            unauthorized()
        }
    }
}
