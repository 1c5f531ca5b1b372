//! Session refresh route
//!
//! Exchanges the session's refresh token for a new token pair and re-mints the
//! session cookies. Concurrent refreshes with the same refresh token share one
//! backend call; every caller gets the new session, written after clear
//! directives covering every chunk it sent.

use axum::{Extension, Json};
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use iot_console_client::{ClientError, RequestConfig};
use iot_console_common::models::RefreshRequest;
use iot_console_common::{Session, SetCookie};
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::json_with_cookies;
use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::{ApiError, aborted, sanitize_error_with_message, unauthorized};

/// Result of one backend refresh, shared by every request that awaited it
#[derive(Debug, Clone)]
pub struct MintedSession {
    /// Backend response, returned as the route's body
    pub data: Value,
    /// Chunk set of the new session
    pub cookies: Vec<SetCookie>,
}

#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("refresh rejected: {0}")]
    Upstream(#[from] ClientError),

    #[error("refresh response has no token pair")]
    MissingTokens,

    #[error("failed to encode session: {0}")]
    Encode(String),
}

pub type RefreshOutcome = Result<MintedSession, RefreshError>;

/// `POST /api/refresh-token`
///
/// A [`CancellationToken`] extension, when present, marks the inbound request
/// as aborted.
pub async fn handle_refresh_token(
    State(state): State<AppState>,
    ctx: RequestContext,
    cancel: Option<Extension<CancellationToken>>,
) -> Response {
    let cancel = cancel.map(|Extension(token)| token).unwrap_or_default();
    refresh_session(&state, &ctx, &cancel).await
}

/// Join or start the refresh for the caller's refresh token
///
/// 401 without a session; 499 when `cancel` fired and there is no running
/// refresh to join; 500 when the refresh fails.
pub async fn refresh_session(
    state: &AppState,
    ctx: &RequestContext,
    cancel: &CancellationToken,
) -> Response {
    let Some(session) = ctx.session.as_ref() else {
        return unauthorized();
    };

    // The access token is expired; only the refresh token is sent
    let mut config = ctx.upstream(Method::POST);
    config.access_token = None;
    let refresh = mint_session(state.clone(), config, session.refresh.clone());

    let Some(lease) = state
        .refresh_locks
        .acquire(&session.refresh, cancel, refresh)
        .await
    else {
        debug!(request_id = %ctx.request_id, "Refresh request aborted");
        return aborted();
    };

    if lease.is_joined() {
        debug!(request_id = %ctx.request_id, "Awaiting in-flight refresh");
    }

    let minted = match lease.outcome().await {
        Some(Ok(minted)) => minted,
        Some(Err(e)) => {
            debug!(request_id = %ctx.request_id, "Session refresh failed");
            let message =
                sanitize_error_with_message(&anyhow::Error::new(e), "Internal Server Error");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message })))
                .into_response();
        }
        None => {
            return ApiError::Internal(anyhow::anyhow!("refresh task ended without a result"))
                .into_response();
        }
    };

    let mut directives = state.codec.clear(&ctx.jar);
    directives.extend(minted.cookies);
    json_with_cookies(minted.data, &directives).unwrap_or_else(IntoResponse::into_response)
}

async fn mint_session(state: AppState, config: RequestConfig, refresh: String) -> RefreshOutcome {
    let config = config.json(&RefreshRequest { refresh })?;
    let data = state
        .engine
        .request("/console/auth/refresh-token", config)
        .await?;

    let session = Session::from_token_response(&data).ok_or(RefreshError::MissingTokens)?;
    let cookies = state
        .codec
        .encode(&session)
        .map_err(|e| RefreshError::Encode(e.to_string()))?;

    info!("Session refreshed ({} cookie(s))", cookies.len());
    Ok(MintedSession { data, cookies })
}
