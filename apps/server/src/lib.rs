//! IoT console proxy server
//!
//! Translates console requests into backend API calls: the bearer token comes
//! from the session cookies, the tenant header from the organization cookie.
//! The refresh route re-mints the session cookies, one backend refresh per
//! refresh token at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use iot_console_client::{BearerAuth, RequestEngine};
use iot_console_common::SessionCodec;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod error_handling;
pub mod handlers;
pub mod refresh_lock;

pub use config::{Args, Config};

use handlers::RefreshOutcome;
use refresh_lock::RefreshLocks;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Backend client, bearer token injected per request
    pub engine: RequestEngine,

    /// Client for calls whose redirects are answered rather than followed
    pub redirect_client: reqwest::Client,

    pub codec: SessionCodec,

    pub refresh_locks: RefreshLocks<RefreshOutcome>,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let engine = RequestEngine::builder()
            .base_url(config.upstream_url.as_str())
            .timeout(config.request_timeout)
            .interceptor(Arc::new(BearerAuth))
            .build()
            .context("Failed to build upstream client")?;

        let redirect_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build redirect client")?;

        let codec = SessionCodec::new(config.session_secret.as_bytes(), config.secure_cookies)
            .with_chunk_size(config.cookie_chunk_size)
            .with_max_age(config.session_max_age_secs);

        Ok(Self {
            engine,
            redirect_client,
            codec,
            refresh_locks: RefreshLocks::new(),
            config: Arc::new(config),
        })
    }
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(handle_health))
        // Devices
        .route(
            "/api/devices",
            get(handle_list_devices).post(handle_create_devices),
        )
        .route(
            "/api/devices/{id}",
            get(handle_get_device)
                .patch(handle_update_device)
                .delete(handle_delete_device),
        )
        .route("/api/devices/{id}/events", get(handle_device_events))
        // Device connectors
        .route(
            "/api/device-connector",
            get(handle_list_connectors).post(handle_create_connector),
        )
        .route("/api/device-connector/{id}", delete(handle_delete_connector))
        .route(
            "/api/device-connector/test-connection/{id}",
            get(handle_test_connection),
        )
        .route(
            "/api/device-connector/test-connector-preview",
            post(handle_test_connection_preview),
        )
        // Catalog
        .route("/api/device-models", get(handle_device_models))
        .route("/api/network-server", get(handle_network_servers))
        .route("/api/console/organization", get(handle_organizations))
        .route("/api/trip/{device_id}", get(handle_trip))
        // Account
        .route("/api/auth/sign-in", post(handle_sign_in))
        .route("/api/auth/sign-out", post(handle_sign_out))
        .route("/api/auth/sign-up", post(handle_sign_up))
        .route("/api/auth/send-otp", post(handle_send_otp))
        .route("/api/auth/send-email", post(handle_send_email))
        .route("/api/auth/forget-password", post(handle_forget_password))
        .route("/api/auth/socials", post(handle_socials))
        .route("/api/auth/socials/google", post(handle_google_login))
        .route(
            "/api/auth/switch-organization",
            post(handle_switch_organization),
        )
        .route("/api/auth/me", get(handle_get_me).put(handle_update_me))
        .route("/api/refresh-token", post(handle_refresh_token))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
