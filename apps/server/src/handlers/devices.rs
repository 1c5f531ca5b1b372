//! Device inventory routes
//!
//! Listing and bulk creation go to the organization's device collection;
//! single devices are addressed by backend id. Table edits arrive as flat rows
//! and are nested under `lorawan_device` before they reach the backend.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use iot_console_common::constants::DEVICE_PAGE_SIZE;
use iot_console_common::models::{DeviceCredentials, DeviceEvent, DevicePatch, TableDevice};
use iot_console_common::validation::{
    normalize_eui, validate_device_credentials, validate_resource_id,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::{ApiError, ApiResult};

/// Events in the sample feed
const SAMPLE_EVENT_COUNT: usize = 11;

/// Query of the device table
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListQuery {
    pub page_index: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl DeviceListQuery {
    /// Zero based page, anything unparsable is the first page
    fn page(&self) -> u64 {
        self.page_index
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Row offset of the page, `None` when it does not fit in a `u64`
    fn offset(&self) -> Option<u64> {
        self.page().checked_mul(u64::from(DEVICE_PAGE_SIZE))
    }
}

pub async fn handle_list_devices(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<DeviceListQuery>,
) -> ApiResult<Json<Value>> {
    let offset = query
        .offset()
        .ok_or_else(|| ApiError::BadRequest("Invalid page index".to_string()))?;
    let config = ctx
        .tenant(Method::GET)
        .query("limit", DEVICE_PAGE_SIZE)
        .query("offset", offset)
        .query("search", query.search.unwrap_or_default())
        .query("status", query.status.unwrap_or_default());

    let data = state.engine.request("/devices/", config).await?;
    Ok(Json(data))
}

/// Validate and bulk create devices
///
/// Invalid credentials are rejected before the backend is called, with the
/// per-device nested errors the backend itself would return.
pub async fn handle_create_devices(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let mut devices: Vec<DeviceCredentials> = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid device list: {}", e)))?;
    if devices.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one device is required".to_string(),
        ));
    }

    if let Some(errors) = validate_device_credentials(&devices) {
        info!(request_id = %ctx.request_id, "Rejected bulk create of {} device(s)", devices.len());
        return Err(ApiError::Invalid(errors));
    }

    for device in &mut devices {
        device.lorawan_device.dev_eui = normalize_eui(&device.lorawan_device.dev_eui);
        device.lorawan_device.join_eui = normalize_eui(&device.lorawan_device.join_eui);
    }

    let config = ctx.tenant(Method::POST).json(&devices)?;
    let data = state
        .engine
        .request("/devices/bulk-create/", config)
        .await?;
    Ok(Json(data))
}

pub async fn handle_get_device(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_resource_id(&id)?;
    let data = state
        .engine
        .request(&format!("/devices/{}/", id), ctx.tenant(Method::GET))
        .await?;
    Ok(Json(data))
}

/// Apply a table row edit
pub async fn handle_update_device(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
    Json(row): Json<TableDevice>,
) -> ApiResult<Json<Value>> {
    validate_resource_id(&id)?;
    let patch = DevicePatch::from(row);
    debug!(request_id = %ctx.request_id, "Updating device {}", id);

    let data = state
        .engine
        .patch(&format!("/devices/{}/", id), &patch, ctx.tenant(Method::PATCH))
        .await?;
    Ok(Json(data))
}

pub async fn handle_delete_device(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_resource_id(&id)?;
    let data = state
        .engine
        .request(&format!("/devices/{}/", id), ctx.tenant(Method::DELETE))
        .await?;
    Ok(Json(data))
}

/// Sample event feed for the device detail page
///
/// The backend has no events API yet.
pub async fn handle_device_events(Path(id): Path<String>) -> ApiResult<Json<Value>> {
    validate_resource_id(&id)?;
    let events = sample_events(Utc::now(), SAMPLE_EVENT_COUNT);
    Ok(Json(json!({
        "count": events.len(),
        "results": events,
    })))
}

/// `count` events, newest first, one second apart
fn sample_events(now: DateTime<Utc>, count: usize) -> Vec<DeviceEvent> {
    (0..count)
        .map(|i| DeviceEvent {
            timestamp: (now - TimeDelta::seconds(i as i64))
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            node_id: "test-node".to_string(),
            event_code: "00 0C OF 01".to_string(),
            data: vec![json!(12), json!("green"), json!(25.93)],
        })
        .collect()
}
