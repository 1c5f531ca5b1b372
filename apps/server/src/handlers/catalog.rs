//! Pickers used by the device forms: device models and network servers

use axum::Json;
use axum::extract::{Query, State};
use axum::http::Method;
use iot_console_common::constants::{DEVICE_MODEL_PAGE_SIZE, NETWORK_SERVER_PAGE_SIZE};
use serde::Deserialize;
use serde_json::Value;

use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub offset: Option<String>,
}

impl CatalogQuery {
    fn offset(&self) -> u64 {
        self.offset
            .as_deref()
            .and_then(|o| o.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// First page of device models matching `search`
pub async fn handle_device_models(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    let config = ctx
        .tenant(Method::GET)
        .query("search", query.search.unwrap_or_default())
        .query("limit", DEVICE_MODEL_PAGE_SIZE)
        .query("offset", 0);
    let data = state.engine.request("/device-models/", config).await?;
    Ok(Json(data))
}

pub async fn handle_network_servers(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    let offset = query.offset();
    let config = ctx
        .tenant(Method::GET)
        .query("search", query.search.unwrap_or_default())
        .query("limit", NETWORK_SERVER_PAGE_SIZE)
        .query("offset", offset);
    let data = state.engine.request("/network-server", config).await?;
    Ok(Json(data))
}
