//! Device connector routes

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use iot_console_common::validation::validate_resource_id;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::{ApiError, ApiResult};

/// Status every new connector starts in
const INITIAL_CONNECTOR_STATUS: &str = "disconnected";

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

pub async fn handle_list_connectors(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let config = ctx
        .upstream(Method::GET)
        .query("search", query.search.unwrap_or_default());
    let data = state.engine.request("/device-connector", config).await?;
    Ok(Json(data))
}

/// Create a connector; the status is always forced to `disconnected`
pub async fn handle_create_connector(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let Value::Object(mut connector) = body else {
        return Err(ApiError::BadRequest(
            "Connector must be a JSON object".to_string(),
        ));
    };
    connector.insert("status".to_string(), json!(INITIAL_CONNECTOR_STATUS));

    let data = state
        .engine
        .post("/device-connector/", &connector, ctx.upstream(Method::POST))
        .await?;
    Ok(Json(data))
}

pub async fn handle_delete_connector(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_resource_id(&id)?;
    state
        .engine
        .request(&format!("/device-connector/{}", id), ctx.upstream(Method::DELETE))
        .await?;
    Ok(Json(json!({ "message": "Device connector deleted" })))
}

pub async fn handle_test_connection(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_resource_id(&id)?;
    let data = state
        .engine
        .request(
            &format!("/device-connector/{}/test-connection", id),
            ctx.upstream(Method::GET),
        )
        .await?;
    Ok(Json(data))
}

/// Test a connector configuration before it is saved
pub async fn handle_test_connection_preview(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    state
        .engine
        .post(
            "/device-connector/test-connection-preview/",
            &body,
            ctx.upstream(Method::POST),
        )
        .await?;
    Ok(Json(json!({ "message": "Connection test successful" })))
}
