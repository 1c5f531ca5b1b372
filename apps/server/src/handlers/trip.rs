//! Trip checkpoints for the device map

use axum::Json;
use axum::extract::{Path, State};
use axum::http::Method;
use iot_console_common::models::{Paginated, Trip};
use iot_console_common::validation::validate_resource_id;
use serde_json::{Value, json};

use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::ApiResult;

/// Checkpoints of the device's latest trip, `[]` when it has none
pub async fn handle_trip(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Value>> {
    validate_resource_id(&device_id)?;

    let trips: Paginated<Trip> = state
        .engine
        .request_as(
            "/trips/",
            ctx.upstream(Method::GET)
                .query("limit", 1)
                .query("offset", 0)
                .query("space_device__device_id", &device_id),
        )
        .await?;

    let Some(latest) = trips.results.first() else {
        return Ok(Json(json!([])));
    };

    let trip: Trip = state
        .engine
        .request_as(&format!("/trips/{}/", latest.id), ctx.upstream(Method::GET))
        .await?;
    Ok(Json(json!(trip.checkpoints)))
}
