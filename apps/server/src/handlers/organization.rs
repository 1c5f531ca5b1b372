use axum::Json;
use axum::extract::State;
use axum::http::Method;
use serde_json::Value;

use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::ApiResult;

/// Organizations visible to the signed-in user
pub async fn handle_organizations(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Json<Value>> {
    let data = state
        .engine
        .request("/organizations", ctx.tenant(Method::GET))
        .await?;
    Ok(Json(data))
}
