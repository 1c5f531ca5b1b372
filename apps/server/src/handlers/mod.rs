//! Handler modules
//!
//! One module per console resource. Every handler is a thin adapter: read the
//! path, query and body, call the backend through the shared engine, and map
//! the result or error to a JSON response.

pub mod account;
pub mod catalog;
pub mod connectors;
pub mod devices;
pub mod organization;
pub mod refresh;
pub mod trip;

#[cfg(test)]
mod tests;

use axum::Json;
use axum::response::{IntoResponse, Response};
use iot_console_common::{SetCookie, append_set_cookies};
use serde_json::{Value, json};

use crate::error_handling::ApiResult;

pub use account::{
    handle_forget_password, handle_get_me, handle_google_login, handle_send_email,
    handle_send_otp, handle_sign_in, handle_sign_out, handle_sign_up, handle_socials,
    handle_switch_organization, handle_update_me,
};
pub use catalog::{handle_device_models, handle_network_servers};
pub use connectors::{
    handle_create_connector, handle_delete_connector, handle_list_connectors,
    handle_test_connection, handle_test_connection_preview,
};
pub use devices::{
    handle_create_devices, handle_delete_device, handle_device_events, handle_get_device,
    handle_list_devices, handle_update_device,
};
pub use organization::handle_organizations;
pub use refresh::{MintedSession, RefreshError, RefreshOutcome, handle_refresh_token};
pub use trip::handle_trip;

/// Liveness probe
pub async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// JSON response with each directive appended as its own `Set-Cookie` header
pub(crate) fn json_with_cookies(body: Value, directives: &[SetCookie]) -> ApiResult<Response> {
    let mut response = Json(body).into_response();
    append_set_cookies(response.headers_mut(), directives)?;
    Ok(response)
}
