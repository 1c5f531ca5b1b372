//! Input validation for device credentials and proxied values
//!
//! Device EUIs and app keys are checked here before a bulk create reaches the
//! backend. Failures are reported in the same nested shape the backend uses, so
//! [`map_device_field_errors`] handles both sources.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::models::DeviceCredentials;

/// App key: 16 bytes as 32 hex characters
static APP_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{32}$").unwrap());

/// Backend resource ids used as path segments (UUIDs, slugs, numeric ids)
static RESOURCE_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Maximum length for HTTP header values
pub const MAX_HEADER_VALUE_LENGTH: usize = 8192;

/// Number of bytes in a LoRaWAN EUI
pub const EUI_BYTES: usize = 8;

/// Validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{0} must be 8 bytes")]
    InvalidEui(&'static str),

    #[error("Value must be 32 hex characters")]
    InvalidAppKey,

    #[error("Invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("Header value too long: {0} bytes (max: {1})")]
    HeaderValueTooLong(usize, usize),
}

/// Form field error, named the way the device forms address their inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Validate an EUI entered as space separated byte groups (`70 B3 D5 ...`)
///
/// `label` names the field in the error message, e.g. `"Dev EUI"`. Exactly eight
/// two-character groups are required; the groups must be hex.
pub fn validate_eui(label: &'static str, value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required(label));
    }

    let groups: Vec<&str> = value.split_whitespace().collect();
    let two_digit = groups.iter().filter(|g| g.len() == 2).count();
    let all_hex = groups
        .iter()
        .all(|g| g.chars().all(|c| c.is_ascii_hexdigit()));

    if two_digit != EUI_BYTES || groups.len() != EUI_BYTES || !all_hex {
        return Err(ValidationError::InvalidEui(label));
    }
    Ok(())
}

/// Validate an app key (32 hex characters)
pub fn validate_app_key(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Required("App Key"));
    }
    if !APP_KEY_REGEX.is_match(value) {
        return Err(ValidationError::InvalidAppKey);
    }
    Ok(())
}

/// Validate a backend id before it is placed into an upstream path
pub fn validate_resource_id(id: &str) -> Result<(), ValidationError> {
    if !RESOURCE_ID_REGEX.is_match(id) {
        return Err(ValidationError::InvalidResourceId(
            id.chars().take(50).collect::<String>(),
        ));
    }
    Ok(())
}

/// Group a hex EUI into uppercase byte pairs: `70b3d5...` -> `70 B3 D5 ...`
pub fn format_eui(value: &str) -> String {
    let compact = normalize_eui(value);
    compact
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip whitespace and uppercase an EUI, the form the backend stores
pub fn normalize_eui(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Validate every device of a bulk create request
///
/// Returns `None` when all devices are valid. Otherwise returns one object per
/// device (empty when that device is valid) shaped like the backend's own
/// errors: `[{"lorawan_device": {"dev_eui": ["Dev EUI must be 8 bytes"]}}, {}]`.
pub fn validate_device_credentials(devices: &[DeviceCredentials]) -> Option<Value> {
    let mut any_error = false;

    let per_device: Vec<Value> = devices
        .iter()
        .map(|device| {
            let lora = &device.lorawan_device;
            let mut errors = Map::new();

            let checks = [
                ("dev_eui", validate_eui("Dev EUI", &lora.dev_eui)),
                ("join_eui", validate_eui("Join EUI", &lora.join_eui)),
                ("app_key", validate_app_key(&lora.app_key)),
            ];
            for (field, result) in checks {
                if let Err(e) = result {
                    errors.insert(field.to_string(), json!([e.to_string()]));
                }
            }

            if errors.is_empty() {
                json!({})
            } else {
                any_error = true;
                json!({ "lorawan_device": errors })
            }
        })
        .collect();

    any_error.then(|| Value::Array(per_device))
}

/// Map a nested device error object to form fields `eui.<index>.<field>`
///
/// Accepts the backend bulk-create shape (an array indexed per device), a
/// single device error (`{"lorawan_device": {...}}`, index 0), or either of
/// those wrapped in a `response` key. The first message of each field is used.
pub fn map_device_field_errors(error: &Value) -> Vec<FieldError> {
    match error {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .flat_map(|(index, item)| lorawan_field_errors(index, item))
            .collect(),
        Value::Object(object) => match object.get("response") {
            Some(inner) => map_device_field_errors(inner),
            None => lorawan_field_errors(0, error),
        },
        _ => Vec::new(),
    }
}

fn lorawan_field_errors(index: usize, item: &Value) -> Vec<FieldError> {
    let Some(fields) = item.get("lorawan_device").and_then(Value::as_object) else {
        return Vec::new();
    };

    fields
        .iter()
        .filter_map(|(key, messages)| {
            let message = match messages {
                Value::Array(list) => list.first()?.as_str()?.to_string(),
                Value::String(s) => s.clone(),
                _ => return None,
            };
            Some(FieldError {
                field: format!("eui.{}.{}", index, key),
                message,
            })
        })
        .collect()
}

/// Sanitize an HTTP header value
///
/// Removes control characters (except tab) and enforces a length limit.
pub fn sanitize_header_value(value: &str) -> Result<String, ValidationError> {
    if value.len() > MAX_HEADER_VALUE_LENGTH {
        return Err(ValidationError::HeaderValueTooLong(
            value.len(),
            MAX_HEADER_VALUE_LENGTH,
        ));
    }

    let sanitized: String = value
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect();

    Ok(sanitized)
}

/// Whether a console route needs a signed-in session
///
/// Sign-in, sign-up, password recovery, social login and the refresh route are
/// public; everything else under `/api` is protected.
pub fn requires_session(path: &str) -> bool {
    const PUBLIC_PREFIXES: [&str; 3] = ["/api/auth/", "/api/refresh-token", "/health"];
    const PROTECTED_AUTH_ROUTES: [&str; 1] = ["/api/auth/me"];

    if PROTECTED_AUTH_ROUTES
        .iter()
        .any(|route| path == *route || path.starts_with(&format!("{}/", route)))
    {
        return true;
    }
    if PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return false;
    }
    path.starts_with("/api/")
}
