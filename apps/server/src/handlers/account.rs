//! Account routes: sign-in/out, registration, password recovery, social login,
//! profile and organization switching
//!
//! Routes that obtain a token pair store it as the session cookie set, next to
//! a plain `default_organization` cookie for the tenant header.

use anyhow::anyhow;
use axum::Json;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use iot_console_client::{ClientError, FormData};
use iot_console_common::constants::ORGANIZATION_COOKIE_NAME;
use iot_console_common::models::{Credentials, SocialLoginRequest};
use iot_console_common::{CookieJar, Session, SetCookie};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::json_with_cookies;
use crate::AppState;
use crate::auth::RequestContext;
use crate::error_handling::{ApiError, ApiResult};

/// Profile fields forwarded on update
const PROFILE_FIELDS: [&str; 5] = [
    "first_name",
    "last_name",
    "company_name",
    "location",
    "title",
];

/// Multipart field carrying the profile picture
const AVATAR_FIELD: &str = "avatar";

/// Non-empty string field of a JSON body
fn string_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Replace the session cookies and point the organization cookie at `session`'s tenant
fn session_cookies(
    state: &AppState,
    jar: &CookieJar,
    session: &Session,
) -> ApiResult<Vec<SetCookie>> {
    let mut directives = state.codec.replace(jar, session)?;
    if let Some(organization) = session.default_organization() {
        directives.push(SetCookie::new(
            ORGANIZATION_COOKIE_NAME,
            organization,
            state.codec.is_secure(),
        ));
    }
    Ok(directives)
}

/// Email/password sign-in
pub async fn handle_sign_in(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(credentials): Json<Credentials>,
) -> ApiResult<Response> {
    let data = state
        .engine
        .post("/console/auth/login", &credentials, ctx.upstream(Method::POST))
        .await?;

    let session = Session::from_token_response(&data)
        .ok_or_else(|| anyhow!("login response has no token pair"))?;

    info!(request_id = %ctx.request_id, "Signed in");
    let directives = session_cookies(&state, &ctx.jar, &session)?;
    json_with_cookies(
        json!({ "default_organization": session.default_organization() }),
        &directives,
    )
}

/// Drop the session and organization cookies
pub async fn handle_sign_out(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Response> {
    let mut directives = state.codec.clear(&ctx.jar);
    directives.push(SetCookie::clear(
        ORGANIZATION_COOKIE_NAME,
        state.codec.is_secure(),
    ));

    debug!(request_id = %ctx.request_id, "Signed out");
    json_with_cookies(json!({ "message": "Signed out" }), &directives)
}

/// Register; a response carrying a token pair signs the user in
pub async fn handle_sign_up(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    let data = state
        .engine
        .post("/bootstrap/auth/register", &body, ctx.upstream(Method::POST))
        .await?;
    respond_with_session(&state, &ctx, data)
}

/// Pass `data` through, storing its token pair as the session when present
fn respond_with_session(
    state: &AppState,
    ctx: &RequestContext,
    data: Value,
) -> ApiResult<Response> {
    match Session::from_token_response(&data) {
        Some(session) => {
            let directives = session_cookies(state, &ctx.jar, &session)?;
            json_with_cookies(data, &directives)
        }
        None => Ok(Json(data).into_response()),
    }
}

pub async fn handle_send_otp(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let email = body.get("email").cloned().unwrap_or(Value::Null);
    let data = state
        .engine
        .post(
            "/bootstrap/auth/send-otp",
            &json!({ "email": email }),
            ctx.upstream(Method::POST),
        )
        .await?;
    Ok(Json(data))
}

pub async fn handle_send_email(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let email = string_field(&body, "email")
        .ok_or_else(|| ApiError::BadRequest("Email is required".to_string()))?;

    state
        .engine
        .post(
            "/bootstrap/auth/send-email-confirm",
            &json!({ "email": email }),
            ctx.upstream(Method::POST),
        )
        .await?;
    Ok(Json(json!({ "message": "Email sent" })))
}

pub async fn handle_forget_password(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let password = string_field(&body, "password");
    let token = string_field(&body, "token");
    let (Some(password), Some(token)) = (password, token) else {
        return Err(ApiError::BadRequest(
            "Password and token are required".to_string(),
        ));
    };

    let data = state
        .engine
        .post(
            "/bootstrap/auth/forget-password",
            &json!({ "password": password, "token": token }),
            ctx.upstream(Method::POST),
        )
        .await?;
    Ok(Json(data))
}

/// Start a social login: the backend answers with a redirect to the provider
///
/// The redirect is not followed; its target is returned as `{"redirectUrl"}`.
pub async fn handle_socials(
    State(state): State<AppState>,
    Json(body): Json<SocialLoginRequest>,
) -> ApiResult<Response> {
    let url = state.engine.url("/bootstrap/auth/login/socials")?;
    let response = state
        .redirect_client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(ClientError::from)?;

    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok());

    match location {
        Some(redirect_url) if response.status() == StatusCode::FOUND => {
            debug!("Social login for {} redirects to provider", body.provider);
            Ok(Json(json!({ "redirectUrl": redirect_url })).into_response())
        }
        _ => {
            warn!("Social login answered {} without redirect", response.status());
            Ok((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "No redirect URL found" })),
            )
                .into_response())
        }
    }
}

/// Finish a Google login
///
/// Failures are answered as `{"error"}` with the upstream status (400 when
/// there is none).
pub async fn handle_google_login(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<Value>,
) -> ApiResult<Response> {
    match state
        .engine
        .post("/console/google/login", &body, ctx.upstream(Method::POST))
        .await
    {
        Ok(data) => respond_with_session(&state, &ctx, data),
        Err(e) => {
            let status = e.status().unwrap_or(StatusCode::BAD_REQUEST);
            let error = e
                .http()
                .and_then(|http| http.data.get("error").cloned())
                .unwrap_or_else(|| json!(e.to_string()));
            warn!(request_id = %ctx.request_id, "Google login failed: {}", e);
            Ok((status, Json(json!({ "error": error }))).into_response())
        }
    }
}

pub async fn handle_get_me(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Json<Value>> {
    let data = state
        .engine
        .request("/console/user/me", ctx.upstream(Method::GET))
        .await?;
    Ok(Json(data))
}

/// Update the profile from a JSON body or a multipart form (with an optional avatar)
pub async fn handle_update_me(
    State(state): State<AppState>,
    ctx: RequestContext,
    request: Request,
) -> ApiResult<Json<Value>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let config = ctx.upstream(Method::PUT);
    let config = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        config.form(profile_form(multipart).await?)
    } else {
        let Json(body) = Json::<Value>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        config.json_value(Value::Object(profile_fields(&body)))
    };

    let data = state.engine.request("/console/user/me", config).await?;
    Ok(Json(data))
}

fn profile_fields(body: &Value) -> Map<String, Value> {
    PROFILE_FIELDS
        .iter()
        .filter_map(|key| body.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect()
}

async fn profile_form(mut multipart: Multipart) -> ApiResult<FormData> {
    let mut form = FormData::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == AVATAR_FIELD && field.file_name().is_some() {
            let file_name = field.file_name().unwrap_or(AVATAR_FIELD).to_string();
            let mime = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form = form.file(name, file_name, mime, bytes.to_vec());
        } else if PROFILE_FIELDS.contains(&name.as_str()) {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            form = form.text(name, value);
        }
    }

    Ok(form)
}

#[derive(Debug, Deserialize)]
pub struct SwitchOrganization {
    pub organization: String,
}

/// Switch tenant: the backend issues a token pair scoped to the organization
pub async fn handle_switch_organization(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<SwitchOrganization>,
) -> ApiResult<Response> {
    let current = ctx.require_session()?;
    let organization = body.organization.trim();
    if organization.is_empty() {
        return Err(ApiError::BadRequest("Organization is required".to_string()));
    }

    let data = state
        .engine
        .post(
            "/console/auth/organizations/switch",
            &json!({ "organization": organization, "refresh": current.refresh }),
            ctx.upstream(Method::POST),
        )
        .await?;

    let access = data
        .get("access")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("organization switch response has no access token"))?;

    let mut session = current.clone();
    session.access = access.to_string();
    if let Some(refresh) = data.get("refresh").and_then(Value::as_str) {
        session.refresh = refresh.to_string();
    }
    session
        .claims
        .insert("default_organization".to_string(), json!(organization));

    info!(request_id = %ctx.request_id, "Switched organization to {}", organization);
    let directives = session_cookies(&state, &ctx.jar, &session)?;
    json_with_cookies(json!({ "default_organization": organization }), &directives)
}
