//! Router tests against a mocked backend
//!
//! Requests go through the full router (guard, extractors, handlers) with the
//! backend replaced by a wiremock server.

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use iot_console_common::constants::{ORGANIZATION_HEADER, REQUEST_ID_HEADER, SESSION_COOKIE_NAME};
use iot_console_common::{CookieJar, Session, SetCookie, set_cookie_lines};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::refresh::refresh_session;
use crate::auth::RequestContext;
use crate::{AppState, Config, build_router};

const SECRET: &str = "router-test-secret";

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    fn new(server: &MockServer) -> Self {
        Self::with_config(Config::new(format!("{}/api", server.uri()), SECRET))
    }

    fn with_config(config: Config) -> Self {
        let state = AppState::new(config).unwrap();
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    /// `Cookie` header value carrying `session`
    fn session_cookie(&self, session: &Session) -> String {
        self.state
            .codec
            .encode(session)
            .unwrap()
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    fn set_cookies(&self) -> Vec<SetCookie> {
        set_cookie_lines(&self.headers)
            .iter()
            .map(|line| SetCookie::parse(line).unwrap())
            .collect()
    }

    /// Jar a browser would hold after applying the response's cookies
    fn jar(&self) -> CookieJar {
        let mut jar = CookieJar::new();
        jar.apply(&self.set_cookies());
        jar
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn with_json(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn session() -> Session {
    Session::new("acc-1", "ref-1").with_claim("default_organization", "acme")
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);

    let response = app.send(get("/health", None)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_protected_route_without_session() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);

    for uri in ["/api/devices", "/api/auth/me", "/api/trip/dev-1"] {
        let response = app.send(get(uri, None)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(response.body, json!({"error": "Unauthorized"}));
    }
}

#[tokio::test]
async fn test_tampered_session_is_rejected() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);
    let cookie = format!("{}=not-a-jwt", SESSION_COOKIE_NAME);

    let response = app.send(get("/api/devices", Some(&cookie))).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_devices_forwards_query_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices/"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "20"))
        .and(query_param("search", "sensor"))
        .and(query_param("status", "active"))
        .and(header("authorization", "Bearer acc-1"))
        .and(header(ORGANIZATION_HEADER, "globex"))
        .and(header(REQUEST_ID_HEADER, "req-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    // The organization cookie wins over the session claim
    let cookie = format!(
        "{}; default_organization=globex",
        app.session_cookie(&session())
    );
    let request = Request::get("/api/devices?pageIndex=2&search=sensor&status=active")
        .header(COOKIE, cookie)
        .header(REQUEST_ID_HEADER, "req-42")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"count": 0, "results": []}));
}

#[tokio::test]
async fn test_list_devices_rejects_out_of_range_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let uri = format!("/api/devices?pageIndex={}", u64::MAX);

    let response = app.send(get(&uri, Some(&cookie))).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({"error": "Invalid page index"}));
}

#[tokio::test]
async fn test_upstream_message_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices/dev-1/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app.send(get("/api/devices/dev-1", Some(&cookie))).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, json!({"message": "Not found."}));
}

#[tokio::test]
async fn test_upstream_field_errors_are_wrapped() {
    let server = MockServer::start().await;
    let errors = json!([{"lorawan_device": {"dev_eui": ["Device already exists"]}}]);
    Mock::given(method("POST"))
        .and(path("/api/devices/bulk-create/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(errors.clone()))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let body = json!([{
        "device_model": "model-1",
        "network_server": "ns-1",
        "lorawan_device": {
            "dev_eui": "70 B3 D5 7E D0 00 00 01",
            "join_eui": "00 00 00 00 00 00 00 01",
            "app_key": "0123456789ABCDEF0123456789ABCDEF",
        },
    }]);

    let response = app
        .send(with_json("POST", "/api/devices", Some(&cookie), body))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({"response": errors}));
}

#[tokio::test]
async fn test_bulk_create_normalizes_euis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/devices/bulk-create/"))
        .and(header(ORGANIZATION_HEADER, "acme"))
        .and(body_json(json!([{
            "device_model": "model-1",
            "network_server": "ns-1",
            "lorawan_device": {
                "dev_eui": "70B3D57ED0000001",
                "join_eui": "0000000000000001",
                "app_key": "0123456789abcdef0123456789abcdef",
            },
        }])))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"created": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let body = json!([{
        "device_model": "model-1",
        "network_server": "ns-1",
        "lorawan_device": {
            "dev_eui": "70 b3 d5 7e d0 00 00 01",
            "join_eui": "00 00 00 00 00 00 00 01",
            "app_key": "0123456789abcdef0123456789abcdef",
        },
    }]);

    let response = app
        .send(with_json("POST", "/api/devices", Some(&cookie), body))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"created": 1}));
}

#[tokio::test]
async fn test_bulk_create_rejects_invalid_credentials_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/devices/bulk-create/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let body = json!([{
        "device_model": "model-1",
        "network_server": "ns-1",
        "lorawan_device": {
            "dev_eui": "70 B3 D5",
            "join_eui": "00 00 00 00 00 00 00 01",
            "app_key": "0123456789ABCDEF0123456789ABCDEF",
        },
    }]);

    let response = app
        .send(with_json("POST", "/api/devices", Some(&cookie), body))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let fields = iot_console_common::validation::map_device_field_errors(&response.body);
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].field, "eui.0.dev_eui");
    assert_eq!(fields[0].message, "Dev EUI must be 8 bytes");
}

#[tokio::test]
async fn test_bulk_create_rejects_empty_list() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());

    let response = app
        .send(with_json("POST", "/api/devices", Some(&cookie), json!([])))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_update_device_nests_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/devices/dev-1/"))
        .and(body_json(json!({
            "dev_eui": "70B3D57ED0000001",
            "status": "active",
            "lorawan_device": {"dev_eui": "70B3D57ED0000001"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "dev-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let row = json!({"dev_eui": "70 B3 D5 7E D0 00 00 01", "status": "active"});

    let response = app
        .send(with_json("PATCH", "/api/devices/dev-1", Some(&cookie), row))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["id"], "dev-1");
}

#[tokio::test]
async fn test_invalid_device_id_is_rejected() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());

    let response = app
        .send(get("/api/devices/bad.id", Some(&cookie)))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("Invalid resource id"));
}

#[tokio::test]
async fn test_device_events_feed() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());

    let response = app
        .send(get("/api/devices/dev-1/events", Some(&cookie)))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 11);
    assert_eq!(response.body["results"].as_array().unwrap().len(), 11);
    assert_eq!(response.body["results"][0]["node_id"], "test-node");
}

#[tokio::test]
async fn test_create_connector_forces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/device-connector/"))
        .and(body_json(json!({"name": "mqtt", "status": "disconnected"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "c1"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let body = json!({"name": "mqtt", "status": "connected"});

    let response = app
        .send(with_json("POST", "/api/device-connector", Some(&cookie), body))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"id": "c1"}));
}

#[tokio::test]
async fn test_delete_connector_message() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/device-connector/c1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let request = Request::delete("/api/device-connector/c1")
        .header(COOKIE, cookie)
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"message": "Device connector deleted"}));
}

#[tokio::test]
async fn test_test_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/device-connector/c1/test-connection"))
        .and(header("authorization", "Bearer acc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(get("/api/device-connector/test-connection/c1", Some(&cookie)))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_test_connection_preview() {
    let server = MockServer::start().await;
    let connector = json!({"name": "mqtt", "host": "broker.local", "port": 1883});
    Mock::given(method("POST"))
        .and(path("/api/device-connector/test-connection-preview/"))
        .and(body_json(connector.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"connected": true})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(with_json(
            "POST",
            "/api/device-connector/test-connector-preview",
            Some(&cookie),
            connector,
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"message": "Connection test successful"}));
}

#[tokio::test]
async fn test_test_connection_preview_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/device-connector/test-connection-preview/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Broker unreachable"})),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(with_json(
            "POST",
            "/api/device-connector/test-connector-preview",
            Some(&cookie),
            json!({"name": "mqtt"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({"message": "Broker unreachable"}));
}

#[tokio::test]
async fn test_device_models_first_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/device-models/"))
        .and(query_param("search", "temp"))
        .and(query_param("limit", "8"))
        .and(query_param("offset", "0"))
        .and(header(ORGANIZATION_HEADER, "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "results": [{"id": "model-1", "name": "Temperature sensor"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(get("/api/device-models?search=temp&offset=30", Some(&cookie)))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["results"][0]["id"], "model-1");
}

#[tokio::test]
async fn test_network_servers_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/network-server"))
        .and(query_param("search", "eu"))
        .and(query_param("limit", "7"))
        .and(query_param("offset", "14"))
        .and(header(ORGANIZATION_HEADER, "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 15,
            "results": [{"id": "ns-15"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(get("/api/network-server?search=eu&offset=14", Some(&cookie)))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], 15);
}

#[tokio::test]
async fn test_list_organizations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/organizations"))
        .and(header("authorization", "Bearer acc-1"))
        .and(header(ORGANIZATION_HEADER, "acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "acme", "name": "Acme"},
            {"id": "globex", "name": "Globex"},
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(get("/api/console/organization", Some(&cookie)))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body[1]["id"], "globex");
}

#[tokio::test]
async fn test_trip_returns_latest_checkpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/trips/"))
        .and(query_param("limit", "1"))
        .and(query_param("space_device__device_id", "dev-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "results": [{"id": "trip-9", "is_finished": false}],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/trips/trip-9/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "trip-9",
            "checkpoints": [
                {"latitude": 10.5, "longitude": 106.7, "timestamp": "2024-01-01T00:00:00Z", "accuracy": 3.0},
            ],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app.send(get("/api/trip/dev-1", Some(&cookie))).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body[0]["latitude"], 10.5);
}

#[tokio::test]
async fn test_trip_without_trips_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/trips/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app.send(get("/api/trip/dev-1", Some(&cookie))).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!([]));
}

#[tokio::test]
async fn test_sign_in_sets_session_and_organization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/login"))
        .and(body_json(json!({"email": "ada@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "acc-1",
            "refresh": "ref-1",
            "default_organization": "acme",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/sign-in",
            None,
            json!({"email": "ada@example.com", "password": "pw"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"default_organization": "acme"}));

    let jar = response.jar();
    assert_eq!(jar.get("default_organization"), Some("acme"));
    let session = app.state.codec.decode(&jar).unwrap();
    assert_eq!(session.access, "acc-1");
    assert_eq!(session.refresh, "ref-1");
}

#[tokio::test]
async fn test_sign_in_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "No active account found"})),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/sign-in",
            None,
            json!({"email": "ada@example.com", "password": "wrong"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({"message": "No active account found"}));
    assert!(response.set_cookies().is_empty());
}

#[tokio::test]
async fn test_sign_out_clears_cookies() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());

    let response = app
        .send(with_json("POST", "/api/auth/sign-out", Some(&cookie), json!({})))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let cookies = response.set_cookies();
    // Base cookie, ten chunk slots and the organization cookie
    assert_eq!(cookies.len(), 12);
    assert!(cookies.iter().all(SetCookie::is_clear));
}

#[tokio::test]
async fn test_send_email_requires_email() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);

    let response = app
        .send(with_json("POST", "/api/auth/send-email", None, json!({"email": " "})))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({"error": "Email is required"}));
}

#[tokio::test]
async fn test_forget_password_requires_token() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);

    let response = app
        .send(with_json(
            "POST",
            "/api/auth/forget-password",
            None,
            json!({"password": "new-pw"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({"error": "Password and token are required"}));
}

#[tokio::test]
async fn test_socials_returns_redirect_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/auth/login/socials"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "https://accounts.google.com/o/oauth2/auth"),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/socials",
            None,
            json!({"provider": "google", "callback_url": "http://localhost:3000/callback"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body,
        json!({"redirectUrl": "https://accounts.google.com/o/oauth2/auth"})
    );
}

#[tokio::test]
async fn test_socials_without_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/auth/login/socials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/socials",
            None,
            json!({"provider": "google", "callback_url": "http://localhost:3000/callback"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body, json!({"error": "No redirect URL found"}));
}

#[tokio::test]
async fn test_sign_up_stores_returned_tokens() {
    let server = MockServer::start().await;
    let registration = json!({"email": "ada@example.com", "password": "pw", "otp": "123456"});
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/auth/register"))
        .and(body_json(registration.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "access": "acc-9",
            "refresh": "ref-9",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json("POST", "/api/auth/sign-up", None, registration))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["access"], "acc-9");
    let session = app.state.codec.decode(&response.jar()).unwrap();
    assert_eq!(session.access, "acc-9");
    assert_eq!(session.refresh, "ref-9");
}

#[tokio::test]
async fn test_sign_up_without_tokens_sets_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/auth/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "user-1"})))
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/sign-up",
            None,
            json!({"email": "ada@example.com", "password": "pw"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"id": "user-1"}));
    assert!(response.set_cookies().is_empty());
}

#[tokio::test]
async fn test_send_otp_forwards_email_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/auth/send-otp"))
        .and(body_json(json!({"email": "ada@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sent": true})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/send-otp",
            None,
            json!({"email": "ada@example.com", "password": "ignored"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"sent": true}));
}

#[tokio::test]
async fn test_google_login_sets_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/google/login"))
        .and(body_json(json!({"credential": "google-id-token"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "acc-g",
            "refresh": "ref-g",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/socials/google",
            None,
            json!({"credential": "google-id-token"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let session = app.state.codec.decode(&response.jar()).unwrap();
    assert_eq!(session.access, "acc-g");
}

#[tokio::test]
async fn test_google_login_error_keeps_upstream_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/google/login"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "Account is disabled"})),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/socials/google",
            None,
            json!({"credential": "google-id-token"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body, json!({"error": "Account is disabled"}));
    assert!(response.set_cookies().is_empty());
}

#[tokio::test]
async fn test_get_me() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/console/user/me"))
        .and(header("authorization", "Bearer acc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"email": "ada@example.com"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app.send(get("/api/auth/me", Some(&cookie))).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["email"], "ada@example.com");
}

#[tokio::test]
async fn test_update_me_forwards_profile_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/console/user/me"))
        .and(body_json(json!({"first_name": "Ada", "title": "Engineer"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"first_name": "Ada"})))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let body = json!({"first_name": "Ada", "title": "Engineer", "is_staff": true});

    let response = app
        .send(with_json("PUT", "/api/auth/me", Some(&cookie), body))
        .await;

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_switch_organization_reissues_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/organizations/switch"))
        .and(body_json(json!({"organization": "globex", "refresh": "ref-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "acc-2",
            "refresh": "ref-2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(with_json(
            "POST",
            "/api/auth/switch-organization",
            Some(&cookie),
            json!({"organization": "globex"}),
        ))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let jar = response.jar();
    assert_eq!(jar.get("default_organization"), Some("globex"));
    let session = app.state.codec.decode(&jar).unwrap();
    assert_eq!(session.access, "acc-2");
    assert_eq!(session.default_organization(), Some("globex"));
}

#[tokio::test]
async fn test_refresh_without_session() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server);

    let response = app
        .send(with_json("POST", "/api/refresh-token", None, json!({})))
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({"error": "Unauthorized"}));
}

#[tokio::test]
async fn test_refresh_clears_then_sets_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/refresh-token"))
        .and(body_json(json!({"refresh": "ref-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "acc-2",
            "refresh": "ref-2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(with_json("POST", "/api/refresh-token", Some(&cookie), json!({})))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["access"], "acc-2");

    let cookies = response.set_cookies();
    let first_live = cookies.iter().position(|c| !c.is_clear()).unwrap();
    assert_eq!(first_live, 11);
    assert!(cookies[first_live..].iter().all(|c| !c.is_clear()));

    let session = app.state.codec.decode(&response.jar()).unwrap();
    assert_eq!(session.access, "acc-2");
    assert_eq!(session.refresh, "ref-2");
}

#[tokio::test]
async fn test_refresh_failure_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is blacklisted"})),
        )
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let response = app
        .send(with_json("POST", "/api/refresh-token", Some(&cookie), json!({})))
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, json!({"error": "Internal Server Error"}));
    assert!(response.set_cookies().is_empty());
    assert!(app.state.refresh_locks.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_refreshes_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "acc-2", "refresh": "ref-2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let cookie = app.session_cookie(&session());
    let (first, second) = tokio::join!(
        app.send(with_json("POST", "/api/refresh-token", Some(&cookie), json!({}))),
        app.send(with_json("POST", "/api/refresh-token", Some(&cookie), json!({}))),
    );

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.body, second.body);
    assert_eq!(first.set_cookies(), second.set_cookies());
    assert!(app.state.refresh_locks.is_empty().await);
}

#[tokio::test]
async fn test_refresh_with_chunked_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "acc-2",
            "refresh": "ref-2",
        })))
        .mount(&server)
        .await;

    let mut config = Config::new(format!("{}/api", server.uri()), SECRET);
    config.cookie_chunk_size = 16;
    let app = TestApp::with_config(config);

    let session = session().with_claim("profile", "x".repeat(200));
    let cookie = app.session_cookie(&session);
    let sent_chunks = cookie.split("; ").count();
    assert!(sent_chunks > 10);

    let response = app
        .send(with_json("POST", "/api/refresh-token", Some(&cookie), json!({})))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let cleared = response
        .set_cookies()
        .iter()
        .filter(|c| c.is_clear())
        .count();
    // Base cookie plus every chunk index that was sent
    assert_eq!(cleared, sent_chunks + 1);

    let refreshed = app.state.codec.decode(&response.jar()).unwrap();
    assert_eq!(refreshed.access, "acc-2");
}

#[tokio::test]
async fn test_aborted_refresh_does_not_call_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/console/auth/refresh-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::new(&server);
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, app.session_cookie(&session()).parse().unwrap());
    let ctx = RequestContext::from_headers(&headers, &app.state.codec);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let response = refresh_session(&app.state, &ctx, &cancel).await;

    assert_eq!(response.status().as_u16(), 499);
    assert!(app.state.refresh_locks.is_empty().await);
}
