//! HTTP-level tests for the account, OAuth2 and health routes.

mod common;

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use base64::Engine;
use commerce_auth::api::app;
use common::{CLIENT_ID, CLIENT_SECRET, REDIRECT_URI, test_resources};
use serde_json::{Value, json};

async fn test_server() -> TestServer {
    TestServer::new(app(test_resources().await)).expect("create test server")
}

async fn register_alice(server: &TestServer) -> Value {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": "alice@example.com",
            "username": "alice",
            "password": "secret123"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

fn basic_auth(id: &str, secret: &str) -> HeaderValue {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
    HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
}

#[tokio::test]
async fn health_check_pings_database() {
    let server = test_server().await;

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn register_then_login() {
    let server = test_server().await;

    let body = register_alice(&server).await;
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["role"], "customer");
    assert!(body["user"].get("password_hash").is_none());

    let response = server
        .post("/api/auth/login")
        .json(&json!({"email": "alice@example.com", "password": "secret123"}))
        .await;
    response.assert_status_ok();
    let login: Value = response.json();
    assert_eq!(login["user"]["id"], body["user"]["id"]);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let server = test_server().await;
    register_alice(&server).await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": "alice@example.com",
            "username": "alice2",
            "password": "secret123"
        }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "email_taken");
}

#[tokio::test]
async fn invalid_registration_is_bad_request() {
    let server = test_server().await;

    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "email": "alice@example.com",
            "username": "alice",
            "password": "short"
        }))
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn bad_credentials_are_unauthorized() {
    let server = test_server().await;
    register_alice(&server).await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({"email": "alice@example.com", "password": "wrong-password"}))
        .await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_credentials");
}

#[tokio::test]
async fn validate_and_refresh_tokens() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();
    let refresh = registered["refresh_token"].as_str().unwrap();

    let response = server
        .post("/api/auth/validate")
        .json(&json!({"token": access}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], registered["user"]["id"]);
    assert_eq!(body["username"], "alice");

    let response = server
        .post("/api/auth/validate")
        .json(&json!({"token": refresh}))
        .await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_token");

    let response = server
        .post("/api/auth/refresh")
        .json(&json!({"refresh_token": refresh}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_ne!(body["access_token"], registered["access_token"]);
}

#[tokio::test]
async fn profile_requires_bearer_token() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();

    let response = server.get("/api/auth/me").await;
    response.assert_status_unauthorized();
    assert!(
        response
            .header(header::WWW_AUTHENTICATE)
            .to_str()
            .unwrap()
            .starts_with("Bearer")
    );

    let response = server.get("/api/auth/me").authorization_bearer(access).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["is_active"], true);

    let response = server
        .patch("/api/auth/me")
        .authorization_bearer(access)
        .json(&json!({"first_name": "Alice"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["first_name"], "Alice");
}

#[tokio::test]
async fn logout_acknowledges_valid_token() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();

    server
        .post("/api/auth/logout")
        .authorization_bearer(access)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .post("/api/auth/logout")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn deactivation_requires_admin() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();
    let user_id = registered["user"]["id"].as_str().unwrap();

    let response = server
        .post(&format!("/api/auth/users/{user_id}/deactivate"))
        .authorization_bearer(access)
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], "forbidden");
}

/// Runs `/oauth2/authorize` as alice and returns the issued code.
async fn authorize(server: &TestServer, access: &str) -> String {
    let response = server
        .get("/oauth2/authorize")
        .authorization_bearer(access)
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("scope", "orders:read")
        .add_query_param("state", "xyz")
        .await;
    response.assert_status(StatusCode::SEE_OTHER);

    let location = response.header(header::LOCATION);
    let location = url::Url::parse(location.to_str().unwrap()).unwrap();
    assert!(location.as_str().starts_with(REDIRECT_URI));
    let params: Vec<(String, String)> = location.query_pairs().into_owned().collect();
    assert!(params.contains(&("state".into(), "xyz".into())));
    params
        .into_iter()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v)
        .expect("code in redirect")
}

#[tokio::test]
async fn authorization_code_flow_over_http() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();
    let code = authorize(&server, access).await;

    let response = server
        .post("/oauth2/token")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .await;
    response.assert_status_ok();
    assert_eq!(response.header(header::CACHE_CONTROL), "no-store");
    let tokens: Value = response.json();
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["scope"], "orders:read");
    let oauth_access = tokens["access_token"].as_str().unwrap().to_string();

    // Replay with form credentials
    let response = server
        .post("/oauth2/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_grant");

    let response = server
        .post("/oauth2/introspect")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[("token", oauth_access.as_str())])
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["active"], true);
    assert_eq!(body["user_id"], registered["user"]["id"]);

    server
        .post("/oauth2/revoke")
        .form(&[
            ("token", oauth_access.as_str()),
            ("client_id", CLIENT_ID),
            ("client_secret", CLIENT_SECRET),
        ])
        .await
        .assert_status_ok();

    let response = server
        .post("/oauth2/introspect")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[("token", oauth_access.as_str())])
        .await;
    let body: Value = response.json();
    assert_eq!(body, json!({"active": false}));
}

#[tokio::test]
async fn authorize_rejects_unregistered_redirect_without_redirecting() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();

    let response = server
        .get("/oauth2/authorize")
        .authorization_bearer(access)
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", "https://evil.example/steal")
        .await;
    response.assert_status_bad_request();
    assert!(response.maybe_header(header::LOCATION).is_none());
}

#[tokio::test]
async fn authorize_reports_unsupported_response_type_to_client() {
    let server = test_server().await;
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();

    let response = server
        .get("/oauth2/authorize")
        .authorization_bearer(access)
        .add_query_param("response_type", "token")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    let location = response.header(header::LOCATION);
    assert!(
        location
            .to_str()
            .unwrap()
            .contains("error=unsupported_response_type")
    );
}

#[tokio::test]
async fn authorize_requires_login() {
    let server = test_server().await;

    server
        .get("/oauth2/authorize")
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn token_endpoint_errors() {
    let server = test_server().await;

    let response = server
        .post("/oauth2/token")
        .form(&[("grant_type", "authorization_code"), ("code", "x")])
        .await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_client");

    let response = server
        .post("/oauth2/token")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[("grant_type", "password")])
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "unsupported_grant_type");

    let response = server
        .post("/oauth2/token")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[("grant_type", "authorization_code")])
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");

    let response = server
        .post("/oauth2/token")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, "wrong"))
        .form(&[("grant_type", "refresh_token"), ("refresh_token", "x")])
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn revoking_unknown_token_succeeds() {
    let server = test_server().await;

    server
        .post("/oauth2/revoke")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[("token", "never-issued")])
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn revoke_and_introspect_require_client_authentication() {
    let server = test_server().await;

    for path in ["/oauth2/revoke", "/oauth2/introspect"] {
        let response = server.post(path).form(&[("token", "anything")]).await;
        response.assert_status_unauthorized();
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_client", "{path}");

        let response = server
            .post(path)
            .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, "wrong"))
            .form(&[("token", "anything")])
            .await;
        response.assert_status_unauthorized();
    }
}

#[tokio::test]
async fn deactivated_account_cannot_use_oauth() {
    let resources = test_resources().await;
    let server = TestServer::new(app(resources.clone())).expect("create test server");
    let registered = register_alice(&server).await;
    let access = registered["access_token"].as_str().unwrap();
    let code = authorize(&server, access).await;

    let response = server
        .post("/oauth2/token")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .await;
    response.assert_status_ok();
    let tokens: Value = response.json();
    let refresh = tokens["refresh_token"].as_str().unwrap();

    resources
        .auth
        .deactivate_user(registered["user"]["id"].as_str().unwrap())
        .await
        .unwrap();

    // The session token is still validly signed, but no new code is issued.
    let response = server
        .get("/oauth2/authorize")
        .authorization_bearer(access)
        .add_query_param("response_type", "code")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert!(response.maybe_header(header::LOCATION).is_none());
    let body: Value = response.json();
    assert_eq!(body["error"], "account_deactivated");

    let response = server
        .post("/oauth2/token")
        .add_header(header::AUTHORIZATION, basic_auth(CLIENT_ID, CLIENT_SECRET))
        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh)])
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"], "account_deactivated");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let server = test_server().await;
    server.get("/api-docs").await.assert_status_ok();
}
