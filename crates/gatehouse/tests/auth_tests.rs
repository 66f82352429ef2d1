//! Authentication integration tests.
//!
//! Drives the assembled router with Ed25519-signed tokens against a mocked
//! JWKS provider: the happy path, each rejection, the skip-path bypass, the
//! allow-expired exception, and identity resolution.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::http::StatusCode;
use common::{get, get_with_headers, standard_claims, TestGateway, ISSUER};
use gatehouse::services::mock::MockDirectory;
use uuid::Uuid;

fn directory_with_user(sub: &str) -> (MockDirectory, Uuid) {
    let internal_id = Uuid::new_v4();
    (MockDirectory::new().with_user(sub, internal_id), internal_id)
}

#[tokio::test]
async fn test_valid_token_reaches_handler_with_claims() {
    let (directory, internal_id) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let token = gateway.keypair.sign_token(&standard_claims("alice-ext"));
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["user_id"], internal_id.to_string());
    assert_eq!(response.json["username"], "alice-ext");
    assert_eq!(response.json["email"], "alice-ext@example.com");
    assert_eq!(response.json["roles"], serde_json::json!(["editor"]));
    assert_eq!(response.json["groups"], serde_json::json!(["/eng"]));
    assert_eq!(response.json["is_system_admin"], false);

    gateway.key_store.close();
}

#[tokio::test]
async fn test_non_string_role_entries_are_dropped() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let mut claims = standard_claims("alice-ext");
    claims["realm_access"] = serde_json::json!({ "roles": ["editor", 42, null, "viewer"] });
    claims["groups"] = serde_json::json!(["/eng", {"bad": true}]);

    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["roles"], serde_json::json!(["editor", "viewer"]));
    assert_eq!(response.json["groups"], serde_json::json!(["/eng"]));

    gateway.key_store.close();
}

#[tokio::test]
async fn test_missing_credential_is_unauthorized() {
    let gateway = TestGateway::spawn(&[], MockDirectory::new()).await;

    let response = get(&gateway.router, "/v1/me", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");
    assert!(response.headers.contains_key("WWW-Authenticate"));

    gateway.key_store.close();
}

#[tokio::test]
async fn test_non_bearer_header_is_unauthorized() {
    let gateway = TestGateway::spawn(&[], MockDirectory::new()).await;

    let response = get_with_headers(
        &gateway.router,
        "/v1/me",
        None,
        &[("authorization", "Basic dXNlcjpwYXNz")],
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_garbage_token_is_unauthorized() {
    let gateway = TestGateway::spawn(&[], MockDirectory::new()).await;

    let response = get(&gateway.router, "/v1/me", Some("not-a-jwt")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_token_signed_by_unknown_key_is_rejected() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let token = gateway
        .keypair
        .sign_token_with_kid(&standard_claims("alice-ext"), "rotated-away-key");
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_token_signed_by_wrong_key_is_rejected() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    // Same kid, different keypair: signature verification must fail
    let imposter = common::TestKeypair::new(9, "test-key-01");
    let token = imposter.sign_token(&standard_claims("alice-ext"));
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_wrong_issuer_is_rejected() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let mut claims = standard_claims("alice-ext");
    claims["iss"] = serde_json::json!("https://evil.test/realms/gatehouse");

    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "UNAUTHORIZED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_audience_enforced_when_configured() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway =
        TestGateway::spawn(&[("OIDC_AUDIENCE", "workspace-api")], directory).await;

    // Token without the expected audience
    let token = gateway.keypair.sign_token(&standard_claims("alice-ext"));
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    // Token carrying it
    let mut claims = standard_claims("alice-ext");
    claims["aud"] = serde_json::json!(["account", "workspace-api"]);
    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);

    gateway.key_store.close();
}

#[tokio::test]
async fn test_expired_token_is_token_expired() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let now = chrono::Utc::now().timestamp();
    let mut claims = standard_claims("alice-ext");
    // Expired well past the 60-second default leeway
    claims["exp"] = serde_json::json!(now - 3600);

    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "TOKEN_EXPIRED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_token_expired_within_leeway_is_accepted() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let now = chrono::Utc::now().timestamp();
    let mut claims = standard_claims("alice-ext");
    // Expired 30 seconds ago: inside the 60-second default leeway
    claims["exp"] = serde_json::json!(now - 30);

    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);

    gateway.key_store.close();
}

#[tokio::test]
async fn test_allow_expired_path_accepts_expired_token() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway =
        TestGateway::spawn(&[("AUTH_ALLOW_EXPIRED_PATHS", "/v1/me")], directory).await;

    let now = chrono::Utc::now().timestamp();
    let mut claims = standard_claims("alice-ext");
    claims["exp"] = serde_json::json!(now - 3600);

    let token = gateway.keypair.sign_token(&claims);

    // The allow-expired path proceeds with the (expired) claims enriched
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["username"], "alice-ext");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_same_expired_token_rejected_on_other_paths() {
    let ws = Uuid::new_v4();
    let (directory, _) = directory_with_user("alice-ext");
    let directory = directory.with_workspace(ws, "Team");
    let gateway =
        TestGateway::spawn(&[("AUTH_ALLOW_EXPIRED_PATHS", "/v1/auth/refresh")], directory).await;

    let now = chrono::Utc::now().timestamp();
    let mut claims = standard_claims("alice-ext");
    claims["exp"] = serde_json::json!(now - 3600);

    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, &format!("/v1/workspaces/{ws}"), Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "TOKEN_EXPIRED");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_skip_path_never_reaches_validation() {
    use gatehouse::errors::AuthError;
    use gatehouse::middleware::{require_auth, AuthOptions, AuthState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // A validator that counts calls and rejects everything: if the skip
    // path works, it is never consulted
    struct CountingValidator {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl gatehouse::auth::TokenValidator for CountingValidator {
        async fn validate_token(
            &self,
            _token: &str,
        ) -> Result<gatehouse::auth::Claims, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AuthError::InvalidToken("rejected".to_string()))
        }
    }

    let validator = Arc::new(CountingValidator {
        calls: AtomicUsize::new(0),
    });

    let auth_state = Arc::new(AuthState {
        validator: validator.clone(),
        resolver: None,
        options: AuthOptions {
            skip_paths: ["/v1/ping".to_string()].into_iter().collect(),
            ..AuthOptions::default()
        },
    });

    let router = axum::Router::new()
        .route("/v1/ping", axum::routing::get(|| async { "pong" }))
        .route_layer(axum::middleware::from_fn_with_state(auth_state, require_auth));

    // No credential at all: the skip path still passes
    let response = get(&router, "/v1/ping", None).await;
    assert_eq!(response.status, StatusCode::OK);

    // An invalid credential on the skip path also passes untouched
    let response = get(&router, "/v1/ping", Some("garbage")).await;
    assert_eq!(response.status, StatusCode::OK);

    assert_eq!(
        validator.calls.load(Ordering::SeqCst),
        0,
        "Skip path must never reach token validation"
    );
}

#[tokio::test]
async fn test_unresolvable_identity_is_user_not_found() {
    // Directory has no mapping for this subject
    let gateway = TestGateway::spawn(&[], MockDirectory::new()).await;

    let token = gateway.keypair.sign_token(&standard_claims("ghost-ext"));
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "USER_NOT_FOUND");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_system_admin_flag_from_role_intersection() {
    let (directory, _) = directory_with_user("root-ext");
    let gateway = TestGateway::spawn(&[], directory).await;

    let mut claims = standard_claims("root-ext");
    claims["realm_access"] = serde_json::json!({ "roles": ["editor", "system_admin"] });

    let token = gateway.keypair.sign_token(&claims);
    let response = get(&gateway.router, "/v1/me", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["is_system_admin"], true);

    gateway.key_store.close();
}

#[tokio::test]
async fn test_mock_session_cookie_requires_dev_mode() {
    let vars = [
        ("SESSION_COOKIE_NAME", "gh_session"),
        ("DEV_MOCK_SESSION_TOKEN", "mock-sentinel"),
    ];

    // Production shape: sentinel configured but DEV_MODE unset
    let gateway = TestGateway::spawn(&vars, MockDirectory::new()).await;
    let response = get_with_headers(
        &gateway.router,
        "/v1/me",
        None,
        &[("cookie", "gh_session=mock-sentinel")],
    )
    .await;
    // The sentinel is treated as an ordinary (invalid) token
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    gateway.key_store.close();

    // Dev shape: DEV_MODE enabled engages the shortcut
    let vars = [
        ("SESSION_COOKIE_NAME", "gh_session"),
        ("DEV_MOCK_SESSION_TOKEN", "mock-sentinel"),
        ("DEV_MODE", "true"),
    ];
    let gateway = TestGateway::spawn(&vars, MockDirectory::new()).await;
    let response = get_with_headers(
        &gateway.router,
        "/v1/me",
        None,
        &[("cookie", "gh_session=mock-sentinel")],
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["username"], "dev");
    assert_eq!(response.json["is_system_admin"], false);
    gateway.key_store.close();
}

#[tokio::test]
async fn test_session_cookie_carries_ordinary_token() {
    let (directory, _) = directory_with_user("alice-ext");
    let gateway =
        TestGateway::spawn(&[("SESSION_COOKIE_NAME", "gh_session")], directory).await;

    let token = gateway.keypair.sign_token(&standard_claims("alice-ext"));
    let cookie = format!("gh_session={token}");
    let response =
        get_with_headers(&gateway.router, "/v1/me", None, &[("cookie", cookie.as_str())]).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json["username"], "alice-ext");

    gateway.key_store.close();
}

#[tokio::test]
async fn test_failure_body_shape() {
    let gateway = TestGateway::spawn(&[], MockDirectory::new()).await;

    let response = get(&gateway.router, "/v1/me", None).await;

    assert_eq!(response.json["success"], false);
    assert!(response.json["error"]["code"].is_string());
    assert!(response.json["error"]["message"].is_string());

    gateway.key_store.close();
}

#[tokio::test]
async fn test_issuer_constant_matches_harness() {
    // Guard against harness drift: standard claims must target the
    // configured issuer
    assert_eq!(standard_claims("x")["iss"], ISSUER);
}
