//! Shared test harness: Ed25519 token signing, a mocked identity provider,
//! and a gateway assembled around mock collaborators.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use gatehouse::auth::{JwksKeyStore, OidcAdapter, OidcValidator};
use gatehouse::config::Config;
use gatehouse::ratelimit::MemoryRateLimitStore;
use gatehouse::routes::{build_routes, AppState};
use gatehouse::services::mock::MockDirectory;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Issuer configured for the test gateway; token payloads must match it.
pub const ISSUER: &str = "https://idp.test/realms/gatehouse";

/// Test keypair for signing tokens.
pub struct TestKeypair {
    pub kid: String,
    pub public_key_bytes: Vec<u8>,
    pub private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    pub fn new(seed: u8, kid: &str) -> Self {
        // Create deterministic seed
        let mut seed_bytes = [0u8; 32];
        seed_bytes[0] = seed;
        for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
            *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
        }

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        let public_key_bytes = key_pair.public_key().as_ref().to_vec();
        let private_key_pkcs8 = build_pkcs8_from_seed(&seed_bytes);

        Self {
            kid: kid.to_string(),
            public_key_bytes,
            private_key_pkcs8,
        }
    }

    /// Sign a token over an arbitrary JSON payload.
    pub fn sign_token(&self, claims: &serde_json::Value) -> String {
        self.sign_token_with_kid(claims, &self.kid)
    }

    /// Sign a token with an explicit `kid` header (for unknown-kid tests).
    pub fn sign_token_with_kid(&self, claims: &serde_json::Value, kid: &str) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(kid.to_string());

        encode(&header, claims, &encoding_key).expect("Failed to sign token")
    }

    pub fn jwk_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// Build PKCS#8 v1 document from an Ed25519 seed.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::new();

    // Outer SEQUENCE tag
    pkcs8.push(0x30);
    pkcs8.push(0x2e); // Length: 46 bytes

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // Algorithm Identifier: SEQUENCE
    pkcs8.push(0x30);
    pkcs8.push(0x05); // Length: 5 bytes
                      // OID for Ed25519: 1.3.101.112
    pkcs8.extend_from_slice(&[0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private Key: OCTET STRING
    pkcs8.push(0x04);
    pkcs8.push(0x22); // Length: 34 bytes
                      // Inner OCTET STRING with seed
    pkcs8.push(0x04);
    pkcs8.push(0x20); // Length: 32 bytes
    pkcs8.extend_from_slice(seed);

    pkcs8
}

/// A standard, valid token payload for `sub` against the test issuer.
pub fn standard_claims(sub: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    serde_json::json!({
        "sub": sub,
        "iss": ISSUER,
        "exp": now + 900,
        "iat": now - 10,
        "email": format!("{sub}@example.com"),
        "preferred_username": sub,
        "realm_access": { "roles": ["editor"] },
        "groups": ["/eng"]
    })
}

/// Test gateway assembled from a mocked JWKS provider and a mock directory.
pub struct TestGateway {
    pub router: Router,
    pub key_store: Arc<JwksKeyStore>,
    pub mock_server: MockServer,
    pub keypair: TestKeypair,
}

impl TestGateway {
    /// Spawn a gateway with extra configuration variables and the given
    /// directory contents.
    pub async fn spawn(extra_vars: &[(&str, &str)], directory: MockDirectory) -> Self {
        // Mocked identity provider with a JWKS endpoint
        let mock_server = MockServer::start().await;
        let keypair = TestKeypair::new(1, "test-key-01");

        Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [keypair.jwk_json()]
            })))
            .mount(&mock_server)
            .await;

        let mut vars = HashMap::from([
            ("OIDC_ISSUER_URL".to_string(), ISSUER.to_string()),
            (
                "OIDC_JWKS_URL".to_string(),
                format!("{}/.well-known/jwks.json", mock_server.uri()),
            ),
            (
                "OIDC_TOKEN_URL".to_string(),
                format!("{}/oauth2/token", mock_server.uri()),
            ),
            ("ADMIN_CLIENT_ID".to_string(), "test-gatehouse".to_string()),
            ("ADMIN_CLIENT_SECRET".to_string(), "test-secret".to_string()),
            (
                "DIRECTORY_URL".to_string(),
                "http://directory.test".to_string(),
            ),
        ]);
        for (key, value) in extra_vars {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars).expect("Failed to build test config");

        let key_store = JwksKeyStore::connect(
            config.jwks_url.clone(),
            Duration::from_secs(config.jwks_refresh_seconds),
        )
        .await
        .expect("Failed to connect test key store");

        #[allow(clippy::cast_sign_loss)]
        let leeway = Duration::from_secs(config.jwt_leeway_seconds as u64);
        let validator = OidcValidator::new(
            Arc::clone(&key_store),
            config.issuer_url.clone(),
            config.audience.clone(),
            leeway,
        );
        let adapter = Arc::new(
            OidcAdapter::new(validator).with_admin_roles(config.system_admin_roles.clone()),
        );

        let directory = Arc::new(directory);

        let state = Arc::new(AppState {
            config,
            key_store: Arc::clone(&key_store),
            validator: adapter,
            resolver: Some(directory.clone()),
            workspace_access: directory,
            rate_limit_store: Arc::new(MemoryRateLimitStore::new()),
        });

        let router = build_routes(state);

        Self {
            router,
            key_store,
            mock_server,
            keypair,
        }
    }
}

/// A decoded test response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: serde_json::Value,
}

impl TestResponse {
    /// Machine-readable error code from the failure body.
    pub fn error_code(&self) -> &str {
        self.json["error"]["code"].as_str().unwrap_or_default()
    }
}

/// Drive a GET request through the router.
pub async fn get(router: &Router, request_path: &str, bearer: Option<&str>) -> TestResponse {
    get_with_headers(router, request_path, bearer, &[]).await
}

/// Drive a GET request with extra headers through the router.
pub async fn get_with_headers(
    router: &Router,
    request_path: &str,
    bearer: Option<&str>,
    extra_headers: &[(&str, &str)],
) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(request_path);
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).unwrap();

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Request should not fail at the service level");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };

    TestResponse {
        status,
        headers,
        json,
    }
}
