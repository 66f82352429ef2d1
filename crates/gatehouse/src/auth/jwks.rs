//! JWKS key store: fetches and caches the identity provider's public keys.
//!
//! Construction performs a synchronous initial fetch so the gateway never
//! starts without a usable key set. A background task refreshes the set on a
//! fixed interval to pick up key rotations; refresh failures are logged and
//! the previous key set is retained, so in-flight signature verification is
//! never starved by a transient provider outage.
//!
//! # Security
//!
//! - Keys are only looked up by `kid`; lookups never trigger a network call,
//!   so a request with a forged `kid` cannot drive fetch traffic
//! - HTTPS should be used in production (enforced by deployment config)

use crate::auth::oidc::OidcError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default refresh interval in seconds (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 300;

/// JSON Web Key from the JWKS endpoint.
///
/// Supports RSA (`kty = "RSA"`, RS256) and Ed25519 (`kty = "OKP"`, EdDSA)
/// signing keys; other key types are rejected at verification time.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm (e.g. "RS256", "EdDSA").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name (OKP keys; "Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key value for OKP keys (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,
}

/// JWKS response from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Thread-safe store of the provider's current signing keys.
///
/// The key map is read concurrently under a read lock and replaced
/// wholesale under the write lock on refresh.
pub struct JwksKeyStore {
    /// URL of the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching the JWKS.
    http_client: reqwest::Client,

    /// Current key set, keyed by `kid`.
    keys: RwLock<HashMap<String, Jwk>>,

    /// Cancels the background refresh task.
    shutdown: CancellationToken,
}

impl JwksKeyStore {
    /// Create a key store: fetch the initial key set, then start the
    /// background refresh task.
    ///
    /// # Errors
    ///
    /// Returns `OidcError::KeyFetch` if the initial fetch fails, the
    /// response cannot be decoded, or the key set is empty. The gateway
    /// must not start without keys to verify against.
    pub async fn connect(
        jwks_url: String,
        refresh_interval: Duration,
    ) -> Result<Arc<Self>, OidcError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| OidcError::KeyFetch(format!("Failed to build HTTP client: {e}")))?;

        let store = Arc::new(Self {
            jwks_url,
            http_client,
            keys: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });

        // Initial synchronous fetch: construction fails without a key set
        store.refresh().await?;

        store.spawn_refresh_task(refresh_interval);

        Ok(store)
    }

    /// Start the interval refresh task.
    ///
    /// The task holds a weak reference so dropping the last owning `Arc`
    /// also ends the task; `close` ends it explicitly.
    fn spawn_refresh_task(self: &Arc<Self>, refresh_interval: Duration) {
        let weak = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial fetch already
            // ran in connect, so consume it.
            interval.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::debug!(target: "gatehouse.auth.jwks", "Refresh task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(store) = weak.upgrade() else { break };
                        if let Err(e) = store.refresh().await {
                            // Fail-soft: keep verifying against the previous set
                            tracing::warn!(
                                target: "gatehouse.auth.jwks",
                                error = %e,
                                "JWKS refresh failed, retaining previous key set"
                            );
                        }
                    }
                }
            }
        });
    }

    /// Get a signing key by key ID.
    ///
    /// Read-lock lookup only; an unknown `kid` returns `None` and is
    /// surfaced by the validator as an invalid token.
    pub async fn get_key(&self, kid: &str) -> Option<Jwk> {
        let keys = self.keys.read().await;
        let key = keys.get(kid).cloned();
        if key.is_none() {
            tracing::debug!(target: "gatehouse.auth.jwks", kid = %kid, "Key not found in JWKS cache");
        }
        key
    }

    /// Number of keys currently cached.
    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Fetch the JWKS and replace the cached key set wholesale.
    ///
    /// # Errors
    ///
    /// Returns `OidcError::KeyFetch` on network failure, non-success status,
    /// decode failure, or an empty key list. The cached set is untouched on
    /// failure.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), OidcError> {
        tracing::debug!(target: "gatehouse.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gatehouse.auth.jwks", error = %e, "Failed to fetch JWKS");
                OidcError::KeyFetch(format!("JWKS fetch failed: {e}"))
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gatehouse.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(OidcError::KeyFetch(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gatehouse.auth.jwks", error = %e, "Failed to parse JWKS response");
            OidcError::KeyFetch(format!("JWKS decode failed: {e}"))
        })?;

        if jwks.keys.is_empty() {
            tracing::error!(target: "gatehouse.auth.jwks", "JWKS response contained no keys");
            return Err(OidcError::KeyFetch("JWKS response contained no keys".to_string()));
        }

        let fresh: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "gatehouse.auth.jwks",
            key_count = fresh.len(),
            "JWKS key set refreshed"
        );

        let mut keys = self.keys.write().await;
        *keys = fresh;

        Ok(())
    }

    /// Stop the background refresh task. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for JwksKeyStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
