//! Cached privileged service-account token.
//!
//! Gatehouse makes administrative calls to backend services (user directory,
//! provider admin API) using a service-account token issued by the identity
//! provider. This module caches that token process-wide and collapses
//! concurrent refreshes so a burst of requests against a cold or expired
//! cache results in a single token request.
//!
//! # Grant selection
//!
//! - A configured client secret selects the OAuth 2.0 client-credentials
//!   grant.
//! - Otherwise the resource-owner password grant is used, and a username and
//!   password must be configured.
//!
//! # Concurrency
//!
//! `get_token` takes a read lock on the fast path. On the slow path it takes
//! the write lock and re-checks the cache (double-checked locking): callers
//! that queued behind an in-flight refresh observe the freshly stored token
//! and return without touching the network.
//!
//! # Security
//!
//! - Client secret, password, and the cached token are `SecretString`s
//! - Token acquisition events are logged without values
//! - HTTP timeouts prevent hanging connections

use crate::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default refresh buffer (30 seconds).
///
/// A cached token is treated as stale once its remaining lifetime drops
/// below this buffer, so callers never receive a token that expires while
/// their backend call is in flight.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(30);

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during admin token acquisition.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// HTTP client error (network failure, timeout).
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the identity provider (401, 400).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response could not be decoded.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the admin token cache.
#[derive(Clone)]
pub struct AdminTokenConfig {
    /// Token endpoint URL (e.g. `https://idp.example.com/oauth2/token`).
    pub token_url: String,

    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret. When set, the client-credentials grant is used.
    pub client_secret: Option<SecretString>,

    /// Service-account username (password grant only).
    pub username: Option<String>,

    /// Service-account password (password grant only).
    pub password: Option<SecretString>,

    /// Treat the cached token as stale this long before its expiry.
    pub refresh_buffer: Duration,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for AdminTokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminTokenConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_buffer", &self.refresh_buffer)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl AdminTokenConfig {
    /// Create a new configuration with default timeouts and no credentials.
    ///
    /// Attach credentials with [`AdminTokenConfig::with_client_secret`] (for
    /// the client-credentials grant) or
    /// [`AdminTokenConfig::with_password_grant`].
    #[must_use]
    pub fn new(token_url: String, client_id: String) -> Self {
        Self {
            token_url,
            client_id,
            client_secret: None,
            username: None,
            password: None,
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Use the client-credentials grant with this client secret.
    #[must_use]
    pub fn with_client_secret(mut self, client_secret: SecretString) -> Self {
        self.client_secret = Some(client_secret);
        self
    }

    /// Use the password grant with this service account.
    #[must_use]
    pub fn with_password_grant(mut self, username: String, password: SecretString) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Set the refresh buffer.
    #[must_use]
    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }
}

// =============================================================================
// OAuth Response Types
// =============================================================================

/// OAuth 2.0 token response from the identity provider.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
    expires_in: u64,
    #[allow(dead_code)]
    #[serde(default)]
    scope: Option<String>,
}

impl std::fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Cached token with its absolute expiry time.
struct CachedToken {
    token: SecretString,
    /// Unix timestamp (seconds) at which the token expires.
    expires_at: i64,
}

/// Process-wide cache of the privileged service-account token.
///
/// Invariant: a token returned from [`AdminTokenCache::get_token`] satisfies
/// `now + refresh_buffer < expires_at`, or was just synchronously fetched.
pub struct AdminTokenCache {
    config: AdminTokenConfig,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for AdminTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminTokenCache")
            .field("config", &self.config)
            .field("cache", &"[REDACTED]")
            .finish()
    }
}

impl AdminTokenCache {
    /// Create a new admin token cache.
    ///
    /// # Errors
    ///
    /// - `TokenError::Configuration` if the password grant is selected (no
    ///   client secret) but username or password is missing, or if the HTTP
    ///   client cannot be built.
    pub fn new(config: AdminTokenConfig) -> Result<Self, TokenError> {
        if config.client_secret.is_none()
            && (config.username.is_none() || config.password.is_none())
        {
            return Err(TokenError::Configuration(
                "password grant requires both username and password".into(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            cache: RwLock::new(None),
        })
    }

    /// Get a valid admin token, refreshing it if necessary.
    ///
    /// Fast path: a read lock and a clone when the cached token has more
    /// than `refresh_buffer` of lifetime left. Slow path: the write lock,
    /// a re-check (another caller may have refreshed while this one waited),
    /// and at most one token request.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenError`] from the token request. The stale cache is
    /// left untouched on failure, so the next caller retries the fetch.
    #[instrument(skip_all)]
    pub async fn get_token(&self) -> Result<SecretString, TokenError> {
        // Fast path: cached token with enough lifetime left
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if self.is_fresh(cached) {
                    trace!(target: "common.token_cache", "Admin token cache hit");
                    return Ok(cached.token.clone());
                }
            }
        }

        // Slow path: exclusive lock, then re-check - a concurrent caller may
        // have refreshed while this one waited for the write lock.
        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref() {
            if self.is_fresh(cached) {
                debug!(target: "common.token_cache", "Admin token refreshed by concurrent caller");
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }

    /// Clear the cache unconditionally.
    ///
    /// The next `get_token` call performs a fresh backend fetch. Used when a
    /// backend rejects the cached token (e.g. it was revoked server-side).
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        debug!(target: "common.token_cache", "Admin token cache invalidated");
    }

    /// Whether a cached token still has more than `refresh_buffer` left.
    fn is_fresh(&self, cached: &CachedToken) -> bool {
        let now = chrono::Utc::now().timestamp();
        // Safe cast: refresh_buffer is a small configured duration
        #[allow(clippy::cast_possible_wrap)]
        let buffer_secs = self.config.refresh_buffer.as_secs() as i64;
        now + buffer_secs < cached.expires_at
    }

    /// Perform one token request against the identity provider.
    #[instrument(skip_all)]
    async fn fetch_token(&self) -> Result<CachedToken, TokenError> {
        debug!(
            target: "common.token_cache",
            client_id = %self.config.client_id,
            url = %self.config.token_url,
            "Requesting admin token"
        );

        let client_id = self.config.client_id.clone();
        let form_body: Vec<(&str, &str)> = match (&self.config.client_secret, &self.config.username, &self.config.password) {
            (Some(secret), _, _) => vec![
                ("grant_type", "client_credentials"),
                ("client_id", &client_id),
                ("client_secret", secret.expose_secret()),
            ],
            (None, Some(username), Some(password)) => vec![
                ("grant_type", "password"),
                ("client_id", &client_id),
                ("username", username),
                ("password", password.expose_secret()),
            ],
            // Rejected at construction time; surfaced again here so a future
            // construction path cannot silently send an empty grant.
            (None, _, _) => {
                return Err(TokenError::Configuration(
                    "password grant requires both username and password".into(),
                ))
            }
        };

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&form_body)
            .send()
            .await
            .map_err(|e| {
                debug!(target: "common.token_cache", error = %e, "HTTP request failed");
                TokenError::HttpError(e.to_string())
            })?;

        let status = response.status();

        if status.is_success() {
            let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
                warn!(target: "common.token_cache", error = %e, "Failed to parse token response");
                TokenError::InvalidResponse(e.to_string())
            })?;

            let now = chrono::Utc::now().timestamp();
            #[allow(clippy::cast_possible_wrap)]
            let expires_at = now + token_response.expires_in as i64;

            debug!(
                target: "common.token_cache",
                expires_in_secs = token_response.expires_in,
                "Admin token acquired"
            );

            Ok(CachedToken {
                token: SecretString::from(token_response.access_token),
                expires_at,
            })
        } else if status.as_u16() == 401 || status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "common.token_cache", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "common.token_cache",
                status = %status,
                "Admin credentials rejected by identity provider"
            );
            // Body logged at trace level only; never included in the error
            trace!(
                target: "common.token_cache",
                body = %body,
                "Rejection response body"
            );
            Err(TokenError::AuthenticationRejected(format!(
                "Status {status}"
            )))
        } else {
            warn!(
                target: "common.token_cache",
                status = %status,
                "Unexpected response from token endpoint"
            );
            Err(TokenError::HttpError(format!(
                "Unexpected status: {status}"
            )))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
