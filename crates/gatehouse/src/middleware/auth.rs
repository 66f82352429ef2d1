//! Authentication middleware for protected routes.
//!
//! Per-request pipeline: skip check → credential extraction (bearer header,
//! then session cookie) → token validation via the claims adapter → the
//! expired-token exception for refresh endpoints → identity resolution →
//! context enrichment. Each terminal failure short-circuits with a
//! structured authentication error.

use crate::auth::claims::AuthContext;
use crate::auth::TokenValidator;
use crate::errors::{AuthError, GatewayError};
use crate::services::UserResolver;
use axum::{
    extract::{Request, State},
    http::header::{AUTHORIZATION, COOKIE},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Options for the authentication middleware.
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    /// Paths that bypass authentication entirely (exact match).
    pub skip_paths: HashSet<String>,

    /// Paths that accept an expired-but-otherwise-valid token (exact
    /// match); token-refresh endpoints need the expired identity to mint a
    /// new token.
    pub allow_expired_paths: HashSet<String>,

    /// Session cookie consulted when no Authorization header is present.
    pub session_cookie_name: Option<String>,

    /// Non-production flag; the mock-session sentinel is inert without it.
    pub dev_mode: bool,

    /// Development mock-session sentinel value.
    pub mock_session_token: Option<String>,
}

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token validation capability (the claims adapter).
    pub validator: Arc<dyn TokenValidator>,

    /// Optional identity resolution collaborator.
    pub resolver: Option<Arc<dyn UserResolver>>,

    /// Middleware options.
    pub options: AuthOptions,
}

/// The credential extracted from a request.
enum Credential {
    /// A bearer token (from the header or the session cookie).
    Bearer(String),
    /// The development mock-session shortcut.
    MockSession,
}

/// Authentication middleware.
///
/// On success the request proceeds with an [`AuthContext`] in its
/// extensions; on failure the structured error is returned and the handler
/// is never reached.
#[instrument(skip_all, name = "gatehouse.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = req.uri().path().to_string();

    // Skip check: configured paths bypass authentication entirely
    if state.options.skip_paths.contains(&path) {
        tracing::debug!(target: "gatehouse.middleware.auth", path = %path, "Skipping authentication");
        return Ok(next.run(req).await);
    }

    let token = match extract_credential(req.headers(), &state.options)? {
        Credential::Bearer(token) => token,
        Credential::MockSession => {
            // Development shortcut: fixed identity, no validation
            tracing::debug!(target: "gatehouse.middleware.auth", "Mock session accepted (dev mode)");
            req.extensions_mut().insert(AuthContext::mock_dev_identity());
            return Ok(next.run(req).await);
        }
    };

    // Validate via the claims adapter
    let mut claims = match state.validator.validate_token(&token).await {
        Ok(claims) => claims,
        Err(AuthError::TokenExpired { claims: Some(claims) })
            if state.options.allow_expired_paths.contains(&path) =>
        {
            // Refresh endpoints accept an expired-but-otherwise-valid token
            tracing::debug!(
                target: "gatehouse.middleware.auth",
                path = %path,
                "Proceeding with expired claims on allow-expired path"
            );
            *claims
        }
        Err(err) => return Err(err.into()),
    };

    // Resolve the external identity to an internal user id
    if claims.internal_user_id.is_none() {
        if let Some(resolver) = &state.resolver {
            let internal_id = resolver
                .resolve_user(&claims.external_user_id, &claims.username, &claims.email)
                .await
                .map_err(|e| {
                    tracing::debug!(target: "gatehouse.middleware.auth", error = %e, "Identity resolution failed");
                    GatewayError::from(AuthError::UserNotFound)
                })?;
            claims.internal_user_id = Some(internal_id);
        }
    }

    // Enrich the request context for downstream consumers
    req.extensions_mut().insert(AuthContext::from_claims(&claims));

    Ok(next.run(req).await)
}

/// Extract the request credential.
///
/// The Authorization header is preferred; a present-but-malformed header is
/// rejected without falling back to the cookie. The mock-session sentinel
/// only matches when the non-production flag is set.
fn extract_credential(
    headers: &HeaderMap,
    options: &AuthOptions,
) -> Result<Credential, GatewayError> {
    if let Some(header) = headers.get(AUTHORIZATION) {
        let value = header.to_str().map_err(|_| {
            tracing::debug!(target: "gatehouse.middleware.auth", "Authorization header is not valid UTF-8");
            GatewayError::from(AuthError::InvalidAuthHeader)
        })?;

        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            tracing::debug!(target: "gatehouse.middleware.auth", "Authorization header is not a Bearer credential");
            GatewayError::from(AuthError::InvalidAuthHeader)
        })?;

        if token.is_empty() {
            tracing::debug!(target: "gatehouse.middleware.auth", "Bearer token is empty");
            return Err(AuthError::InvalidAuthHeader.into());
        }

        return Ok(Credential::Bearer(token.to_string()));
    }

    if let Some(cookie_name) = &options.session_cookie_name {
        if let Some(value) = cookie_value(headers, cookie_name) {
            if options.dev_mode && options.mock_session_token.as_deref() == Some(value.as_str()) {
                return Ok(Credential::MockSession);
            }
            return Ok(Credential::Bearer(value));
        }
    }

    tracing::debug!(target: "gatehouse.middleware.auth", "No credential presented");
    Err(AuthError::MissingAuthHeader.into())
}

/// Find a cookie's value across all Cookie headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
