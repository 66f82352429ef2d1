//! Gatehouse error types.
//!
//! Two layers:
//!
//! - [`AuthError`] is the provider-agnostic authentication taxonomy produced
//!   by the claims adapter and the authentication middleware.
//! - [`GatewayError`] is the HTTP-facing error. Every terminal failure maps
//!   to a status code and a machine-readable code via the `IntoResponse`
//!   impl, rendered as `{"success": false, "error": {"code", "message"}}`.
//!
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details. Actual errors are logged server-side.

use crate::auth::claims::Claims;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Provider-agnostic authentication error taxonomy.
///
/// Produced by credential extraction, the claims adapter, and identity
/// resolution. The claims adapter maps provider-specific failures onto these
/// variants so the middleware never sees a provider type.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was presented at all.
    #[error("Missing authorization credential")]
    MissingAuthHeader,

    /// A credential was presented but is not a usable bearer token.
    #[error("Invalid authorization header")]
    InvalidAuthHeader,

    /// Signature, structure, or key lookup failed.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The token is expired past the configured leeway.
    ///
    /// Carries the decoded claims when they could still be extracted, so the
    /// allow-expired-path flow (token refresh endpoints) can proceed with
    /// the expired identity.
    #[error("Token expired")]
    TokenExpired { claims: Option<Box<Claims>> },

    /// The token issuer does not match the configured issuer.
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// The token audience does not contain the expected audience.
    #[error("Invalid token audience")]
    InvalidAudience,

    /// The token carries no subject.
    #[error("Token has no subject")]
    MissingSubject,

    /// The external identity could not be resolved to an internal user.
    #[error("User not found")]
    UserNotFound,

    /// The signing key set could not be fetched.
    #[error("Key fetch failed: {0}")]
    KeyFetch(String),

    /// An unrecognized identity-provider failure, wrapped so diagnostic
    /// information survives the adapter boundary.
    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthorized, TokenExpired, UserNotFound: 401 Unauthorized
/// - Forbidden, NotWorkspaceMember: 403 Forbidden
/// - WorkspaceNotFound: 404 Not Found
/// - InvalidWorkspaceId, WorkspaceIdRequired: 400 Bad Request
/// - RateLimitExceeded: 429 Too Many Requests
/// - ServiceUnavailable: 503 Service Unavailable
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not a workspace member")]
    NotWorkspaceMember,

    #[error("Workspace not found")]
    WorkspaceNotFound,

    #[error("Invalid workspace id")]
    InvalidWorkspaceId,

    #[error("Workspace id required")]
    WorkspaceIdRequired,

    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        /// Seconds until the current window expires.
        retry_after_secs: u64,
    },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Unauthorized(_)
            | GatewayError::TokenExpired
            | GatewayError::UserNotFound => 401,
            GatewayError::Forbidden(_) | GatewayError::NotWorkspaceMember => 403,
            GatewayError::WorkspaceNotFound => 404,
            GatewayError::InvalidWorkspaceId | GatewayError::WorkspaceIdRequired => 400,
            GatewayError::RateLimitExceeded { .. } => 429,
            GatewayError::ServiceUnavailable(_) => 503,
            GatewayError::Internal => 500,
        }
    }

    /// Returns the machine-readable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::TokenExpired => "TOKEN_EXPIRED",
            GatewayError::UserNotFound => "USER_NOT_FOUND",
            GatewayError::Forbidden(_) => "FORBIDDEN",
            GatewayError::NotWorkspaceMember => "NOT_WORKSPACE_MEMBER",
            GatewayError::WorkspaceNotFound => "WORKSPACE_NOT_FOUND",
            GatewayError::InvalidWorkspaceId => "INVALID_WORKSPACE_ID",
            GatewayError::WorkspaceIdRequired => "WORKSPACE_ID_REQUIRED",
            GatewayError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            GatewayError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuthHeader => {
                GatewayError::Unauthorized("Missing authorization credential".to_string())
            }
            AuthError::InvalidAuthHeader => {
                GatewayError::Unauthorized("Invalid authorization header format".to_string())
            }
            AuthError::InvalidToken(reason) => GatewayError::Unauthorized(reason),
            AuthError::TokenExpired { .. } => GatewayError::TokenExpired,
            AuthError::InvalidIssuer => {
                GatewayError::Unauthorized("The access token issuer is not trusted".to_string())
            }
            AuthError::InvalidAudience => {
                GatewayError::Unauthorized("The access token audience is not accepted".to_string())
            }
            AuthError::MissingSubject => {
                GatewayError::Unauthorized("The access token has no subject".to_string())
            }
            AuthError::UserNotFound => GatewayError::UserNotFound,
            AuthError::KeyFetch(reason) => GatewayError::ServiceUnavailable(reason),
            AuthError::Provider(reason) => {
                // Wrapped provider detail is logged, never returned to clients
                tracing::warn!(target: "gatehouse.auth", reason = %reason, "Identity provider error");
                GatewayError::Unauthorized("The access token is invalid or expired".to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            GatewayError::Unauthorized(reason) => (StatusCode::UNAUTHORIZED, reason.clone()),
            GatewayError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "The access token has expired".to_string(),
            ),
            GatewayError::UserNotFound => (
                StatusCode::UNAUTHORIZED,
                "No account exists for this identity".to_string(),
            ),
            GatewayError::Forbidden(reason) => (StatusCode::FORBIDDEN, reason.clone()),
            GatewayError::NotWorkspaceMember => (
                StatusCode::FORBIDDEN,
                "You are not a member of this workspace".to_string(),
            ),
            GatewayError::WorkspaceNotFound => {
                (StatusCode::NOT_FOUND, "Workspace not found".to_string())
            }
            GatewayError::InvalidWorkspaceId => (
                StatusCode::BAD_REQUEST,
                "Workspace id is not a valid identifier".to_string(),
            ),
            GatewayError::WorkspaceIdRequired => (
                StatusCode::BAD_REQUEST,
                "Workspace id is required".to_string(),
            ),
            GatewayError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.".to_string(),
            ),
            GatewayError::ServiceUnavailable(reason) => {
                // Log actual reason server-side, return generic message
                tracing::warn!(target: "gatehouse.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"gatehouse\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        // Add Retry-After header for 429 responses
        if let GatewayError::RateLimitExceeded { retry_after_secs } = &self {
            if let Ok(header_value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}
