//! JWT pre-verification utilities shared across Gatehouse components.
//!
//! This module provides the checks that run *before* a token reaches
//! signature verification:
//! - Size limits for DoS prevention
//! - Leeway constants for expiry/issued-at validation
//! - Key ID extraction from JWT headers
//! - Future-`iat` validation
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Generic error messages prevent information leakage
//! - The `kid` extracted here is only used to look up a key in a trusted
//!   JWKS; the token must still be verified against that key

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical identity tokens are well under 2KB even with role and group
/// claims. Tokens larger than this are rejected before any base64 decoding
/// or cryptographic work happens, bounding the cost of a hostile request.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default validation leeway (60 seconds).
///
/// Applied to expiry and issued-at checks to absorb clock drift between
/// the identity provider and this service.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

/// Maximum allowed validation leeway (10 minutes).
///
/// Prevents misconfiguration that would effectively disable expiry checks
/// by allowing an excessively large tolerance.
pub const MAX_LEEWAY: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT pre-verification.
///
/// Note: error messages are intentionally generic to prevent information
/// leakage. Details are logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtPreflightError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// Used to select the correct signing key from the JWKS when multiple keys
/// are valid at once (key rotation).
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature; the token MUST
///   still be verified against the fetched key
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong structure, bad base64, or invalid header JSON
/// - `MissingKid` - header has no `kid`, or `kid` is not a non-empty string
pub fn extract_kid(token: &str) -> Result<String, JwtPreflightError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtPreflightError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtPreflightError::MalformedToken);
    }

    // Decode the header (first part) - safe since we verified the part count
    let header_part = parts.first().ok_or(JwtPreflightError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtPreflightError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtPreflightError::MalformedToken
    })?;

    // Extract kid as string, rejecting empty values
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(JwtPreflightError::MissingKid)?;

    Ok(kid)
}

/// Validate the `iat` (issued-at) claim with leeway.
///
/// Rejects tokens with `iat` too far in the future, which could indicate a
/// pre-generated token, clock desynchronization, or manipulation.
///
/// # Errors
///
/// Returns `JwtPreflightError::IatTooFarInFuture` if the iat timestamp is
/// more than `leeway` in the future.
pub fn validate_iat(iat: i64, leeway: Duration) -> Result<(), JwtPreflightError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, leeway, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub fn validate_iat_at(iat: i64, leeway: Duration, now: i64) -> Result<(), JwtPreflightError> {
    // Safe cast: leeway is bounded to MAX_LEEWAY (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let leeway_secs = leeway.as_secs() as i64;
    let max_iat = now + leeway_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtPreflightError::IatTooFarInFuture);
    }

    Ok(())
}

/// Decode a public key member from a JWK (base64url without padding).
///
/// Covers both the `x` member of an OKP (Ed25519) key and the `n`/`e`
/// members of an RSA key.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content is not valid base64url.
pub fn decode_jwk_member(b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(b64url)
}

// =============================================================================
// Tests
// =============================================================================
