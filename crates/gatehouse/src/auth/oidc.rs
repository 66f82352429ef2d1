//! OIDC token validation against the JWKS key store.
//!
//! Verifies a bearer token's signature using the key selected by its `kid`,
//! then runs the claim checks explicitly and in a fixed order (expiry →
//! issuer → audience → subject) so every failure maps to exactly one error.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 (RSA) and EdDSA (Ed25519) keys are accepted
//! - Expiry and issued-at are validated with a configured leeway
//! - Generic error messages prevent information leakage
//!
//! Expired-but-otherwise-signed tokens still yield their decoded claims
//! inside [`OidcError::TokenExpired`]; token-refresh endpoints rely on this
//! to accept an expired token when minting a new one.

use crate::auth::jwks::{Jwk, JwksKeyStore};
use common::jwt::{decode_jwk_member, extract_kid, validate_iat_at};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Client-visible message for every token rejection that should not reveal
/// its cause.
const GENERIC_INVALID: &str = "The access token is invalid or expired";

/// Provider-specific validation errors.
///
/// Mapped onto the generic [`crate::errors::AuthError`] taxonomy by the
/// claims adapter; nothing outside the `auth` module consumes these.
#[derive(Debug, Error)]
pub enum OidcError {
    /// Structure, signature, key lookup, or required-claim failure.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Expired past the configured leeway. Carries the decoded claims when
    /// a non-empty subject was present.
    #[error("The access token has expired")]
    TokenExpired { claims: Option<Box<OidcClaims>> },

    /// `iss` does not match the configured issuer.
    #[error("The access token issuer is not trusted")]
    InvalidIssuer,

    /// `aud` does not contain the expected audience.
    #[error("The access token audience is not accepted")]
    InvalidAudience,

    /// `sub` is absent or empty.
    #[error("The access token has no subject")]
    MissingSubject,

    /// The signing key set could not be fetched.
    #[error("Signing keys unavailable: {0}")]
    KeyFetch(String),
}

/// Claims decoded from a verified provider token.
///
/// Optional claims are extracted defensively: a claim with an unexpected
/// shape is skipped, and non-string elements of role/group arrays are
/// dropped, so partial claims degrade gracefully instead of failing the
/// whole validation.
#[derive(Clone)]
pub struct OidcClaims {
    /// Subject (provider-side user id) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds; 0 when absent).
    pub iat: i64,

    /// Email address - redacted in Debug output.
    pub email: Option<String>,

    /// Preferred username.
    pub preferred_username: Option<String>,

    /// Given name.
    pub given_name: Option<String>,

    /// Family name.
    pub family_name: Option<String>,

    /// Provider session id.
    pub session_id: Option<String>,

    /// Realm roles (string entries only).
    pub roles: Vec<String>,

    /// Group memberships (string entries only).
    pub groups: Vec<String>,
}

impl fmt::Debug for OidcClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("preferred_username", &self.preferred_username)
            .field("roles", &self.roles)
            .field("groups", &self.groups)
            .finish()
    }
}

/// Raw claim shapes as deserialized from the token payload.
///
/// Every optional claim is a `Value` so a wrong-shaped entry never fails
/// the deserialization of the whole payload.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    aud: Option<Value>,
    #[serde(default)]
    email: Option<Value>,
    #[serde(default)]
    preferred_username: Option<Value>,
    #[serde(default)]
    given_name: Option<Value>,
    #[serde(default)]
    family_name: Option<Value>,
    #[serde(default)]
    sid: Option<Value>,
    #[serde(default)]
    realm_access: Option<Value>,
    #[serde(default)]
    groups: Option<Value>,
}

impl RawClaims {
    /// `aud` may be a single string or an array; anything else is empty.
    fn audiences(&self) -> Vec<String> {
        match &self.aud {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Realm roles live under `realm_access.roles`.
    fn realm_roles(&self) -> Vec<String> {
        self.realm_access
            .as_ref()
            .and_then(|v| v.get("roles"))
            .map(string_list)
            .unwrap_or_default()
    }
}

/// Extract a string claim, skipping wrong-shaped values.
fn opt_string(value: &Option<Value>) -> Option<String> {
    value
        .as_ref()
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Extract a string array, dropping non-string elements.
fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Build the claims value carried on success and inside `TokenExpired`.
///
/// Returns `None` when no non-empty subject is present: a claims value with
/// an empty subject is never produced.
fn extract_claims(raw: &RawClaims, exp: i64) -> Option<OidcClaims> {
    let sub = raw.sub.as_deref().filter(|s| !s.is_empty())?.to_string();

    Some(OidcClaims {
        sub,
        exp,
        iat: raw.iat.unwrap_or(0),
        email: opt_string(&raw.email),
        preferred_username: opt_string(&raw.preferred_username),
        given_name: opt_string(&raw.given_name),
        family_name: opt_string(&raw.family_name),
        session_id: opt_string(&raw.sid),
        roles: raw.realm_roles(),
        groups: raw.groups.as_ref().map(string_list).unwrap_or_default(),
    })
}

/// OIDC token validator backed by the JWKS key store.
pub struct OidcValidator {
    /// Key store for signing-key lookup.
    key_store: Arc<JwksKeyStore>,

    /// Expected `iss` value.
    issuer: String,

    /// Expected audience; `None` skips the audience check (escape hatch for
    /// providers whose default audience is not the caller's client id).
    audience: Option<String>,

    /// Leeway applied to expiry and issued-at checks.
    leeway: Duration,
}

impl OidcValidator {
    /// Create a new validator.
    pub fn new(
        key_store: Arc<JwksKeyStore>,
        issuer: String,
        audience: Option<String>,
        leeway: Duration,
    ) -> Self {
        Self {
            key_store,
            issuer,
            audience,
            leeway,
        }
    }

    /// Validate a token and return its claims.
    ///
    /// Pure function of the token, the current key set, the clock, and the
    /// configured issuer/audience/leeway.
    ///
    /// # Errors
    ///
    /// Returns the [`OidcError`] variant matching the first failed check;
    /// see the module docs for the check order.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<OidcClaims, OidcError> {
        self.validate_at(token, chrono::Utc::now().timestamp()).await
    }

    /// Deterministic validation against an explicit `now` timestamp.
    ///
    /// Prefer [`OidcValidator::validate`] in production code; this seam
    /// exists so expiry boundaries can be tested without wall-clock races.
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<OidcClaims, OidcError> {
        if token.is_empty() {
            return Err(OidcError::InvalidToken(GENERIC_INVALID.to_string()));
        }

        // Extract kid (includes the size check)
        let kid = extract_kid(token).map_err(|e| {
            tracing::debug!(target: "gatehouse.auth.oidc", error = ?e, "Token kid extraction failed");
            OidcError::InvalidToken(GENERIC_INVALID.to_string())
        })?;

        // Look up the signing key; unknown kid is an invalid token, never a
        // fetch trigger
        let jwk = self.key_store.get_key(&kid).await.ok_or_else(|| {
            OidcError::InvalidToken(GENERIC_INVALID.to_string())
        })?;

        // Verify the signature and decode the payload
        let raw = verify_signature(token, &jwk)?;

        // Explicit claim checks, in order
        self.check_claims(&raw, now)
    }

    /// Ordered claim checks: expiry → issuer → audience → subject →
    /// issued-at.
    fn check_claims(&self, raw: &RawClaims, now: i64) -> Result<OidcClaims, OidcError> {
        // Safe cast: leeway is bounded by configuration validation
        #[allow(clippy::cast_possible_wrap)]
        let leeway_secs = self.leeway.as_secs() as i64;

        // exp is required; its absence is itself an error
        let Some(exp) = raw.exp else {
            tracing::debug!(target: "gatehouse.auth.oidc", "Token rejected: missing exp claim");
            return Err(OidcError::InvalidToken(GENERIC_INVALID.to_string()));
        };

        if now > exp + leeway_secs {
            tracing::debug!(
                target: "gatehouse.auth.oidc",
                expired_by_secs = now - exp,
                "Token rejected: expired past leeway"
            );
            return Err(OidcError::TokenExpired {
                claims: extract_claims(raw, exp).map(Box::new),
            });
        }

        match raw.iss.as_deref() {
            Some(iss) if iss == self.issuer => {}
            _ => {
                tracing::debug!(target: "gatehouse.auth.oidc", "Token rejected: issuer mismatch");
                return Err(OidcError::InvalidIssuer);
            }
        }

        if let Some(expected) = &self.audience {
            if !raw.audiences().iter().any(|aud| aud == expected) {
                tracing::debug!(target: "gatehouse.auth.oidc", "Token rejected: audience mismatch");
                return Err(OidcError::InvalidAudience);
            }
        }

        if raw.sub.as_deref().is_none_or(str::is_empty) {
            tracing::debug!(target: "gatehouse.auth.oidc", "Token rejected: missing subject");
            return Err(OidcError::MissingSubject);
        }

        if let Some(iat) = raw.iat {
            validate_iat_at(iat, self.leeway, now).map_err(|e| {
                tracing::debug!(target: "gatehouse.auth.oidc", error = ?e, "Token iat validation failed");
                OidcError::InvalidToken(GENERIC_INVALID.to_string())
            })?;
        }

        // Subject was just checked, so claims extraction cannot come back
        // empty; treat the impossible case as a missing subject anyway.
        extract_claims(raw, exp).ok_or(OidcError::MissingSubject)
    }

    /// Release resources held by the underlying key store.
    pub fn close(&self) {
        self.key_store.close();
    }
}

/// Verify the token signature against a JWK and decode the payload.
///
/// All claim validation is disabled here; the validator runs its own
/// ordered checks so each failure maps to a distinct error.
fn verify_signature(token: &str, jwk: &Jwk) -> Result<RawClaims, OidcError> {
    let (decoding_key, algorithm) = decoding_key_for(jwk)?;

    let mut validation = Validation::new(algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = std::collections::HashSet::new();

    let token_data = decode::<RawClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "gatehouse.auth.oidc", error = %e, "Token signature verification failed");
        OidcError::InvalidToken(GENERIC_INVALID.to_string())
    })?;

    Ok(token_data.claims)
}

/// Build a decoding key from a JWK, gated on key type and algorithm.
fn decoding_key_for(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), OidcError> {
    match jwk.kty.as_str() {
        "RSA" => {
            if let Some(alg) = &jwk.alg {
                if alg != "RS256" {
                    tracing::warn!(target: "gatehouse.auth.oidc", alg = %alg, "Unexpected RSA JWK algorithm");
                    return Err(OidcError::InvalidToken(GENERIC_INVALID.to_string()));
                }
            }

            let n = jwk.n.as_ref().ok_or_else(|| {
                tracing::error!(target: "gatehouse.auth.oidc", kid = %jwk.kid, "RSA JWK missing n member");
                OidcError::InvalidToken(GENERIC_INVALID.to_string())
            })?;
            let e = jwk.e.as_ref().ok_or_else(|| {
                tracing::error!(target: "gatehouse.auth.oidc", kid = %jwk.kid, "RSA JWK missing e member");
                OidcError::InvalidToken(GENERIC_INVALID.to_string())
            })?;

            let key = DecodingKey::from_rsa_components(n, e).map_err(|err| {
                tracing::error!(target: "gatehouse.auth.oidc", error = %err, "Invalid RSA JWK components");
                OidcError::InvalidToken(GENERIC_INVALID.to_string())
            })?;

            Ok((key, Algorithm::RS256))
        }
        "OKP" => {
            if let Some(alg) = &jwk.alg {
                if alg != "EdDSA" {
                    tracing::warn!(target: "gatehouse.auth.oidc", alg = %alg, "Unexpected OKP JWK algorithm");
                    return Err(OidcError::InvalidToken(GENERIC_INVALID.to_string()));
                }
            }

            let x = jwk.x.as_ref().ok_or_else(|| {
                tracing::error!(target: "gatehouse.auth.oidc", kid = %jwk.kid, "OKP JWK missing x member");
                OidcError::InvalidToken(GENERIC_INVALID.to_string())
            })?;

            let public_key_bytes = decode_jwk_member(x).map_err(|err| {
                tracing::error!(target: "gatehouse.auth.oidc", error = %err, "Invalid OKP public key encoding");
                OidcError::InvalidToken(GENERIC_INVALID.to_string())
            })?;

            Ok((DecodingKey::from_ed_der(&public_key_bytes), Algorithm::EdDSA))
        }
        other => {
            tracing::warn!(target: "gatehouse.auth.oidc", kty = %other, "Unsupported JWK key type");
            Err(OidcError::InvalidToken(GENERIC_INVALID.to_string()))
        }
    }
}
