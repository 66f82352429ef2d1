//! Claims adapter: decouples the authentication pipeline from the identity
//! provider.
//!
//! The middleware only sees the [`TokenValidator`] capability and the
//! generic [`Claims`]/[`AuthError`] types. `OidcAdapter` is the concrete
//! implementation: it delegates to the OIDC validator, converts provider
//! claims into the generic shape, computes the system-admin flag, and maps
//! provider errors onto the generic taxonomy without discarding diagnostic
//! detail.

use crate::auth::claims::Claims;
use crate::auth::oidc::{OidcClaims, OidcError, OidcValidator};
use crate::errors::AuthError;
use async_trait::async_trait;
use tracing::instrument;

/// Roles that mark an identity as a system admin, unless overridden.
pub const DEFAULT_ADMIN_ROLES: &[&str] = &["admin", "system_admin"];

/// Pluggable identity verification.
///
/// The authentication middleware depends on this capability only; concrete
/// providers implement it without the pipeline knowing their identity.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a bearer token and produce generic claims.
    async fn validate_token(&self, token: &str) -> Result<Claims, AuthError>;
}

/// Adapter from the OIDC validator to the generic `TokenValidator`
/// capability.
pub struct OidcAdapter {
    validator: OidcValidator,
    admin_roles: Vec<String>,
}

impl OidcAdapter {
    /// Wrap an OIDC validator with the default admin-role set.
    #[must_use]
    pub fn new(validator: OidcValidator) -> Self {
        Self {
            validator,
            admin_roles: DEFAULT_ADMIN_ROLES.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    /// Override the role set that classifies an identity as system admin.
    #[must_use]
    pub fn with_admin_roles(mut self, roles: Vec<String>) -> Self {
        self.admin_roles = roles;
        self
    }

    /// Convert provider claims into the generic shape.
    ///
    /// `is_system_admin` is true when the role set intersects the configured
    /// admin-role set.
    fn to_claims(&self, oidc: OidcClaims) -> Claims {
        let is_system_admin = oidc
            .roles
            .iter()
            .any(|role| self.admin_roles.contains(role));

        Claims {
            internal_user_id: None,
            external_user_id: oidc.sub,
            username: oidc.preferred_username.unwrap_or_default(),
            email: oidc.email.unwrap_or_default(),
            roles: oidc.roles,
            groups: oidc.groups,
            is_system_admin,
            issued_at: oidc.iat,
            expires_at: oidc.exp,
        }
    }

    /// Map provider errors onto the generic taxonomy.
    ///
    /// Variants without a generic counterpart are wrapped, not discarded,
    /// so diagnostic information survives the adapter boundary.
    fn map_error(&self, err: OidcError) -> AuthError {
        match err {
            OidcError::InvalidToken(reason) => AuthError::InvalidToken(reason),
            OidcError::TokenExpired { claims } => AuthError::TokenExpired {
                claims: claims.map(|c| Box::new(self.to_claims(*c))),
            },
            OidcError::InvalidIssuer => AuthError::InvalidIssuer,
            OidcError::InvalidAudience => AuthError::InvalidAudience,
            OidcError::MissingSubject => AuthError::MissingSubject,
            OidcError::KeyFetch(reason) => AuthError::KeyFetch(reason),
        }
    }

    /// Release resources held by the underlying provider client.
    pub fn close(&self) {
        self.validator.close();
    }
}

#[async_trait]
impl TokenValidator for OidcAdapter {
    #[instrument(skip_all, name = "gatehouse.auth.adapter")]
    async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        match self.validator.validate(token).await {
            Ok(claims) => Ok(self.to_claims(claims)),
            Err(err) => Err(self.map_error(err)),
        }
    }
}
