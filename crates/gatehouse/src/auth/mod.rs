//! Authentication components: JWKS key store, OIDC token validation, and
//! the provider-agnostic claims adapter.

pub mod adapter;
pub mod claims;
pub mod jwks;
pub mod oidc;

pub use adapter::{OidcAdapter, TokenValidator, DEFAULT_ADMIN_ROLES};
pub use claims::{AuthContext, Claims, WorkspaceContext};
pub use jwks::{Jwk, JwksKeyStore};
pub use oidc::{OidcClaims, OidcError, OidcValidator};
