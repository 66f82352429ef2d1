//! Provider-agnostic claims and the request-scoped authentication context.
//!
//! `Claims` is the decoded, verified identity of the caller, produced once
//! per request by the claims adapter and immutable afterwards. `AuthContext`
//! is the explicit request-scoped struct carried in axum request extensions:
//! the authentication middleware constructs it, the workspace authorization
//! middleware extends it, handlers read it. Typed fields replace
//! stringly-keyed context lookups.
//!
//! The `external_user_id` and `email` fields identify a person and are
//! redacted in Debug output to prevent exposure in logs.

use crate::models::WorkspaceRole;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Verified identity claims, independent of any identity provider.
///
/// Invariant: `external_user_id` is never empty after a successful
/// validation; the validator rejects subject-less tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Internal user id, resolved after validation (None until resolution).
    pub internal_user_id: Option<Uuid>,

    /// Provider-side subject identifier - redacted in Debug output.
    pub external_user_id: String,

    /// Preferred username.
    pub username: String,

    /// Email address - redacted in Debug output.
    pub email: String,

    /// Provider roles granted to this identity.
    pub roles: Vec<String>,

    /// Provider groups this identity belongs to.
    pub groups: Vec<String>,

    /// Whether the role set intersects the configured admin-role set.
    pub is_system_admin: bool,

    /// Issued-at timestamp (Unix epoch seconds).
    pub issued_at: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub expires_at: i64,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("internal_user_id", &self.internal_user_id)
            .field("external_user_id", &"[REDACTED]")
            .field("username", &self.username)
            .field("email", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("groups", &self.groups)
            .field("is_system_admin", &self.is_system_admin)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Claims {
    /// Check whether the identity carries a specific provider role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Workspace portion of the request context, attached by the workspace
/// authorization middleware after the membership check passes.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    /// The workspace addressed by the request path.
    pub workspace_id: Uuid,

    /// Workspace name (empty for the system-admin existence-only bypass).
    pub workspace_name: String,

    /// The caller's role in this workspace (synthetic Admin for the
    /// system-admin bypass).
    pub role: WorkspaceRole,
}

/// Request-scoped authentication context.
///
/// Constructed once by the authentication middleware and extended (not
/// mutated in place) by the workspace authorization middleware.
#[derive(Clone)]
pub struct AuthContext {
    /// Unique id for this request, for log correlation.
    pub request_id: Uuid,

    /// Internal user id, if resolution ran.
    pub internal_user_id: Option<Uuid>,

    /// Provider-side subject identifier - redacted in Debug output.
    pub external_user_id: String,

    /// Preferred username.
    pub username: String,

    /// Email address - redacted in Debug output.
    pub email: String,

    /// Provider roles.
    pub roles: Vec<String>,

    /// Provider groups.
    pub groups: Vec<String>,

    /// System-admin flag computed by the claims adapter.
    pub is_system_admin: bool,

    /// Workspace context, present after workspace authorization.
    pub workspace: Option<WorkspaceContext>,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("request_id", &self.request_id)
            .field("internal_user_id", &self.internal_user_id)
            .field("external_user_id", &"[REDACTED]")
            .field("username", &self.username)
            .field("email", &"[REDACTED]")
            .field("roles", &self.roles)
            .field("groups", &self.groups)
            .field("is_system_admin", &self.is_system_admin)
            .field("workspace", &self.workspace)
            .finish()
    }
}

impl AuthContext {
    /// Build a fresh context from verified claims.
    #[must_use]
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            internal_user_id: claims.internal_user_id,
            external_user_id: claims.external_user_id.clone(),
            username: claims.username.clone(),
            email: claims.email.clone(),
            roles: claims.roles.clone(),
            groups: claims.groups.clone(),
            is_system_admin: claims.is_system_admin,
            workspace: None,
        }
    }

    /// The fixed development identity injected by the mock-session shortcut.
    ///
    /// Only reachable when the non-production flag is enabled; carries no
    /// roles and no admin privilege.
    #[must_use]
    pub fn mock_dev_identity() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            internal_user_id: Some(Uuid::nil()),
            external_user_id: "mock-session".to_string(),
            username: "dev".to_string(),
            email: "dev@localhost".to_string(),
            roles: Vec::new(),
            groups: Vec::new(),
            is_system_admin: false,
            workspace: None,
        }
    }

    /// Return a copy of this context extended with workspace information.
    #[must_use]
    pub fn with_workspace(mut self, workspace: WorkspaceContext) -> Self {
        self.workspace = Some(workspace);
        self
    }
}
