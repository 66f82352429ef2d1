//! Data models for the Gatehouse gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of a user within a workspace.
///
/// The role set is closed: anything outside `{owner, admin, member}` fails
/// to parse, and role checks reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    /// Workspace creator; full control including ownership transfer.
    Owner,
    /// Administrative member; full control except ownership transfer.
    Admin,
    /// Regular member.
    Member,
}

impl WorkspaceRole {
    /// Owner and Admin both satisfy administrative checks.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, WorkspaceRole::Owner | WorkspaceRole::Admin)
    }

    /// Only Owner satisfies ownership checks.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        matches!(self, WorkspaceRole::Owner)
    }

    /// Canonical lowercase name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::Owner => "owner",
            WorkspaceRole::Admin => "admin",
            WorkspaceRole::Member => "member",
        }
    }
}

impl fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown workspace role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for WorkspaceRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(WorkspaceRole::Owner),
            "admin" => Ok(WorkspaceRole::Admin),
            "member" => Ok(WorkspaceRole::Member),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A user's membership in a workspace, as reported by the membership
/// collaborator. Looked up per request; never cached by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMembership {
    /// Workspace identifier.
    pub workspace_id: Uuid,

    /// Internal user identifier.
    pub user_id: Uuid,

    /// The user's role in this workspace.
    pub role: WorkspaceRole,

    /// Human-readable workspace name.
    pub workspace_name: String,
}

/// Response payload for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status ("healthy" / "degraded").
    pub status: String,

    /// Number of signing keys currently cached from the provider JWKS.
    pub signing_keys: usize,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("owner".parse::<WorkspaceRole>().unwrap(), WorkspaceRole::Owner);
        assert_eq!("admin".parse::<WorkspaceRole>().unwrap(), WorkspaceRole::Admin);
        assert_eq!("member".parse::<WorkspaceRole>().unwrap(), WorkspaceRole::Member);
    }

    #[test]
    fn test_role_parsing_rejects_unknown() {
        assert!("superuser".parse::<WorkspaceRole>().is_err());
        assert!("OWNER".parse::<WorkspaceRole>().is_err());
        assert!("".parse::<WorkspaceRole>().is_err());
    }

    #[test]
    fn test_role_ordering_predicates() {
        assert!(WorkspaceRole::Owner.is_admin());
        assert!(WorkspaceRole::Admin.is_admin());
        assert!(!WorkspaceRole::Member.is_admin());

        assert!(WorkspaceRole::Owner.is_owner());
        assert!(!WorkspaceRole::Admin.is_owner());
        assert!(!WorkspaceRole::Member.is_owner());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&WorkspaceRole::Owner).unwrap(), "\"owner\"");
        assert_eq!(serde_json::to_string(&WorkspaceRole::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&WorkspaceRole::Member).unwrap(), "\"member\"");
    }

    #[test]
    fn test_membership_deserialization() {
        let json = r#"{
            "workspace_id": "7b1c9b74-9d61-4b1e-8f6c-0a4b6f8b7c5d",
            "user_id": "f1b0a6cf-3f1e-41a0-9c3b-0e2d6b3b3f90",
            "role": "admin",
            "workspace_name": "Platform Team"
        }"#;

        let membership: WorkspaceMembership = serde_json::from_str(json).unwrap();
        assert_eq!(membership.role, WorkspaceRole::Admin);
        assert_eq!(membership.workspace_name, "Platform Team");
    }
}
