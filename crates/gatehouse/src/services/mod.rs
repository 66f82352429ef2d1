//! Collaborator capabilities consumed by the authorization pipeline.
//!
//! The gateway does not own user accounts or workspace membership; it
//! consumes them through two narrow capabilities. The one concrete
//! implementation is [`DirectoryClient`], an HTTP client against the
//! internal directory service. Tests use [`mock::MockDirectory`].

pub mod directory;

pub use directory::DirectoryClient;

use crate::models::WorkspaceMembership;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors from identity resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No internal account exists for the external identity.
    #[error("User not found")]
    NotFound,

    /// The directory backend failed.
    #[error("Directory error: {0}")]
    Backend(String),
}

/// Errors from workspace membership lookups.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The workspace itself does not exist.
    #[error("Workspace not found")]
    WorkspaceNotFound,

    /// The membership backend failed.
    #[error("Membership store error: {0}")]
    Backend(String),
}

/// Maps an external identity to an internal user id.
#[async_trait]
pub trait UserResolver: Send + Sync {
    /// Resolve (external id, username, email) to an internal user id.
    async fn resolve_user(
        &self,
        external_id: &str,
        username: &str,
        email: &str,
    ) -> Result<Uuid, ResolveError>;
}

/// Reports workspace existence and membership.
#[async_trait]
pub trait WorkspaceAccessChecker: Send + Sync {
    /// Look up a user's membership in a workspace.
    ///
    /// `Ok(None)` means the workspace exists but the user is not a member;
    /// `Err(AccessError::WorkspaceNotFound)` means the workspace is absent.
    async fn get_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceMembership>, AccessError>;

    /// Whether the workspace exists at all (system-admin bypass check).
    async fn workspace_exists(&self, workspace_id: Uuid) -> Result<bool, AccessError>;
}

/// Mock directory for unit and integration tests.
pub mod mock {
    use super::{
        AccessError, ResolveError, UserResolver, WorkspaceAccessChecker, WorkspaceMembership,
    };
    use crate::models::WorkspaceRole;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// In-memory directory with configurable users, workspaces, and
    /// memberships, plus failure injection and call counters.
    #[derive(Default)]
    pub struct MockDirectory {
        users: HashMap<String, Uuid>,
        workspaces: HashMap<Uuid, String>,
        memberships: HashMap<(Uuid, Uuid), WorkspaceRole>,
        fail_memberships: bool,
        resolve_calls: AtomicUsize,
        membership_calls: AtomicUsize,
    }

    impl MockDirectory {
        /// Create an empty directory.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an external-id → internal-id mapping.
        #[must_use]
        pub fn with_user(mut self, external_id: &str, internal_id: Uuid) -> Self {
            self.users.insert(external_id.to_string(), internal_id);
            self
        }

        /// Register a workspace.
        #[must_use]
        pub fn with_workspace(mut self, workspace_id: Uuid, name: &str) -> Self {
            self.workspaces.insert(workspace_id, name.to_string());
            self
        }

        /// Register a membership (the workspace must also be registered).
        #[must_use]
        pub fn with_membership(
            mut self,
            workspace_id: Uuid,
            user_id: Uuid,
            role: WorkspaceRole,
        ) -> Self {
            self.memberships.insert((workspace_id, user_id), role);
            self
        }

        /// Make membership lookups fail with a backend error.
        #[must_use]
        pub fn failing_memberships(mut self) -> Self {
            self.fail_memberships = true;
            self
        }

        /// Number of resolve calls made.
        pub fn resolve_calls(&self) -> usize {
            self.resolve_calls.load(Ordering::SeqCst)
        }

        /// Number of membership lookups made.
        pub fn membership_calls(&self) -> usize {
            self.membership_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserResolver for MockDirectory {
        async fn resolve_user(
            &self,
            external_id: &str,
            _username: &str,
            _email: &str,
        ) -> Result<Uuid, ResolveError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            self.users
                .get(external_id)
                .copied()
                .ok_or(ResolveError::NotFound)
        }
    }

    #[async_trait]
    impl WorkspaceAccessChecker for MockDirectory {
        async fn get_membership(
            &self,
            workspace_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<WorkspaceMembership>, AccessError> {
            self.membership_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_memberships {
                return Err(AccessError::Backend("Mock membership failure".to_string()));
            }

            let Some(name) = self.workspaces.get(&workspace_id) else {
                return Err(AccessError::WorkspaceNotFound);
            };

            Ok(self
                .memberships
                .get(&(workspace_id, user_id))
                .map(|role| WorkspaceMembership {
                    workspace_id,
                    user_id,
                    role: *role,
                    workspace_name: name.clone(),
                }))
        }

        async fn workspace_exists(&self, workspace_id: Uuid) -> Result<bool, AccessError> {
            if self.fail_memberships {
                return Err(AccessError::Backend("Mock membership failure".to_string()));
            }
            Ok(self.workspaces.contains_key(&workspace_id))
        }
    }

}
