//! Directory service HTTP client.
//!
//! The directory is the internal backend that owns user accounts and
//! workspace membership. Gatehouse consumes it through the
//! [`UserResolver`] and [`WorkspaceAccessChecker`] capabilities and
//! authenticates with the cached admin token.
//!
//! # Wire contract
//!
//! - `POST /api/v1/users/resolve` with `{external_id, username, email}` →
//!   200 `{user_id}` | 404 (no account)
//! - `GET /api/v1/workspaces/{id}/members/{user_id}` →
//!   200 membership JSON | 204 (exists, not a member) | 404 (no workspace)
//! - `GET /api/v1/workspaces/{id}` → 200 | 404
//!
//! # Security
//!
//! - Requests carry the admin bearer token from the token cache
//! - A 401 invalidates the cached token (it was revoked server-side) and
//!   fails the call; the caller's fail-closed policy applies
//! - Timeouts prevent hanging connections; errors are logged server-side
//!   with generic messages surfaced

use crate::errors::GatewayError;
use crate::models::WorkspaceMembership;
use crate::services::{AccessError, ResolveError, UserResolver, WorkspaceAccessChecker};
use async_trait::async_trait;
use common::secret::ExposeSecret;
use common::token_cache::AdminTokenCache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, instrument, warn};
use uuid::Uuid;

/// Default timeout for directory requests in seconds.
const DIRECTORY_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Request body for identity resolution.
#[derive(Debug, Clone, Serialize)]
struct ResolveUserRequest<'a> {
    external_id: &'a str,
    username: &'a str,
    email: &'a str,
}

/// Response body for identity resolution.
#[derive(Debug, Clone, Deserialize)]
struct ResolveUserResponse {
    user_id: Uuid,
}

/// HTTP client for the internal directory service.
#[derive(Clone)]
pub struct DirectoryClient {
    /// HTTP client with configured timeouts.
    client: Client,

    /// Base URL of the directory API.
    base_url: String,

    /// Cached admin token for authenticating to the directory.
    admin_tokens: Arc<AdminTokenCache>,
}

impl DirectoryClient {
    /// Create a new directory client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        admin_tokens: Arc<AdminTokenCache>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DIRECTORY_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                error!(target: "gatehouse.services.directory", error = %e, "Failed to build HTTP client");
                GatewayError::Internal
            })?;

        Ok(Self {
            client,
            base_url,
            admin_tokens,
        })
    }

    /// Fetch the admin bearer token for a directory call.
    async fn bearer(&self) -> Result<String, String> {
        let token = self
            .admin_tokens
            .get_token()
            .await
            .map_err(|e| format!("Admin token unavailable: {e}"))?;
        Ok(format!("Bearer {}", token.expose_secret()))
    }

    /// Note a 401 from the directory: the cached admin token is no longer
    /// accepted, so force the next call to fetch a fresh one.
    async fn on_rejected_token(&self) {
        warn!(target: "gatehouse.services.directory", "Admin token rejected by directory, invalidating cache");
        self.admin_tokens.invalidate().await;
    }
}

#[async_trait]
impl UserResolver for DirectoryClient {
    #[instrument(skip_all)]
    async fn resolve_user(
        &self,
        external_id: &str,
        username: &str,
        email: &str,
    ) -> Result<Uuid, ResolveError> {
        let url = format!("{}/api/v1/users/resolve", self.base_url);
        let bearer = self.bearer().await.map_err(ResolveError::Backend)?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", bearer)
            .json(&ResolveUserRequest {
                external_id,
                username,
                email,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gatehouse.services.directory", error = %e, "Resolve request failed");
                ResolveError::Backend("Directory unavailable".to_string())
            })?;

        match response.status() {
            status if status.is_success() => {
                let body: ResolveUserResponse = response.json().await.map_err(|e| {
                    error!(target: "gatehouse.services.directory", error = %e, "Failed to parse resolve response");
                    ResolveError::Backend("Invalid directory response".to_string())
                })?;
                Ok(body.user_id)
            }
            StatusCode::NOT_FOUND => Err(ResolveError::NotFound),
            StatusCode::UNAUTHORIZED => {
                self.on_rejected_token().await;
                Err(ResolveError::Backend("Directory rejected credentials".to_string()))
            }
            status => {
                warn!(target: "gatehouse.services.directory", status = %status, "Unexpected resolve response");
                Err(ResolveError::Backend("Directory unavailable".to_string()))
            }
        }
    }
}

#[async_trait]
impl WorkspaceAccessChecker for DirectoryClient {
    #[instrument(skip(self), fields(workspace_id = %workspace_id))]
    async fn get_membership(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WorkspaceMembership>, AccessError> {
        let url = format!(
            "{}/api/v1/workspaces/{workspace_id}/members/{user_id}",
            self.base_url
        );
        let bearer = self.bearer().await.map_err(AccessError::Backend)?;

        let response = self
            .client
            .get(&url)
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gatehouse.services.directory", error = %e, "Membership request failed");
                AccessError::Backend("Directory unavailable".to_string())
            })?;

        match response.status() {
            status if status.is_success() && status != StatusCode::NO_CONTENT => {
                let membership: WorkspaceMembership = response.json().await.map_err(|e| {
                    error!(target: "gatehouse.services.directory", error = %e, "Failed to parse membership response");
                    AccessError::Backend("Invalid directory response".to_string())
                })?;
                Ok(Some(membership))
            }
            // Workspace exists but the user is not a member
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::NOT_FOUND => Err(AccessError::WorkspaceNotFound),
            StatusCode::UNAUTHORIZED => {
                self.on_rejected_token().await;
                Err(AccessError::Backend("Directory rejected credentials".to_string()))
            }
            status => {
                warn!(target: "gatehouse.services.directory", status = %status, "Unexpected membership response");
                Err(AccessError::Backend("Directory unavailable".to_string()))
            }
        }
    }

    #[instrument(skip(self), fields(workspace_id = %workspace_id))]
    async fn workspace_exists(&self, workspace_id: Uuid) -> Result<bool, AccessError> {
        let url = format!("{}/api/v1/workspaces/{workspace_id}", self.base_url);
        let bearer = self.bearer().await.map_err(AccessError::Backend)?;

        let response = self
            .client
            .get(&url)
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "gatehouse.services.directory", error = %e, "Workspace lookup failed");
                AccessError::Backend("Directory unavailable".to_string())
            })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED => {
                self.on_rejected_token().await;
                Err(AccessError::Backend("Directory rejected credentials".to_string()))
            }
            status => {
                warn!(target: "gatehouse.services.directory", status = %status, "Unexpected workspace response");
                Err(AccessError::Backend("Directory unavailable".to_string()))
            }
        }
    }
}
