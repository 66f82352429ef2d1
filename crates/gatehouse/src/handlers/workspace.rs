//! Workspace context handler.
//!
//! The demo consumer of the full pipeline: admission → authentication →
//! workspace authorization. Returns the workspace context attached by the
//! workspace middleware.

use crate::auth::claims::AuthContext;
use crate::errors::GatewayError;
use crate::models::WorkspaceRole;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

/// Response for the `GET /v1/workspaces/{workspace_id}` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceResponse {
    /// Workspace identifier.
    pub workspace_id: Uuid,

    /// Workspace name (empty under the system-admin bypass).
    pub workspace_name: String,

    /// The caller's role in this workspace.
    pub role: WorkspaceRole,
}

/// Handler for `GET /v1/workspaces/{workspace_id}`.
///
/// Requires both the authentication and workspace authorization
/// middlewares; a missing workspace context is a wiring bug.
#[instrument(skip_all, name = "gatehouse.handlers.workspace")]
pub async fn get_workspace(
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<WorkspaceResponse>, GatewayError> {
    let workspace = ctx.workspace.ok_or_else(|| {
        tracing::error!(
            target: "gatehouse.handlers.workspace",
            "Workspace handler reached without workspace context"
        );
        GatewayError::Internal
    })?;

    Ok(Json(WorkspaceResponse {
        workspace_id: workspace.workspace_id,
        workspace_name: workspace.workspace_name,
        role: workspace.role,
    }))
}
