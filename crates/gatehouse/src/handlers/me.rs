//! Current user handler.
//!
//! Returns the authenticated identity from the request context.

use crate::auth::claims::AuthContext;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

/// Response for the `/v1/me` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    /// Internal user id (present after identity resolution).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Preferred username.
    pub username: String,

    /// Email address.
    pub email: String,

    /// Provider roles.
    pub roles: Vec<String>,

    /// Provider groups.
    pub groups: Vec<String>,

    /// Whether the caller is a system admin.
    pub is_system_admin: bool,
}

/// Handler for `GET /v1/me`.
///
/// Requires the authentication middleware; the context it attaches is the
/// response.
#[instrument(skip_all, name = "gatehouse.handlers.me")]
pub async fn get_me(Extension(ctx): Extension<AuthContext>) -> Json<MeResponse> {
    tracing::debug!(target: "gatehouse.handlers.me", request_id = %ctx.request_id, "Returning authenticated identity");

    Json(MeResponse {
        user_id: ctx.internal_user_id,
        username: ctx.username,
        email: ctx.email,
        roles: ctx.roles,
        groups: ctx.groups,
        is_system_admin: ctx.is_system_admin,
    })
}
