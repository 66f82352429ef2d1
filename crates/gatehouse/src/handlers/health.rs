//! Health check handler.

use crate::errors::GatewayError;
use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler.
///
/// Reports the service status and the number of provider signing keys
/// currently cached. A gateway with zero keys cannot validate any token
/// and reports itself degraded, but still answers so orchestration probes
/// see the response.
#[instrument(skip_all, name = "gatehouse.health.check")]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, GatewayError> {
    let signing_keys = state.key_store.key_count().await;

    let status = if signing_keys > 0 { "healthy" } else { "degraded" };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        signing_keys,
    }))
}
