//! HTTP routes for the Gatehouse gateway.
//!
//! Assembles the axum router and the middleware pipeline: admission control
//! (optional) wraps everything, authentication guards the protected routes,
//! and workspace authorization guards the workspace-scoped routes.

use crate::auth::{JwksKeyStore, TokenValidator};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{
    enforce_rate_limit, require_auth, require_workspace, AuthOptions, AuthState,
    RateLimitOptions, RateLimitState, WorkspaceAuthOptions, WorkspaceAuthState,
};
use crate::ratelimit::RateLimitStore;
use crate::services::{UserResolver, WorkspaceAccessChecker};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// JWKS key store (exposed for the health endpoint and shutdown).
    pub key_store: Arc<JwksKeyStore>,

    /// Token validation capability (the claims adapter).
    pub validator: Arc<dyn TokenValidator>,

    /// Identity resolution collaborator.
    pub resolver: Option<Arc<dyn UserResolver>>,

    /// Workspace membership collaborator.
    pub workspace_access: Arc<dyn WorkspaceAccessChecker>,

    /// Rate-limit counting store.
    pub rate_limit_store: Arc<dyn RateLimitStore>,
}

/// Build the application routes.
///
/// - `/v1/health` - public health check
/// - `/v1/me` - authenticated identity echo
/// - `/v1/workspaces/{workspace_id}` - full pipeline demo route
///
/// Layer order (outermost first): TraceLayer → TimeoutLayer → admission
/// control → authentication → workspace authorization → handler.
pub fn build_routes(state: Arc<AppState>) -> Router {
    let auth_state = Arc::new(AuthState {
        validator: state.validator.clone(),
        resolver: state.resolver.clone(),
        options: AuthOptions {
            skip_paths: state.config.skip_paths.clone(),
            allow_expired_paths: state.config.allow_expired_paths.clone(),
            session_cookie_name: state.config.session_cookie_name.clone(),
            dev_mode: state.config.dev_mode,
            mock_session_token: state.config.mock_session_token.clone(),
        },
    });

    let workspace_state = Arc::new(WorkspaceAuthState {
        access: state.workspace_access.clone(),
        options: WorkspaceAuthOptions {
            param: state.config.workspace_param.clone(),
            required_roles: state.config.required_roles.clone(),
            admin_bypass: state.config.admin_bypass,
        },
    });

    let rate_limit_state = Arc::new(RateLimitState {
        store: state.rate_limit_store.clone(),
        options: RateLimitOptions {
            limit: state.config.rate_limit,
            burst: state.config.rate_limit_burst,
            window: Duration::from_secs(state.config.rate_limit_window_seconds),
            strategy: state.config.rate_limit_strategy,
        },
    });

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .with_state(state.clone());

    // Authenticated routes
    let me_routes = Router::new()
        .route("/v1/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    // Workspace-scoped routes: authentication, then workspace authorization
    // (route_layer added last runs first)
    let workspace_path = format!("/v1/workspaces/:{}", state.config.workspace_param);
    let workspace_routes = Router::new()
        .route(&workspace_path, get(handlers::get_workspace))
        .route_layer(middleware::from_fn_with_state(
            workspace_state,
            require_workspace,
        ))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    let mut router = public_routes.merge(me_routes).merge(workspace_routes);

    // Admission control wraps the whole router so subject strategies can
    // still fall back to IP before authentication has run
    if state.config.rate_limit_enabled {
        router = router.layer(middleware::from_fn_with_state(
            rate_limit_state,
            enforce_rate_limit,
        ));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
