//! Gatehouse
//!
//! Entry point for the authentication/authorization gateway. Wires the JWKS
//! key store, the OIDC claims adapter, the admin token cache, the directory
//! collaborators, and the rate-limit store into the request pipeline.

use common::token_cache::{AdminTokenCache, AdminTokenConfig};
use gatehouse::auth::{JwksKeyStore, OidcAdapter, OidcValidator};
use gatehouse::config::Config;
use gatehouse::ratelimit::{MemoryRateLimitStore, RateLimitStore, RedisRateLimitStore};
use gatehouse::routes::{self, AppState};
use gatehouse::services::DirectoryClient;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gatehouse");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer_url = %config.issuer_url,
        jwt_leeway_seconds = config.jwt_leeway_seconds,
        jwks_refresh_seconds = config.jwks_refresh_seconds,
        "Configuration loaded successfully"
    );

    // Key store: fails fast when the provider JWKS is unreachable or empty
    info!("Fetching provider signing keys...");
    let key_store = JwksKeyStore::connect(
        config.jwks_url.clone(),
        Duration::from_secs(config.jwks_refresh_seconds),
    )
    .await
    .map_err(|e| {
        error!("Failed to fetch initial JWKS: {}", e);
        e
    })?;

    info!(signing_keys = key_store.key_count().await, "Signing keys loaded");

    // Token validation pipeline: validator behind the claims adapter
    #[allow(clippy::cast_sign_loss)]
    let leeway = Duration::from_secs(config.jwt_leeway_seconds as u64);
    let validator = OidcValidator::new(
        Arc::clone(&key_store),
        config.issuer_url.clone(),
        config.audience.clone(),
        leeway,
    );
    let adapter = Arc::new(
        OidcAdapter::new(validator).with_admin_roles(config.system_admin_roles.clone()),
    );

    // Admin token cache for backend administrative calls
    let mut token_config =
        AdminTokenConfig::new(config.token_url.clone(), config.admin_client_id.clone())
            .with_refresh_buffer(Duration::from_secs(config.admin_refresh_buffer_seconds));
    if let Some(secret) = &config.admin_client_secret {
        token_config = token_config.with_client_secret(secret.clone());
    } else if let (Some(username), Some(password)) =
        (&config.admin_username, &config.admin_password)
    {
        token_config = token_config.with_password_grant(username.clone(), password.clone());
    }
    let admin_tokens = Arc::new(AdminTokenCache::new(token_config).map_err(|e| {
        error!("Failed to configure admin token cache: {}", e);
        e
    })?);

    // Directory collaborators (identity resolution + workspace membership)
    let directory = DirectoryClient::new(config.directory_url.clone(), Arc::clone(&admin_tokens))?;

    // Rate-limit store: Redis when configured, in-memory otherwise
    let rate_limit_store: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(redis_url) => {
            info!("Connecting to Redis rate-limit store...");
            Arc::new(RedisRateLimitStore::connect(redis_url).await.map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?)
        }
        None => {
            info!("Using in-memory rate-limit store");
            Arc::new(MemoryRateLimitStore::new())
        }
    };

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();

    // Create application state
    let state = Arc::new(AppState {
        config,
        key_store: Arc::clone(&key_store),
        validator: adapter,
        resolver: Some(Arc::new(directory.clone())),
        workspace_access: Arc::new(directory),
        rate_limit_store,
    });

    // Build application routes
    let app = routes::build_routes(state);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Gatehouse listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the background JWKS refresh before exiting
    key_store.close();

    info!("Gatehouse shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    // Graceful shutdown drain period
    let drain_secs: u64 = std::env::var("GATEHOUSE_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (GATEHOUSE_DRAIN_SECONDS=0)");
    }
}
