//! Gatehouse configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use crate::models::WorkspaceRole;
use crate::ratelimit::KeyStrategy;
use common::jwt::{DEFAULT_LEEWAY, MAX_LEEWAY};
use common::secret::SecretString;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use thiserror::Error;

/// Default rate limit in requests per window.
pub const DEFAULT_RATE_LIMIT: i64 = 100;

/// Default burst allowance above the limit.
pub const DEFAULT_RATE_LIMIT_BURST: i64 = 10;

/// Default rate-limit window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

/// Default JWKS refresh interval in seconds.
pub const DEFAULT_JWKS_REFRESH_SECONDS: u64 = 300;

/// Default admin-token refresh buffer in seconds.
pub const DEFAULT_ADMIN_REFRESH_BUFFER_SECONDS: u64 = 30;

/// Default path set that bypasses authentication.
pub const DEFAULT_SKIP_PATHS: &[&str] = &["/v1/health"];

/// Gatehouse configuration.
///
/// Loaded from environment variables with sensible defaults. Credentials
/// and credential-bearing URLs are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Identity provider issuer URL; must equal the token `iss` claim.
    pub issuer_url: String,

    /// JWKS endpoint URL (default: `{issuer}/.well-known/jwks.json`).
    pub jwks_url: String,

    /// Expected token audience; unset skips the audience check.
    pub audience: Option<String>,

    /// Leeway in seconds for expiry and issued-at validation.
    pub jwt_leeway_seconds: i64,

    /// JWKS background refresh interval in seconds.
    pub jwks_refresh_seconds: u64,

    /// Identity provider token endpoint (admin token acquisition).
    pub token_url: String,

    /// Admin service-account client id.
    pub admin_client_id: String,

    /// Admin client secret; set selects the client-credentials grant.
    pub admin_client_secret: Option<SecretString>,

    /// Admin username (password grant).
    pub admin_username: Option<String>,

    /// Admin password (password grant).
    pub admin_password: Option<SecretString>,

    /// Treat the cached admin token as stale this many seconds before
    /// expiry.
    pub admin_refresh_buffer_seconds: u64,

    /// Paths that bypass authentication (exact match).
    pub skip_paths: HashSet<String>,

    /// Paths that accept an expired token (exact match).
    pub allow_expired_paths: HashSet<String>,

    /// Session cookie consulted when no Authorization header is present.
    pub session_cookie_name: Option<String>,

    /// Non-production flag gating the mock-session shortcut.
    pub dev_mode: bool,

    /// Development mock-session sentinel value.
    pub mock_session_token: Option<String>,

    /// Name of the path parameter carrying the workspace id.
    pub workspace_param: String,

    /// Roles accepted on workspace routes; empty accepts any member.
    pub required_roles: Vec<WorkspaceRole>,

    /// Whether system admins bypass the workspace membership check.
    pub admin_bypass: bool,

    /// Provider roles that classify an identity as system admin.
    pub system_admin_roles: Vec<String>,

    /// Whether admission control is applied at all.
    pub rate_limit_enabled: bool,

    /// Requests allowed per window.
    pub rate_limit: i64,

    /// Extra requests tolerated above the limit.
    pub rate_limit_burst: i64,

    /// Rate-limit window in seconds.
    pub rate_limit_window_seconds: u64,

    /// Rate-limit key derivation strategy.
    pub rate_limit_strategy: KeyStrategy,

    /// Redis URL for the shared counter store; unset uses the in-memory
    /// store.
    pub redis_url: Option<String>,

    /// Base URL of the internal directory service.
    pub directory_url: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("issuer_url", &self.issuer_url)
            .field("jwks_url", &self.jwks_url)
            .field("audience", &self.audience)
            .field("jwt_leeway_seconds", &self.jwt_leeway_seconds)
            .field("jwks_refresh_seconds", &self.jwks_refresh_seconds)
            .field("token_url", &self.token_url)
            .field("admin_client_id", &self.admin_client_id)
            .field(
                "admin_client_secret",
                &self.admin_client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_username", &self.admin_username)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "admin_refresh_buffer_seconds",
                &self.admin_refresh_buffer_seconds,
            )
            .field("skip_paths", &self.skip_paths)
            .field("allow_expired_paths", &self.allow_expired_paths)
            .field("session_cookie_name", &self.session_cookie_name)
            .field("dev_mode", &self.dev_mode)
            .field(
                "mock_session_token",
                &self.mock_session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("workspace_param", &self.workspace_param)
            .field("required_roles", &self.required_roles)
            .field("admin_bypass", &self.admin_bypass)
            .field("system_admin_roles", &self.system_admin_roles)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field(
                "rate_limit_window_seconds",
                &self.rate_limit_window_seconds,
            )
            .field("rate_limit_strategy", &self.rate_limit_strategy)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("directory_url", &self.directory_url)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT leeway configuration: {0}")]
    InvalidJwtLeeway(String),

    #[error("Invalid JWKS refresh configuration: {0}")]
    InvalidJwksRefresh(String),

    #[error("Invalid admin credentials configuration: {0}")]
    InvalidAdminCredentials(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid workspace role configuration: {0}")]
    InvalidWorkspaceRoles(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer_url = vars
            .get("OIDC_ISSUER_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("OIDC_ISSUER_URL".to_string()))?
            .clone();

        let directory_url = vars
            .get("DIRECTORY_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DIRECTORY_URL".to_string()))?
            .clone();

        let token_url = vars
            .get("OIDC_TOKEN_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("OIDC_TOKEN_URL".to_string()))?
            .clone();

        let admin_client_id = vars
            .get("ADMIN_CLIENT_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("ADMIN_CLIENT_ID".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let jwks_url = vars.get("OIDC_JWKS_URL").cloned().unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", issuer_url.trim_end_matches('/'))
        });

        let audience = vars.get("OIDC_AUDIENCE").cloned().filter(|v| !v.is_empty());

        // Parse JWT leeway with validation
        let jwt_leeway_seconds = if let Some(value_str) = vars.get("JWT_LEEWAY_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must be positive, got {value}"
                )));
            }

            #[allow(clippy::cast_possible_wrap)]
            let max_leeway = MAX_LEEWAY.as_secs() as i64;
            if value > max_leeway {
                return Err(ConfigError::InvalidJwtLeeway(format!(
                    "JWT_LEEWAY_SECONDS must not exceed {max_leeway} seconds, got {value}"
                )));
            }

            value
        } else {
            #[allow(clippy::cast_possible_wrap)]
            let default = DEFAULT_LEEWAY.as_secs() as i64;
            default
        };

        // Parse JWKS refresh interval with validation
        let jwks_refresh_seconds = if let Some(value_str) = vars.get("JWKS_REFRESH_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwksRefresh(format!(
                    "JWKS_REFRESH_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwksRefresh(
                    "JWKS_REFRESH_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_JWKS_REFRESH_SECONDS
        };

        // Admin credentials: a client secret selects the client-credentials
        // grant; otherwise both username and password are required
        let admin_client_secret = vars
            .get("ADMIN_CLIENT_SECRET")
            .cloned()
            .filter(|v| !v.is_empty())
            .map(SecretString::from);
        let admin_username = vars
            .get("ADMIN_USERNAME")
            .cloned()
            .filter(|v| !v.is_empty());
        let admin_password = vars
            .get("ADMIN_PASSWORD")
            .cloned()
            .filter(|v| !v.is_empty())
            .map(SecretString::from);

        if admin_client_secret.is_none() && (admin_username.is_none() || admin_password.is_none()) {
            return Err(ConfigError::InvalidAdminCredentials(
                "set ADMIN_CLIENT_SECRET, or both ADMIN_USERNAME and ADMIN_PASSWORD".to_string(),
            ));
        }

        let admin_refresh_buffer_seconds = vars
            .get("ADMIN_TOKEN_REFRESH_BUFFER_SECONDS")
            .map(|value_str| {
                value_str.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidAdminCredentials(format!(
                        "ADMIN_TOKEN_REFRESH_BUFFER_SECONDS must be a valid integer, got '{value_str}': {e}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_ADMIN_REFRESH_BUFFER_SECONDS);

        let skip_paths = vars
            .get("AUTH_SKIP_PATHS")
            .map(|value| parse_path_set(value))
            .unwrap_or_else(|| {
                DEFAULT_SKIP_PATHS.iter().map(|p| (*p).to_string()).collect()
            });

        let allow_expired_paths = vars
            .get("AUTH_ALLOW_EXPIRED_PATHS")
            .map(|value| parse_path_set(value))
            .unwrap_or_default();

        let session_cookie_name = vars
            .get("SESSION_COOKIE_NAME")
            .cloned()
            .filter(|v| !v.is_empty());

        let dev_mode = parse_bool(vars.get("DEV_MODE"), false);

        let mock_session_token = vars
            .get("DEV_MOCK_SESSION_TOKEN")
            .cloned()
            .filter(|v| !v.is_empty());

        let workspace_param = vars
            .get("WORKSPACE_PARAM")
            .cloned()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "workspace_id".to_string());

        let required_roles = vars
            .get("WORKSPACE_REQUIRED_ROLES")
            .map(|value| parse_role_list(value))
            .transpose()?
            .unwrap_or_default();

        let admin_bypass = parse_bool(vars.get("WORKSPACE_ADMIN_BYPASS"), true);

        let system_admin_roles = vars
            .get("SYSTEM_ADMIN_ROLES")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| {
                crate::auth::DEFAULT_ADMIN_ROLES
                    .iter()
                    .map(|r| (*r).to_string())
                    .collect()
            });

        let rate_limit_enabled = parse_bool(vars.get("RATE_LIMIT_ENABLED"), true);

        // Parse rate limit with validation
        let rate_limit = if let Some(value_str) = vars.get("RATE_LIMIT_RPM") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_RPM must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "RATE_LIMIT_RPM must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_RATE_LIMIT
        };

        let rate_limit_burst = if let Some(value_str) = vars.get("RATE_LIMIT_BURST") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_BURST must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "RATE_LIMIT_BURST must not be negative".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_RATE_LIMIT_BURST
        };

        let rate_limit_window_seconds =
            if let Some(value_str) = vars.get("RATE_LIMIT_WINDOW_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidRateLimit(format!(
                        "RATE_LIMIT_WINDOW_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidRateLimit(
                        "RATE_LIMIT_WINDOW_SECONDS must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_RATE_LIMIT_WINDOW_SECONDS
            };

        let rate_limit_strategy = vars
            .get("RATE_LIMIT_STRATEGY")
            .map(|value| {
                value.parse::<KeyStrategy>().map_err(|e| {
                    ConfigError::InvalidRateLimit(format!("RATE_LIMIT_STRATEGY: {e}"))
                })
            })
            .transpose()?
            .unwrap_or(KeyStrategy::Ip);

        let redis_url = vars.get("REDIS_URL").cloned().filter(|v| !v.is_empty());

        Ok(Config {
            bind_address,
            issuer_url,
            jwks_url,
            audience,
            jwt_leeway_seconds,
            jwks_refresh_seconds,
            token_url,
            admin_client_id,
            admin_client_secret,
            admin_username,
            admin_password,
            admin_refresh_buffer_seconds,
            skip_paths,
            allow_expired_paths,
            session_cookie_name,
            dev_mode,
            mock_session_token,
            workspace_param,
            required_roles,
            admin_bypass,
            system_admin_roles,
            rate_limit_enabled,
            rate_limit,
            rate_limit_burst,
            rate_limit_window_seconds,
            rate_limit_strategy,
            redis_url,
            directory_url,
        })
    }
}

/// Parse a comma-separated path list into an exact-match set.
fn parse_path_set(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated role list; unknown roles are a configuration
/// error, not a silent skip.
fn parse_role_list(value: &str) -> Result<Vec<WorkspaceRole>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            r.parse::<WorkspaceRole>()
                .map_err(|e| ConfigError::InvalidWorkspaceRoles(e.to_string()))
        })
        .collect()
}

/// Parse a boolean flag ("true"/"1" are true, "false"/"0" are false).
fn parse_bool(value: Option<&String>, default: bool) -> bool {
    match value.map(String::as_str) {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
