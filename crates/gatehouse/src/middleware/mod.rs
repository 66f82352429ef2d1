//! Request middleware for the Gatehouse pipeline.
//!
//! Applied in order: admission control (rate limiting) → authentication →
//! workspace authorization. Each stage may short-circuit with a structured
//! failure; later stages consume the context the earlier ones attach.

pub mod auth;
pub mod rate_limit;
pub mod workspace;

pub use auth::{require_auth, AuthOptions, AuthState};
pub use rate_limit::{enforce_rate_limit, RateLimitOptions, RateLimitState};
pub use workspace::{require_workspace, WorkspaceAuthOptions, WorkspaceAuthState};
