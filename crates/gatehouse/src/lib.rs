//! Gatehouse - request authentication/authorization gateway.
//!
//! Gatehouse sits in front of a workspace-scoped API and enforces the
//! layered per-request pipeline:
//!
//! ```text
//! admission control -> authentication -> workspace authorization -> handler
//! ```
//!
//! - Bearer tokens are validated against the identity provider's rotating
//!   JWKS (`auth::jwks`, `auth::oidc`).
//! - A privileged service-account token for backend administrative calls is
//!   cached process-wide with collapsed refreshes (`common::token_cache`).
//! - Workspace membership and role checks run per request against the
//!   directory collaborator (`middleware::workspace`, `services`).
//! - Admission control counts requests in fixed windows with pluggable
//!   stores and key strategies (`middleware::rate_limit`, `ratelimit`).
//!
//! # Modules
//!
//! - `config` - service configuration from environment
//! - `errors` - error taxonomy with HTTP status code mapping
//! - `auth` - key store, token validation, claims adapter
//! - `middleware` - the three pipeline stages
//! - `ratelimit` - counting stores and key strategies
//! - `services` - collaborator capabilities and the directory client
//! - `handlers` - HTTP request handlers
//! - `routes` - axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod ratelimit;
pub mod routes;
pub mod services;
