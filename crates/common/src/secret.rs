//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with Gatehouse-specific
//! guidance. Use these types for all sensitive values like client secrets,
//! service-account passwords, bearer tokens, and cached access tokens.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` while holding a secret gets safe logging behavior
//! for free. Accessing the real value requires an explicit `expose_secret()`
//! call, which keeps every use of a secret visible at the call site.
//!
//! # Memory Safety
//!
//! Secrets are zeroized when dropped, preventing sensitive data from lingering
//! in memory after use.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct ServiceAccount {
//!     client_id: String,
//!     client_secret: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let account = ServiceAccount {
//!     client_id: "gatehouse-admin".to_string(),
//!     client_secret: SecretString::from("hunter2"),
//! };
//!
//! // This is safe - the secret is redacted
//! println!("{:?}", account);
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let secret: &str = account.client_secret.expose_secret();
//! ```
//!
//! # Gatehouse Usage Guidelines
//!
//! Use `SecretString` for:
//! - OAuth client secrets
//! - Service-account passwords
//! - Bearer tokens (incoming and cached)
//! - API keys
//!
//! Use `SecretBox<T>` for:
//! - Custom secret types (e.g., `SecretBox<[u8]>` for binary keys)

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
