//! Authorization server core.
//!
//! Manages the RSA signing key lifecycle, issues and verifies PS256 access
//! tokens, publishes the key set as JWKS, and persists grant records,
//! registered clients and consents.

#![forbid(unsafe_code)]

pub mod admin;
pub mod clients;
pub mod config;
pub mod consent;
pub mod error;
pub mod grants;
pub mod jwks;
pub mod jwt;
pub mod keys;
pub mod metrics;
pub mod storage;
pub mod telemetry;

// Re-exports for convenience
pub use config::Config;
pub use error::{AuthError, Rejection, VerificationError};
