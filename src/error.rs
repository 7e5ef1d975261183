//! Error types for key management, token handling and grant storage.

use crate::grants::LookupKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Key rotation failed: {0}")]
    RotationFailure(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Duplicate {kind} lookup value")]
    DuplicateLookupKey { kind: LookupKind },

    #[error("Client id already registered: {0}")]
    DuplicateClientId(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn config(msg: impl Into<String>) -> Self {
        AuthError::Configuration(msg.into())
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        AuthError::Signing(msg.into())
    }

    pub fn rotation(msg: impl Into<String>) -> Self {
        AuthError::RotationFailure(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        AuthError::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AuthError::Internal(msg.into())
    }

    /// Stable code reported to callers and used as a metrics label.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => AUTH_CONFIGURATION_ERROR,
            AuthError::Signing(_) => AUTH_SIGNING_ERROR,
            AuthError::RotationFailure(_) => AUTH_ROTATION_FAILED,
            AuthError::Verification(_) => AUTH_INVALID_TOKEN,
            AuthError::DuplicateLookupKey { .. } => AUTH_DUPLICATE_LOOKUP_KEY,
            AuthError::DuplicateClientId(_) => AUTH_DUPLICATE_CLIENT_ID,
            AuthError::Forbidden(_) => AUTH_FORBIDDEN,
            AuthError::Storage(_) => AUTH_STORAGE_ERROR,
            AuthError::Internal(_) => AUTH_INTERNAL_ERROR,
        }
    }

    /// Whether the operation can be retried without operator intervention.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::RotationFailure(_) | AuthError::Verification(_) | AuthError::Storage(_)
        )
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Internal(format!("Serialization failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::Signing(err.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

/// Reasons a presented token is not accepted.
///
/// These never leave the verifying process as-is; see [`Rejection`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Token malformed: {0}")]
    Malformed(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Unknown signing key: {kid}")]
    UnknownKey { kid: String },

    #[error("Bad signature")]
    BadSignature,

    #[error("Token expired at {expired_at}")]
    Expired { expired_at: i64 },

    #[error("Token not valid before {valid_from}")]
    NotYetValid { valid_from: i64 },

    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    #[error("Invalid audience")]
    InvalidAudience,
}

impl VerificationError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::Malformed(_) => "malformed",
            VerificationError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            VerificationError::UnknownKey { .. } => "unknown_key",
            VerificationError::BadSignature => "bad_signature",
            VerificationError::Expired { .. } => "expired",
            VerificationError::NotYetValid { .. } => "not_yet_valid",
            VerificationError::InvalidIssuer(_) => "invalid_issuer",
            VerificationError::InvalidAudience => "invalid_audience",
        }
    }
}

/// Generic authentication rejection handed to callers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid token")]
pub struct Rejection;

impl Rejection {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        AUTH_INVALID_TOKEN
    }
}

impl From<VerificationError> for Rejection {
    fn from(_: VerificationError) -> Self {
        Rejection
    }
}

// Error codes for API responses
pub const AUTH_CONFIGURATION_ERROR: &str = "AUTH_CONFIGURATION_ERROR";
pub const AUTH_SIGNING_ERROR: &str = "AUTH_SIGNING_ERROR";
pub const AUTH_ROTATION_FAILED: &str = "AUTH_ROTATION_FAILED";
pub const AUTH_INVALID_TOKEN: &str = "invalid_token";
pub const AUTH_DUPLICATE_LOOKUP_KEY: &str = "AUTH_DUPLICATE_LOOKUP_KEY";
pub const AUTH_DUPLICATE_CLIENT_ID: &str = "AUTH_DUPLICATE_CLIENT_ID";
pub const AUTH_FORBIDDEN: &str = "AUTH_FORBIDDEN";
pub const AUTH_STORAGE_ERROR: &str = "AUTH_STORAGE_ERROR";
pub const AUTH_INTERNAL_ERROR: &str = "AUTH_INTERNAL_ERROR";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_hides_reason() {
        let errors = [
            VerificationError::UnknownKey { kid: "k1".to_string() },
            VerificationError::BadSignature,
            VerificationError::Expired { expired_at: 0 },
            VerificationError::InvalidIssuer("evil".to_string()),
            VerificationError::InvalidAudience,
        ];

        for err in errors {
            let rejection = Rejection::from(err);
            assert_eq!(rejection.to_string(), "invalid token");
            assert_eq!(rejection.code(), "invalid_token");
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::signing("no key").code(), AUTH_SIGNING_ERROR);
        assert_eq!(AuthError::rotation("io").code(), AUTH_ROTATION_FAILED);
        assert_eq!(
            AuthError::DuplicateLookupKey { kind: LookupKind::AccessToken }.code(),
            AUTH_DUPLICATE_LOOKUP_KEY
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(AuthError::rotation("disk full").is_recoverable());
        assert!(AuthError::from(VerificationError::BadSignature).is_recoverable());
        assert!(!AuthError::config("missing").is_recoverable());
        assert!(!AuthError::signing("no active key").is_recoverable());
    }

    #[test]
    fn test_duplicate_lookup_display_omits_value() {
        let err = AuthError::DuplicateLookupKey { kind: LookupKind::RefreshToken };
        assert_eq!(err.to_string(), "Duplicate refresh_token lookup value");
    }
}
