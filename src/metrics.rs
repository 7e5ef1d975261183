//! Prometheus metrics.
//!
//! Provides counters for issuance, verification, key rotation and grant
//! storage.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, CounterVec};

/// Tokens issued counter.
pub static TOKENS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "algoverse_auth_tokens_issued_total",
        "Total number of tokens issued",
        &["algorithm"]
    )
    .expect("Failed to register tokens_issued metric")
});

/// Token verifications counter.
pub static TOKEN_VERIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "algoverse_auth_token_verifications_total",
        "Total number of token verifications",
        &["outcome"]
    )
    .expect("Failed to register token_verifications metric")
});

/// Key rotations counter.
pub static KEY_ROTATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "algoverse_auth_key_rotations_total",
        "Total number of signing key rotations",
        &["status"]
    )
    .expect("Failed to register key_rotations metric")
});

/// Grant store operations counter.
pub static GRANT_STORE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "algoverse_auth_grant_store_operations_total",
        "Total number of grant record store operations",
        &["operation", "status"]
    )
    .expect("Failed to register grant_store_operations metric")
});

/// Record a token issuance.
pub fn record_token_issued(algorithm: &str) {
    TOKENS_ISSUED.with_label_values(&[algorithm]).inc();
}

/// Record a verification outcome (`valid` or a rejection kind).
pub fn record_verification(outcome: &str) {
    TOKEN_VERIFICATIONS.with_label_values(&[outcome]).inc();
}

/// Record a key rotation attempt.
pub fn record_key_rotation(status: &str) {
    KEY_ROTATIONS.with_label_values(&[status]).inc();
}

/// Record a grant store operation.
pub fn record_grant_operation(operation: &str, status: &str) {
    GRANT_STORE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_token_issued() {
        record_token_issued("PS256");
        let value = TOKENS_ISSUED.with_label_values(&["PS256"]).get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_record_key_rotation() {
        record_key_rotation("failure");
        let value = KEY_ROTATIONS.with_label_values(&["failure"]).get();
        assert!(value > 0.0);
    }

    #[test]
    fn test_record_grant_operation() {
        record_grant_operation("save", "ok");
        let value = GRANT_STORE_OPERATIONS
            .with_label_values(&["save", "ok"])
            .get();
        assert!(value > 0.0);
    }
}
