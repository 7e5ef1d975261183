//! Signing key management.
//!
//! Keys are RSA key pairs persisted one record per key. Exactly one key is
//! active for signing; a bounded number of retired keys remain available
//! for verifying tokens issued before a rotation.

mod persistence;
mod signing_key;
mod store;

pub use persistence::KeyDirectory;
pub use signing_key::{KeyStatus, PublicKey, PublicMaterial, SigningAlgorithm, SigningKey};
pub use store::{KeySet, KeyStore};
