//! Grant store that keeps only digests of credential values.
//!
//! Wraps another [`GrantRecordStore`]: authorization codes, access tokens
//! and refresh tokens are replaced by their SHA-256 digest before saving,
//! and lookups by those fields hash the presented value first. A leaked
//! store therefore contains no usable credentials. Records read back carry
//! the digests, not the original values.

use super::record::{GrantRecord, LookupKind};
use super::GrantRecordStore;
use crate::error::AuthError;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

/// Marks a stored value as a digest.
pub const HASH_PREFIX: &str = "sha256:";

/// SHA-256 digest of a token value, base64url without padding, prefixed
/// with [`HASH_PREFIX`].
#[must_use]
pub fn hash_token_value(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    format!("{}{}", HASH_PREFIX, URL_SAFE_NO_PAD.encode(digest))
}

// Records read back from the store already carry digests; re-saving them
// must not hash twice. Presented values are never treated this way.
fn stored_value(value: &str) -> String {
    if value.starts_with(HASH_PREFIX) {
        value.to_string()
    } else {
        hash_token_value(value)
    }
}

/// Store decorator that hashes credential values.
pub struct HashedGrantStore<S> {
    inner: S,
}

impl<S: GrantRecordStore> HashedGrantStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn hashed(record: &GrantRecord) -> GrantRecord {
    let mut record = record.clone();
    for kind in LookupKind::SECONDARY.into_iter().filter(LookupKind::is_credential) {
        if let Some(value) = record.lookup_value_mut(kind) {
            *value = stored_value(value);
        }
    }
    record
}

#[async_trait]
impl<S: GrantRecordStore> GrantRecordStore for HashedGrantStore<S> {
    async fn save(&self, record: &GrantRecord) -> Result<(), AuthError> {
        self.inner.save(&hashed(record)).await
    }

    async fn find_by(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<GrantRecord>, AuthError> {
        if kind.is_credential() {
            self.inner.find_by(kind, &hash_token_value(value)).await
        } else {
            self.inner.find_by(kind, value).await
        }
    }

    async fn remove(&self, record: &GrantRecord) -> Result<(), AuthError> {
        self.inner.remove(record).await
    }
}
