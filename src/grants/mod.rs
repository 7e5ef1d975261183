//! Authorization grant records.
//!
//! A grant record binds an authorization code and the tokens issued for it
//! to a client and principal. Records are found by primary id or by any of
//! their populated secondary values (state, code, access token, refresh
//! token); each secondary value identifies at most one record.

mod hashed;
mod record;

pub use hashed::{hash_token_value, HashedGrantStore, HASH_PREFIX};
pub use record::{generate_opaque_value, GrantRecord, LookupKind, TokenKind};

use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence of grant records.
#[async_trait]
pub trait GrantRecordStore: Send + Sync {
    /// Insert or replace the record with `record.id`.
    ///
    /// Atomic per record: readers observe either the previous or the new
    /// version. Fails with [`AuthError::DuplicateLookupKey`] and changes
    /// nothing if a secondary value belongs to another record.
    async fn save(&self, record: &GrantRecord) -> Result<(), AuthError>;

    async fn find_by(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<GrantRecord>, AuthError>;

    /// Delete by primary id. Removing an absent record is not an error.
    async fn remove(&self, record: &GrantRecord) -> Result<(), AuthError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<GrantRecord>, AuthError> {
        self.find_by(LookupKind::Id, id).await
    }

    /// Find the record holding `value`.
    ///
    /// With a kind only that field is searched; without one the access
    /// token, refresh token, authorization code and state are tried in turn.
    async fn find_by_token(
        &self,
        value: &str,
        kind: Option<TokenKind>,
    ) -> Result<Option<GrantRecord>, AuthError> {
        if let Some(kind) = kind {
            return self.find_by(kind.lookup_kind(), value).await;
        }

        for kind in [
            LookupKind::AccessToken,
            LookupKind::RefreshToken,
            LookupKind::Code,
            LookupKind::State,
        ] {
            if let Some(record) = self.find_by(kind, value).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<T: GrantRecordStore + ?Sized> GrantRecordStore for Arc<T> {
    async fn save(&self, record: &GrantRecord) -> Result<(), AuthError> {
        (**self).save(record).await
    }

    async fn find_by(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<GrantRecord>, AuthError> {
        (**self).find_by(kind, value).await
    }

    async fn remove(&self, record: &GrantRecord) -> Result<(), AuthError> {
        (**self).remove(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_find_by_token_fallback_order() {
        let store = MemoryStore::new();
        let record = GrantRecord::authorization_request("c", "alice", "v-state")
            .with_access_token("v-access");
        store.save(&record).await.unwrap();

        for value in ["v-state", "v-access"] {
            let found = store.find_by_token(value, None).await.unwrap().unwrap();
            assert_eq!(found.id, record.id);
        }
        assert!(store.find_by_token("v-missing", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_token_with_kind() {
        let store = MemoryStore::new();
        let record = GrantRecord::new("c", "alice").with_refresh_token("v-refresh");
        store.save(&record).await.unwrap();

        assert!(store
            .find_by_token("v-refresh", Some(TokenKind::AccessToken))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_token("v-refresh", Some(TokenKind::RefreshToken))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_arc_dyn_store() {
        let store: Arc<dyn GrantRecordStore> = Arc::new(MemoryStore::new());
        let record = GrantRecord::new("c", "alice");
        store.save(&record).await.unwrap();
        assert!(store.find_by_id(&record.id).await.unwrap().is_some());
    }
}
