//! Storage backends for grants, clients and consents.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::clients::ClientRegistry;
use crate::config::{StorageBackend, StorageConfig};
use crate::consent::ConsentStore;
use crate::error::AuthError;
use crate::grants::{GrantRecordStore, HashedGrantStore};
use crate::metrics;
use std::sync::Arc;
use tracing::info;

/// The three stores, sharing one backend.
#[derive(Clone)]
pub struct Storage {
    pub grants: Arc<dyn GrantRecordStore>,
    pub clients: Arc<dyn ClientRegistry>,
    pub consents: Arc<dyn ConsentStore>,
}

impl Storage {
    /// Open the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the backend cannot be reached.
    pub async fn connect(config: &StorageConfig) -> Result<Self, AuthError> {
        let storage = match &config.backend {
            StorageBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                Self::from_backend(store, config.hash_token_values)
            }
            StorageBackend::Redis { url } => {
                let store = Arc::new(RedisStore::connect(url, &config.namespace).await?);
                Self::from_backend(store, config.hash_token_values)
            }
        };

        let backend = match config.backend {
            StorageBackend::Memory => "memory",
            StorageBackend::Redis { .. } => "redis",
        };
        info!(
            backend,
            hash_token_values = config.hash_token_values,
            "storage ready"
        );
        Ok(storage)
    }

    fn from_backend<B>(backend: Arc<B>, hash_token_values: bool) -> Self
    where
        B: GrantRecordStore + ClientRegistry + ConsentStore + 'static,
    {
        let grants: Arc<dyn GrantRecordStore> = if hash_token_values {
            Arc::new(HashedGrantStore::new(Arc::clone(&backend)))
        } else {
            Arc::clone(&backend) as Arc<dyn GrantRecordStore>
        };

        Self {
            grants,
            clients: Arc::clone(&backend) as Arc<dyn ClientRegistry>,
            consents: backend,
        }
    }
}

/// Count a grant store operation by outcome.
pub(crate) fn observe<T>(operation: &str, result: Result<T, AuthError>) -> Result<T, AuthError> {
    let status = match &result {
        Ok(_) => "ok",
        Err(AuthError::DuplicateLookupKey { .. }) => "duplicate",
        Err(_) => "error",
    };
    metrics::record_grant_operation(operation, status);
    result
}

#[cfg(test)]
mod tests {
    use super::Storage;
    use crate::config::StorageConfig;
    use crate::grants::{GrantRecord, GrantRecordStore, LookupKind};

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = Storage::connect(&StorageConfig::default()).await.unwrap();

        let record = GrantRecord::new("public-client", "alice").with_access_token("at");
        storage.grants.save(&record).await.unwrap();

        let found = storage.grants.find_by(LookupKind::AccessToken, "at").await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(record.id));
    }

    #[tokio::test]
    async fn test_hashed_memory_storage() {
        let config = StorageConfig {
            hash_token_values: true,
            ..StorageConfig::default()
        };
        let storage = Storage::connect(&config).await.unwrap();

        let record = GrantRecord::new("public-client", "alice").with_access_token("at");
        storage.grants.save(&record).await.unwrap();

        let found = storage
            .grants
            .find_by(LookupKind::AccessToken, "at")
            .await
            .unwrap()
            .unwrap();
        assert_ne!(found.access_token_value.as_deref(), Some("at"));
    }
}
