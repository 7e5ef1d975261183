//! Signing key lifecycle: load, generate, rotate, retire, prune.

use super::persistence::KeyDirectory;
use super::signing_key::{KeyStatus, PublicKey, SigningKey};
use crate::config::KeyStoreConfig;
use crate::error::AuthError;
use crate::metrics;
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Immutable view of the keys known at one point in time.
///
/// A set holds exactly one active key; retired keys are ordered newest first.
#[derive(Debug, Clone)]
pub struct KeySet {
    active: Arc<SigningKey>,
    retired: Vec<Arc<SigningKey>>,
}

impl KeySet {
    #[must_use]
    pub fn active(&self) -> &Arc<SigningKey> {
        &self.active
    }

    #[must_use]
    pub fn retired(&self) -> &[Arc<SigningKey>] {
        &self.retired
    }

    /// Look up a key by id, active or retired.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<(KeyStatus, &Arc<SigningKey>)> {
        if self.active.kid() == kid {
            return Some((KeyStatus::Active, &self.active));
        }
        self.retired
            .iter()
            .find(|k| k.kid() == kid)
            .map(|k| (KeyStatus::Retired, k))
    }

    /// Public portions of the active key followed by every retained key.
    #[must_use]
    pub fn public_keys(&self) -> Vec<PublicKey> {
        std::iter::once(self.active.public_key(KeyStatus::Active))
            .chain(self.retired.iter().map(|k| k.public_key(KeyStatus::Retired)))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.retired.len()
    }

    /// Always false: a set holds its active key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Durable store of RSA signing keys.
///
/// Readers take lock-free snapshots. Rotations are serialized and publish a
/// new snapshot only after the durable records are written.
pub struct KeyStore {
    directory: KeyDirectory,
    max_old: usize,
    rsa_bits: usize,
    current: ArcSwap<KeySet>,
    rotation: Mutex<()>,
}

impl KeyStore {
    /// Load the key set from disk, generating the first key if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the directory cannot be read or
    /// a stored key cannot be parsed. The process should not start.
    #[instrument(skip(config), fields(dir = %config.directory.display()))]
    pub async fn initialize(config: &KeyStoreConfig) -> Result<Self, AuthError> {
        let directory = KeyDirectory::new(&config.directory);
        directory.ensure_exists().await.map_err(|e| {
            AuthError::config(format!(
                "Failed to initialize key store at {}: {}",
                config.directory.display(),
                e
            ))
        })?;

        let active = match directory.load_active().await? {
            Some(key) => {
                info!(kid = %key.kid(), "loaded active signing key");
                key
            }
            None => {
                let key = generate(config.rsa_bits)
                    .await
                    .map_err(|e| AuthError::config(e.to_string()))?;
                directory.write_active(&key).await.map_err(|e| {
                    AuthError::config(format!("Failed to persist initial key: {}", e))
                })?;
                info!(kid = %key.kid(), "generated signing key");
                key
            }
        };

        let mut retired = directory.load_retired().await?;
        // Leftover from a rotation interrupted after the retired copy was written.
        retired.retain(|k| k.kid() != active.kid());
        retired.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        let mut seen = HashSet::new();
        retired.retain(|k| seen.insert(k.kid().to_string()));

        let mut retired: Vec<Arc<SigningKey>> = retired.into_iter().map(Arc::new).collect();
        let pruned = if retired.len() > config.max_old {
            retired.split_off(config.max_old)
        } else {
            Vec::new()
        };

        let store = Self {
            directory,
            max_old: config.max_old,
            rsa_bits: config.rsa_bits,
            current: ArcSwap::from_pointee(KeySet {
                active: Arc::new(active),
                retired,
            }),
            rotation: Mutex::new(()),
        };
        store.prune(&pruned).await;

        if config.rotate_on_start {
            store
                .rotate()
                .await
                .map_err(|e| AuthError::config(format!("Rotation on start failed: {}", e)))?;
        }

        Ok(store)
    }

    /// Replace the active key with a freshly generated one.
    ///
    /// The previous active key is retained for verification; retained keys
    /// beyond `max_old` are deleted. On failure nothing changes and the
    /// previous active key stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RotationFailure`] if generation or a durable write
    /// fails.
    #[instrument(skip(self))]
    pub async fn rotate(&self) -> Result<Arc<SigningKey>, AuthError> {
        let _guard = self.rotation.lock().await;
        let current = self.current.load_full();

        match self.rotate_locked(&current).await {
            Ok((next, pruned)) => {
                let active = Arc::clone(&next.active);
                self.current.store(Arc::new(next));
                self.prune(&pruned).await;

                metrics::record_key_rotation("success");
                info!(
                    previous_kid = %current.active.kid(),
                    kid = %active.kid(),
                    retained = self.max_old.min(current.len()),
                    "rotated signing key"
                );
                Ok(active)
            }
            Err(e) => {
                metrics::record_key_rotation("failure");
                error!(kid = %current.active.kid(), error = %e, "signing key rotation failed");
                Err(e)
            }
        }
    }

    /// Build the next key set and make it durable. Does not publish it.
    async fn rotate_locked(
        &self,
        current: &KeySet,
    ) -> Result<(KeySet, Vec<Arc<SigningKey>>), AuthError> {
        let next_active = generate(self.rsa_bits)
            .await
            .map_err(|e| AuthError::rotation(e.to_string()))?;

        let previous = &current.active;
        let keep_previous = self.max_old > 0;

        if keep_previous {
            self.directory.write_retired(previous).await.map_err(|e| {
                AuthError::rotation(format!("Failed to retire key {}: {}", previous.kid(), e))
            })?;
        }

        if let Err(e) = self.directory.write_active(&next_active).await {
            if keep_previous {
                if let Err(cleanup) = self.directory.remove_retired(previous).await {
                    warn!(kid = %previous.kid(), error = %cleanup, "could not remove retired copy");
                }
            }
            return Err(AuthError::rotation(format!(
                "Failed to persist new active key: {}",
                e
            )));
        }

        let mut retired: Vec<Arc<SigningKey>> = Vec::with_capacity(current.retired.len() + 1);
        retired.push(Arc::clone(previous));
        retired.extend(current.retired.iter().cloned());
        let pruned = retired.split_off(self.max_old.min(retired.len()));

        Ok((
            KeySet {
                active: Arc::new(next_active),
                retired,
            },
            pruned,
        ))
    }

    async fn prune(&self, keys: &[Arc<SigningKey>]) {
        for key in keys {
            match self.directory.remove_retired(key).await {
                Ok(()) => info!(kid = %key.kid(), "pruned retired signing key"),
                Err(e) => warn!(kid = %key.kid(), error = %e, "failed to delete retired key"),
            }
        }
    }

    /// The key new tokens are signed with.
    #[must_use]
    pub fn active_key(&self) -> Arc<SigningKey> {
        Arc::clone(&self.current.load().active)
    }

    /// Consistent view of the active and retained keys.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Public portions of the active key and every retained key.
    #[must_use]
    pub fn all_public_keys(&self) -> Vec<PublicKey> {
        self.current.load().public_keys()
    }

    #[must_use]
    pub fn max_old(&self) -> usize {
        self.max_old
    }

    #[must_use]
    pub fn directory(&self) -> &KeyDirectory {
        &self.directory
    }
}

async fn generate(bits: usize) -> Result<SigningKey, AuthError> {
    tokio::task::spawn_blocking(move || SigningKey::generate(bits))
        .await
        .map_err(|e| AuthError::signing(format!("Key generation task failed: {}", e)))?
}
