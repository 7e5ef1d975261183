//! On-disk layout of signing keys.
//!
//! The active key always lives in `active.json`. Every retained key lives in
//! `retired-<created_at_millis>-<kid>.json`. Files are replaced through a
//! temporary sibling and a rename so a reader never sees a partial record.

use super::signing_key::{SigningKey, StoredKey};
use crate::error::AuthError;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub(crate) const ACTIVE_FILE: &str = "active.json";
pub(crate) const RETIRED_PREFIX: &str = "retired-";
const RECORD_SUFFIX: &str = ".json";

/// Directory holding the durable key records.
#[derive(Debug, Clone)]
pub struct KeyDirectory {
    root: PathBuf,
}

impl KeyDirectory {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }

    pub(crate) fn retired_path(&self, key: &SigningKey) -> PathBuf {
        self.root.join(format!(
            "{}{:013}-{}{}",
            RETIRED_PREFIX,
            key.created_at().timestamp_millis(),
            key.kid(),
            RECORD_SUFFIX
        ))
    }

    pub(crate) async fn ensure_exists(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Load `active.json` if present.
    pub(crate) async fn load_active(&self) -> Result<Option<SigningKey>, AuthError> {
        let path = self.active_path();
        match fs::read(&path).await {
            Ok(bytes) => read_record(&path, &bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::config(format!(
                "Cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Load every retired record in the directory, in no particular order.
    pub(crate) async fn load_retired(&self) -> Result<Vec<SigningKey>, AuthError> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| {
            AuthError::config(format!("Cannot list {}: {}", self.root.display(), e))
        })?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AuthError::config(format!("Cannot list {}: {}", self.root.display(), e)))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(RETIRED_PREFIX) || !name.ends_with(RECORD_SUFFIX) {
                continue;
            }

            let path = entry.path();
            let bytes = fs::read(&path).await.map_err(|e| {
                AuthError::config(format!("Cannot read {}: {}", path.display(), e))
            })?;
            keys.push(read_record(&path, &bytes)?);
        }

        Ok(keys)
    }

    pub(crate) async fn write_active(&self, key: &SigningKey) -> io::Result<()> {
        self.write_record(&self.active_path(), key).await
    }

    pub(crate) async fn write_retired(&self, key: &SigningKey) -> io::Result<PathBuf> {
        let path = self.retired_path(key);
        self.write_record(&path, key).await?;
        Ok(path)
    }

    /// Delete the record of a retired key. Missing files are not an error.
    pub(crate) async fn remove_retired(&self, key: &SigningKey) -> io::Result<()> {
        match fs::remove_file(self.retired_path(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn write_record(&self, path: &Path, key: &SigningKey) -> io::Result<()> {
        let stored = key.to_stored();
        let bytes = serde_json::to_vec_pretty(&stored)?;
        self.write_atomic(path, &bytes).await
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "record path has no name"))?;
        let tmp = self
            .root
            .join(format!(".{}.tmp", file_name.to_string_lossy()));

        let result = async {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options.open(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);

            fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        self.sync_directory().await;
        Ok(())
    }

    async fn sync_directory(&self) {
        #[cfg(unix)]
        {
            let synced = match fs::File::open(&self.root).await {
                Ok(dir) => dir.sync_all().await,
                Err(e) => Err(e),
            };
            if let Err(e) = synced {
                debug!(dir = %self.root.display(), error = %e, "directory fsync skipped");
            }
        }
    }
}

fn read_record(path: &Path, bytes: &[u8]) -> Result<SigningKey, AuthError> {
    let stored: StoredKey = serde_json::from_slice(bytes).map_err(|e| {
        warn!(path = %path.display(), "unparsable key record");
        AuthError::config(format!("Cannot parse {}: {}", path.display(), e))
    })?;
    SigningKey::from_stored(&stored)
}
