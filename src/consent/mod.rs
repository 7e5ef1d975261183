//! Scopes a principal has approved for a client.

use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One row per (client, principal) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub client_id: String,
    pub principal_name: String,
    pub granted_scopes: BTreeSet<String>,
}

impl ConsentRecord {
    pub fn new(client_id: impl Into<String>, principal_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            principal_name: principal_name.into(),
            granted_scopes: BTreeSet::new(),
        }
    }

    /// Add scopes to the approved set.
    pub fn grant_scopes<I, S>(&mut self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_scopes.extend(scopes.into_iter().map(Into::into));
    }

    /// Whether every requested scope was approved.
    #[must_use]
    pub fn covers<'a>(&self, requested: impl IntoIterator<Item = &'a str>) -> bool {
        requested.into_iter().all(|s| self.granted_scopes.contains(s))
    }
}

/// Persistence of consent records.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    /// Insert or replace the record for its (client, principal) pair.
    async fn save(&self, consent: &ConsentRecord) -> Result<(), AuthError>;

    async fn find_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<Option<ConsentRecord>, AuthError>;

    /// Deleting an absent record is not an error.
    async fn delete_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<(), AuthError>;
}

#[async_trait]
impl<T: ConsentStore + ?Sized> ConsentStore for Arc<T> {
    async fn save(&self, consent: &ConsentRecord) -> Result<(), AuthError> {
        (**self).save(consent).await
    }

    async fn find_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<Option<ConsentRecord>, AuthError> {
        (**self)
            .find_by_client_and_principal(client_id, principal_name)
            .await
    }

    async fn delete_by_client_and_principal(
        &self,
        client_id: &str,
        principal_name: &str,
    ) -> Result<(), AuthError> {
        (**self)
            .delete_by_client_and_principal(client_id, principal_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_cover() {
        let mut consent = ConsentRecord::new("public-client", "alice");
        assert!(!consent.covers(["read"]));

        consent.grant_scopes(["read"]);
        consent.grant_scopes(["openid", "read"]);

        assert_eq!(consent.granted_scopes.len(), 2);
        assert!(consent.covers(["read", "openid"]));
        assert!(!consent.covers(["write"]));
    }
}
