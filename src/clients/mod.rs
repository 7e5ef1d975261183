//! Registered OAuth2 clients.

use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const PUBLIC_CLIENT_ID: &str = "public-client";
pub const SERVICE_CLIENT_ID: &str = "service-client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

/// A client allowed to request tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub id: String,
    pub client_id: String,
    /// Hash of the client secret; `None` for public clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_hash: Option<String>,
    pub auth_methods: BTreeSet<ClientAuthMethod>,
    pub grant_types: BTreeSet<GrantType>,
    pub redirect_uris: BTreeSet<String>,
    pub scopes: BTreeSet<String>,
    #[serde(with = "duration_secs")]
    pub access_token_ttl: Duration,
    #[serde(with = "duration_secs")]
    pub refresh_token_ttl: Duration,
    pub reuse_refresh_tokens: bool,
    #[serde(default)]
    pub require_consent: bool,
    #[serde(default)]
    pub require_proof_key: bool,
}

impl RegisteredClient {
    /// New client with a random primary id and default token lifetimes
    /// (access 15 minutes, refresh 30 days).
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            client_secret_hash: None,
            auth_methods: BTreeSet::new(),
            grant_types: BTreeSet::new(),
            redirect_uris: BTreeSet::new(),
            scopes: BTreeSet::new(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            reuse_refresh_tokens: true,
            require_consent: false,
            require_proof_key: false,
        }
    }

    #[must_use]
    pub fn with_secret_hash(mut self, hash: impl Into<String>) -> Self {
        self.client_secret_hash = Some(hash.into());
        self
    }

    #[must_use]
    pub fn with_auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_methods.insert(method);
        self
    }

    #[must_use]
    pub fn with_grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_types.insert(grant_type);
        self
    }

    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uris.insert(uri.into());
        self
    }

    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_reuse_refresh_tokens(mut self, reuse: bool) -> Self {
        self.reuse_refresh_tokens = reuse;
        self
    }

    #[must_use]
    pub fn allows_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Exact match against the registered redirect URIs.
    #[must_use]
    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.contains(uri)
    }

    #[must_use]
    pub fn allows_scopes<'a>(&self, requested: impl IntoIterator<Item = &'a str>) -> bool {
        requested.into_iter().all(|s| self.scopes.contains(s))
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.client_secret_hash.is_none()
    }
}

/// Persistence of registered clients.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Insert or replace by `id`. Fails with
    /// [`AuthError::DuplicateClientId`] if another record owns the client id.
    async fn save(&self, client: &RegisteredClient) -> Result<(), AuthError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RegisteredClient>, AuthError>;

    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, AuthError>;
}

#[async_trait]
impl<T: ClientRegistry + ?Sized> ClientRegistry for Arc<T> {
    async fn save(&self, client: &RegisteredClient) -> Result<(), AuthError> {
        (**self).save(client).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RegisteredClient>, AuthError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, AuthError> {
        (**self).find_by_client_id(client_id).await
    }
}

/// Register the built-in clients if they are missing.
///
/// `public-client` uses the authorization code flow with proof key and
/// consent; `service-client` uses client credentials with the given secret
/// hash. Returns the client ids that were created.
pub async fn seed_default_clients<R: ClientRegistry + ?Sized>(
    registry: &R,
    service_secret_hash: &str,
) -> Result<Vec<String>, AuthError> {
    let mut seeded = Vec::new();

    if registry.find_by_client_id(PUBLIC_CLIENT_ID).await?.is_none() {
        let mut client = RegisteredClient::new(PUBLIC_CLIENT_ID)
            .with_auth_method(ClientAuthMethod::None)
            .with_grant_type(GrantType::AuthorizationCode)
            .with_grant_type(GrantType::RefreshToken)
            .with_redirect_uri("http://127.0.0.1:8081/callback")
            .with_scopes(["openid", "read"])
            .with_reuse_refresh_tokens(false);
        client.require_consent = true;
        client.require_proof_key = true;

        registry.save(&client).await?;
        seeded.push(client.client_id);
    }

    if registry.find_by_client_id(SERVICE_CLIENT_ID).await?.is_none() {
        let client = RegisteredClient::new(SERVICE_CLIENT_ID)
            .with_secret_hash(service_secret_hash)
            .with_auth_method(ClientAuthMethod::ClientSecretBasic)
            .with_grant_type(GrantType::ClientCredentials)
            .with_scopes(["read", "write"]);

        registry.save(&client).await?;
        seeded.push(client.client_id);
    }

    for client_id in &seeded {
        info!(client_id = %client_id, "seeded client");
    }
    Ok(seeded)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_client_helpers() {
        let client = RegisteredClient::new("app")
            .with_grant_type(GrantType::AuthorizationCode)
            .with_redirect_uri("http://127.0.0.1:8081/callback")
            .with_scopes(["openid", "read"]);

        assert!(client.allows_grant_type(GrantType::AuthorizationCode));
        assert!(!client.allows_grant_type(GrantType::ClientCredentials));
        assert!(client.allows_redirect_uri("http://127.0.0.1:8081/callback"));
        assert!(!client.allows_redirect_uri("http://127.0.0.1:8081/callback/evil"));
        assert!(client.allows_scopes(["read"]));
        assert!(client.allows_scopes([]));
        assert!(!client.allows_scopes(["read", "write"]));
        assert!(client.is_public());
        assert_eq!(client.access_token_ttl, Duration::from_secs(900));
    }

    #[test]
    fn test_serialized_ttl_in_seconds() {
        let client = RegisteredClient::new("app");
        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json["access_token_ttl"], 900);

        let back: RegisteredClient = serde_json::from_value(json).unwrap();
        assert_eq!(back, client);
    }

    #[tokio::test]
    async fn test_seed_default_clients_once() {
        let registry = MemoryStore::new();

        let seeded = seed_default_clients(&registry, "$2a$10$hash").await.unwrap();
        assert_eq!(seeded, vec![PUBLIC_CLIENT_ID, SERVICE_CLIENT_ID]);

        let public = registry.find_by_client_id(PUBLIC_CLIENT_ID).await.unwrap().unwrap();
        assert!(public.is_public());
        assert!(!public.reuse_refresh_tokens);
        assert!(public.require_proof_key);

        let service = registry.find_by_client_id(SERVICE_CLIENT_ID).await.unwrap().unwrap();
        assert_eq!(service.client_secret_hash.as_deref(), Some("$2a$10$hash"));
        assert!(service.allows_grant_type(GrantType::ClientCredentials));

        let again = seed_default_clients(&registry, "$2a$10$hash").await.unwrap();
        assert!(again.is_empty());
    }
}
