//! Token minting with the active signing key.

use crate::clients::RegisteredClient;
use crate::config::JwtConfig;
use crate::error::AuthError;
use crate::jwt::builder::ClaimsBuilder;
use crate::jwt::claims::Claims;
use crate::keys::KeyStore;
use crate::metrics;
use jsonwebtoken::{encode, Header};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-token overrides of the configured claim defaults.
#[derive(Debug, Clone, Default)]
pub struct ClaimsTemplate {
    audience: Option<BTreeSet<String>>,
    issued_at: Option<i64>,
}

impl ClaimsTemplate {
    /// Replace the configured audience.
    #[must_use]
    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audience = Some(audience.into_iter().map(Into::into).collect());
        self
    }

    /// Fix the issuance time (seconds since the epoch).
    #[must_use]
    pub fn with_issued_at(mut self, timestamp: i64) -> Self {
        self.issued_at = Some(timestamp);
        self
    }
}

/// Signs claim sets with the key store's active key.
pub struct TokenIssuer {
    keys: Arc<KeyStore>,
    config: JwtConfig,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyStore>, config: JwtConfig) -> Self {
        Self { keys, config }
    }

    /// Build and sign a token for `principal`.
    ///
    /// Issuer and audience come from configuration unless the template
    /// overrides the audience. The resulting token is not persisted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if the claims are incomplete or the
    /// token cannot be signed.
    pub fn issue<S, R>(
        &self,
        template: &ClaimsTemplate,
        principal: &str,
        scopes: S,
        roles: R,
        ttl: Duration,
    ) -> Result<String, AuthError>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let audience = template
            .audience
            .clone()
            .unwrap_or_else(|| BTreeSet::from([self.config.audience.clone()]));

        let mut builder = ClaimsBuilder::new(&self.config.issuer)
            .subject(principal)
            .audience(audience)
            .ttl(ttl)
            .scopes(scopes)
            .roles(roles);
        if let Some(issued_at) = template.issued_at {
            builder = builder.issued_at(issued_at);
        }

        self.sign(&builder.build()?)
    }

    /// Issue an access token on behalf of a registered client, using the
    /// client's access token lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if a requested scope is not
    /// registered for the client.
    pub fn issue_access_token(
        &self,
        client: &RegisteredClient,
        principal: &str,
        scopes: &[String],
        roles: &[String],
    ) -> Result<String, AuthError> {
        if !client.allows_scopes(scopes.iter().map(String::as_str)) {
            return Err(AuthError::Forbidden(format!(
                "Scope not registered for client {}",
                client.client_id
            )));
        }

        self.issue(
            &ClaimsTemplate::default(),
            principal,
            scopes.iter().cloned(),
            roles,
            client.access_token_ttl,
        )
    }

    /// Sign an already built claim set.
    ///
    /// The header names the algorithm and key id of the active key.
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = self.keys.active_key();

        let mut header = Header::new(key.algorithm().jwt_algorithm());
        header.kid = Some(key.kid().to_string());

        let token = encode(&header, claims, key.encoding_key())
            .map_err(|e| AuthError::signing(format!("Failed to sign token: {}", e)))?;

        metrics::record_token_issued(key.algorithm().as_str());
        debug!(kid = %key.kid(), sub = %claims.sub, jti = %claims.jti, "issued token");
        Ok(token)
    }

    #[must_use]
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyStoreConfig;
    use jsonwebtoken::{decode_header, Algorithm};

    async fn issuer() -> (tempfile::TempDir, TokenIssuer) {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyStore::initialize(&KeyStoreConfig::default().with_directory(dir.path()))
            .await
            .unwrap();
        (dir, TokenIssuer::new(Arc::new(keys), JwtConfig::default()))
    }

    #[tokio::test]
    async fn test_header_carries_alg_and_kid() {
        let (_dir, issuer) = issuer().await;
        let token = issuer
            .issue(
                &ClaimsTemplate::default(),
                "alice",
                ["read"],
                ["ROLE_USER"],
                Duration::from_secs(60),
            )
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::PS256);
        assert_eq!(header.kid.as_deref(), Some(issuer.keys.active_key().kid()));
        assert_eq!(token.split('.').count(), 3);
    }

    #[tokio::test]
    async fn test_issue_access_token_rejects_unregistered_scope() {
        let (_dir, issuer) = issuer().await;
        let client = RegisteredClient::new("public-client").with_scopes(["read"]);

        let result = issuer.issue_access_token(
            &client,
            "alice",
            &["write".to_string()],
            &[],
        );
        assert!(matches!(result, Err(AuthError::Forbidden(_))));

        let token = issuer
            .issue_access_token(&client, "alice", &["read".to_string()], &[])
            .unwrap();
        assert!(!token.is_empty());
    }
}
