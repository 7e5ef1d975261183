//! Administrative key rotation.

use crate::error::AuthError;
use crate::jwt::TokenVerifier;
use crate::keys::KeyStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Role required to rotate signing keys.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Outcome of a successful rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationReport {
    pub rotated_by: String,
    pub active_kid: String,
}

/// Rotation trigger restricted to administrators.
pub struct KeyAdmin {
    keys: Arc<KeyStore>,
    verifier: Arc<TokenVerifier>,
}

impl KeyAdmin {
    pub fn new(keys: Arc<KeyStore>, verifier: Arc<TokenVerifier>) -> Self {
        Self { keys, verifier }
    }

    /// Rotate on behalf of the bearer of `token`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] if the token is invalid or lacks the
    /// admin role, and [`AuthError::RotationFailure`] if the rotation itself
    /// fails. The active key is unchanged in both cases.
    pub async fn rotate(&self, token: &str) -> Result<RotationReport, AuthError> {
        let claims = self
            .verifier
            .authenticate(token)
            .map_err(|r| AuthError::Forbidden(r.to_string()))?;

        if !claims.has_role(ADMIN_ROLE) {
            warn!(sub = %claims.sub, "key rotation denied");
            return Err(AuthError::Forbidden(format!(
                "{} role required",
                ADMIN_ROLE
            )));
        }

        self.rotate_local(&claims.sub).await
    }

    /// Rotate on behalf of a local operator, without a token.
    pub async fn rotate_local(&self, operator: &str) -> Result<RotationReport, AuthError> {
        let active = self.keys.rotate().await?;
        info!(rotated_by = %operator, kid = %active.kid(), "key rotation requested");

        Ok(RotationReport {
            rotated_by: operator.to_string(),
            active_kid: active.kid().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{JwtConfig, KeyStoreConfig};
    use crate::jwks::JwksPublisher;
    use crate::jwt::{ClaimsTemplate, TokenIssuer};
    use std::time::Duration;

    async fn setup() -> (tempfile::TempDir, TokenIssuer, KeyAdmin) {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(
            KeyStore::initialize(&KeyStoreConfig::default().with_directory(dir.path()))
                .await
                .unwrap(),
        );
        let config = JwtConfig::default();
        let verifier = TokenVerifier::new(JwksPublisher::new(Arc::clone(&keys)), config.clone());
        let issuer = TokenIssuer::new(Arc::clone(&keys), config);
        (dir, issuer, KeyAdmin::new(keys, Arc::new(verifier)))
    }

    fn token(issuer: &TokenIssuer, roles: &[&str]) -> String {
        issuer
            .issue(
                &ClaimsTemplate::default(),
                "root",
                Vec::<String>::new(),
                roles,
                Duration::from_secs(60),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_admin_can_rotate() {
        let (_dir, issuer, admin) = setup().await;
        let before = admin.keys.active_key().kid().to_string();

        let report = admin.rotate(&token(&issuer, &["ROLE_ADMIN"])).await.unwrap();

        assert_eq!(report.rotated_by, "root");
        assert_ne!(report.active_kid, before);
        assert_eq!(report.active_kid, admin.keys.active_key().kid());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rotatedBy"], "root");
        assert_eq!(json["activeKid"], report.active_kid);
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let (_dir, issuer, admin) = setup().await;
        let before = admin.keys.active_key().kid().to_string();

        let result = admin.rotate(&token(&issuer, &["USER"])).await;

        assert!(matches!(result, Err(AuthError::Forbidden(_))));
        assert_eq!(admin.keys.active_key().kid(), before);
    }

    #[tokio::test]
    async fn test_invalid_token_is_forbidden() {
        let (_dir, _issuer, admin) = setup().await;
        let result = admin.rotate("not-a-token").await;
        assert!(matches!(result, Err(AuthError::Forbidden(_))));
    }
}
