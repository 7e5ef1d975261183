use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field a grant record can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Id,
    State,
    Code,
    AccessToken,
    RefreshToken,
}

impl LookupKind {
    /// Lookup fields other than the primary id.
    pub const SECONDARY: [LookupKind; 4] = [
        LookupKind::State,
        LookupKind::Code,
        LookupKind::AccessToken,
        LookupKind::RefreshToken,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Id => "id",
            LookupKind::State => "state",
            LookupKind::Code => "code",
            LookupKind::AccessToken => "access_token",
            LookupKind::RefreshToken => "refresh_token",
        }
    }

    /// Whether values of this kind are bearer credentials.
    #[must_use]
    pub const fn is_credential(&self) -> bool {
        matches!(
            self,
            LookupKind::Code | LookupKind::AccessToken | LookupKind::RefreshToken
        )
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of value presented to [`find_by_token`](super::GrantRecordStore::find_by_token).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    State,
    AuthorizationCode,
    AccessToken,
    RefreshToken,
}

impl TokenKind {
    #[must_use]
    pub const fn lookup_kind(&self) -> LookupKind {
        match self {
            TokenKind::State => LookupKind::State,
            TokenKind::AuthorizationCode => LookupKind::Code,
            TokenKind::AccessToken => LookupKind::AccessToken,
            TokenKind::RefreshToken => LookupKind::RefreshToken,
        }
    }
}

/// Persisted state binding codes and tokens to a client and principal.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub id: String,
    pub client_id: String,
    pub principal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_value: Option<String>,
    /// Serialized grant, opaque to the store
    #[serde(default)]
    pub payload: String,
}

impl GrantRecord {
    pub fn new(client_id: impl Into<String>, principal_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            principal_name: principal_name.into(),
            state: None,
            authorization_code_value: None,
            access_token_value: None,
            refresh_token_value: None,
            payload: String::new(),
        }
    }

    /// Record created when an authorization request starts.
    pub fn authorization_request(
        client_id: impl Into<String>,
        principal_name: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(client_id, principal_name);
        record.state = Some(state.into());
        record
    }

    #[must_use]
    pub fn with_authorization_code(mut self, code: impl Into<String>) -> Self {
        self.authorization_code_value = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token_value = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token_value = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Exchange the authorization code for tokens. The code is consumed.
    pub fn exchange_code(&mut self, access_token: impl Into<String>, refresh_token: Option<String>) {
        self.authorization_code_value = None;
        self.access_token_value = Some(access_token.into());
        self.refresh_token_value = refresh_token;
    }

    /// Replace the refresh token and access token after a refresh grant.
    pub fn rotate_refresh_token(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) {
        self.access_token_value = Some(access_token.into());
        self.refresh_token_value = Some(refresh_token.into());
    }

    /// Value of the given lookup field, if set.
    #[must_use]
    pub fn lookup_value(&self, kind: LookupKind) -> Option<&str> {
        match kind {
            LookupKind::Id => Some(self.id.as_str()),
            LookupKind::State => self.state.as_deref(),
            LookupKind::Code => self.authorization_code_value.as_deref(),
            LookupKind::AccessToken => self.access_token_value.as_deref(),
            LookupKind::RefreshToken => self.refresh_token_value.as_deref(),
        }
    }

    pub(crate) fn lookup_value_mut(&mut self, kind: LookupKind) -> Option<&mut String> {
        match kind {
            LookupKind::Id => Some(&mut self.id),
            LookupKind::State => self.state.as_mut(),
            LookupKind::Code => self.authorization_code_value.as_mut(),
            LookupKind::AccessToken => self.access_token_value.as_mut(),
            LookupKind::RefreshToken => self.refresh_token_value.as_mut(),
        }
    }

    /// Populated secondary lookup fields.
    pub fn secondary_values(&self) -> impl Iterator<Item = (LookupKind, &str)> {
        LookupKind::SECONDARY
            .into_iter()
            .filter_map(move |kind| self.lookup_value(kind).map(|v| (kind, v)))
    }
}

// Token values are credentials and stay out of logs.
impl fmt::Debug for GrantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantRecord")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("principal_name", &self.principal_name)
            .field("has_code", &self.authorization_code_value.is_some())
            .field("has_access_token", &self.access_token_value.is_some())
            .field("has_refresh_token", &self.refresh_token_value.is_some())
            .finish_non_exhaustive()
    }
}

/// Random value for authorization codes, refresh tokens and state.
///
/// 32 bytes from the thread RNG, base64url without padding.
#[must_use]
pub fn generate_opaque_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut record = GrantRecord::authorization_request("public-client", "alice", "st-1")
            .with_authorization_code("code-1");
        assert_eq!(record.lookup_value(LookupKind::Code), Some("code-1"));

        record.exchange_code("at-1", Some("rt-1".to_string()));
        assert_eq!(record.lookup_value(LookupKind::Code), None);
        assert_eq!(record.lookup_value(LookupKind::AccessToken), Some("at-1"));
        assert_eq!(record.lookup_value(LookupKind::RefreshToken), Some("rt-1"));
        assert_eq!(record.lookup_value(LookupKind::State), Some("st-1"));

        record.rotate_refresh_token("at-2", "rt-2");
        assert_eq!(record.lookup_value(LookupKind::RefreshToken), Some("rt-2"));
    }

    #[test]
    fn test_secondary_values() {
        let record = GrantRecord::new("c", "p").with_access_token("at");
        let values: Vec<_> = record.secondary_values().collect();
        assert_eq!(values, vec![(LookupKind::AccessToken, "at")]);
    }

    #[test]
    fn test_debug_hides_values() {
        let record = GrantRecord::new("c", "p").with_access_token("secret-token");
        assert!(!format!("{:?}", record).contains("secret-token"));
    }

    #[test]
    fn test_opaque_values() {
        let a = generate_opaque_value();
        let b = generate_opaque_value();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_lookup_kind_display() {
        assert_eq!(LookupKind::RefreshToken.to_string(), "refresh_token");
        assert_eq!(TokenKind::AuthorizationCode.lookup_kind(), LookupKind::Code);
    }
}
