use crate::error::AuthError;
use crate::jwt::claims::{join_scopes, normalize_role, Claims};
use std::collections::BTreeSet;
use std::time::Duration;

pub struct ClaimsBuilder {
    issuer: String,
    subject: Option<String>,
    audience: BTreeSet<String>,
    ttl: Duration,
    issued_at: Option<i64>,
    scopes: Vec<String>,
    roles: BTreeSet<String>,
}

impl ClaimsBuilder {
    pub fn new(issuer: impl Into<String>) -> Self {
        ClaimsBuilder {
            issuer: issuer.into(),
            subject: None,
            audience: BTreeSet::new(),
            ttl: Duration::from_secs(900), // 15 minutes default
            issued_at: None,
            scopes: Vec::new(),
            roles: BTreeSet::new(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audience = audience.into_iter().map(Into::into).collect();
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Fix `iat`/`nbf` instead of using the current time.
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.issued_at = Some(timestamp);
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Roles or role authorities; a `ROLE_` prefix is stripped.
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.roles = roles
            .into_iter()
            .map(|r| normalize_role(r.as_ref().trim()).to_string())
            .filter(|r| !r.is_empty())
            .collect();
        self
    }

    pub fn build(self) -> Result<Claims, AuthError> {
        let subject = self
            .subject
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::signing("Subject is required"))?;
        if self.audience.is_empty() {
            return Err(AuthError::signing("At least one audience is required"));
        }
        let ttl = i64::try_from(self.ttl.as_secs())
            .map_err(|_| AuthError::signing("Token lifetime out of range"))?;
        let now = self
            .issued_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        Ok(Claims {
            iss: self.issuer,
            sub: subject,
            aud: self.audience,
            iat: now,
            exp: now.saturating_add(ttl),
            nbf: now,
            jti: uuid::Uuid::new_v4().to_string(),
            scope: join_scopes(&self.scopes),
            roles: self.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basic() {
        let claims = ClaimsBuilder::new("issuer")
            .subject("user-123")
            .audience(["api"])
            .ttl(Duration::from_secs(3600))
            .issued_at(1_000)
            .scopes(["read", "write"])
            .roles(["ROLE_ADMIN", "ADMIN", "USER"])
            .build()
            .unwrap();

        assert_eq!(claims.iss, "issuer");
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.nbf, 1_000);
        assert_eq!(claims.exp, 4_600);
        assert_eq!(claims.scope, "read write");
        assert_eq!(claims.roles.len(), 2);
        assert!(claims.roles.contains("ADMIN"));
    }

    #[test]
    fn test_unique_jti() {
        let build = || {
            ClaimsBuilder::new("issuer")
                .subject("user")
                .audience(["api"])
                .build()
                .unwrap()
        };
        assert_ne!(build().jti, build().jti);
    }

    #[test]
    fn test_builder_missing_subject() {
        let result = ClaimsBuilder::new("issuer").audience(["api"]).build();
        assert!(matches!(result, Err(AuthError::Signing(_))));
    }

    #[test]
    fn test_builder_missing_audience() {
        let result = ClaimsBuilder::new("issuer").subject("user").build();
        assert!(result.is_err());
    }
}
