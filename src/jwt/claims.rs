use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Prefix marking role authorities.
pub const ROLE_PREFIX: &str = "ROLE_";
/// Prefix marking scope authorities.
pub const SCOPE_PREFIX: &str = "SCOPE_";

/// Closed claim set carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(deserialize_with = "one_or_many")]
    pub aud: BTreeSet<String>,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub jti: String,
    /// Space separated scopes
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Claims {
    /// Scopes as individual values, in order of appearance.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|s| s == scope)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(normalize_role(role))
    }

    /// Authority strings for access decisions: `ROLE_<role>` for each role
    /// and `SCOPE_<scope>` for each distinct scope.
    #[must_use]
    pub fn authorities(&self) -> BTreeSet<String> {
        let roles = self.roles.iter().map(|r| {
            if r.starts_with(ROLE_PREFIX) {
                r.clone()
            } else {
                format!("{}{}", ROLE_PREFIX, r)
            }
        });
        let scopes = self.scopes().map(|s| format!("{}{}", SCOPE_PREFIX, s));
        roles.chain(scopes).collect()
    }

    #[must_use]
    pub fn is_expired_at(&self, timestamp: i64) -> bool {
        self.exp <= timestamp
    }
}

/// Strip the authority prefix from a role name.
#[must_use]
pub fn normalize_role(role: &str) -> &str {
    role.strip_prefix(ROLE_PREFIX).unwrap_or(role)
}

/// Join scopes with single spaces, dropping blanks and repeats.
#[must_use]
pub fn join_scopes<I, S>(scopes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut joined = Vec::new();
    for scope in scopes {
        for part in scope.as_ref().split_whitespace() {
            if seen.insert(part.to_string()) {
                joined.push(part.to_string());
            }
        }
    }
    joined.join(" ")
}

// `aud` may be a single string or an array.
fn one_or_many<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(BTreeSet<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => BTreeSet::from([value]),
        OneOrMany::Many(values) => values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            iss: "http://localhost:9000".to_string(),
            sub: "alice".to_string(),
            aud: BTreeSet::from(["algoverse-api".to_string()]),
            iat: 100,
            exp: 1000,
            nbf: 100,
            jti: "j1".to_string(),
            scope: "openid read read".to_string(),
            roles: BTreeSet::from(["ADMIN".to_string(), "USER".to_string()]),
        }
    }

    #[test]
    fn test_authorities() {
        let authorities = claims().authorities();
        let expected: BTreeSet<String> = ["ROLE_ADMIN", "ROLE_USER", "SCOPE_openid", "SCOPE_read"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(authorities, expected);
    }

    #[test]
    fn test_scope_and_role_checks() {
        let claims = claims();
        assert!(claims.has_scope("read"));
        assert!(!claims.has_scope("write"));
        assert!(claims.has_role("ADMIN"));
        assert!(claims.has_role("ROLE_ADMIN"));
        assert!(!claims.has_role("OPERATOR"));
    }

    #[test]
    fn test_audience_accepts_string() {
        let json = r#"{"iss":"i","sub":"s","aud":"algoverse-api","iat":1,"exp":2,"nbf":1,"jti":"j"}"#;
        let claims: Claims = serde_json::from_str(json).unwrap();
        assert!(claims.aud.contains("algoverse-api"));
        assert!(claims.roles.is_empty());
        assert_eq!(claims.scope, "");
    }

    #[test]
    fn test_join_scopes() {
        assert_eq!(join_scopes(["read", "write read", " "]), "read write");
        assert_eq!(join_scopes(Vec::<String>::new()), "");
    }

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role("ROLE_ADMIN"), "ADMIN");
        assert_eq!(normalize_role("ADMIN"), "ADMIN");
    }
}
