//! Token validation against the published key set.

use crate::config::JwtConfig;
use crate::error::{Rejection, VerificationError};
use crate::jwks::JwksPublisher;
use crate::jwt::claims::Claims;
use crate::keys::SigningAlgorithm;
use crate::metrics;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Validation};
use serde::Deserialize;
use tracing::debug;

/// Header fields inspected before any key is touched.
#[derive(Deserialize)]
struct RawHeader {
    alg: String,
    kid: Option<String>,
}

/// Validates signature, key selection and claims of presented tokens.
pub struct TokenVerifier {
    publisher: JwksPublisher,
    config: JwtConfig,
}

impl TokenVerifier {
    pub fn new(publisher: JwksPublisher, config: JwtConfig) -> Self {
        Self { publisher, config }
    }

    /// Verify `token` at the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify `token` as of `now` (seconds since the epoch).
    ///
    /// Checks run in a fixed order: header, algorithm, key id, signature,
    /// expiry, not-before, issuer, audience. The first failure is returned.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, VerificationError> {
        let result = self.check(token, now);
        match &result {
            Ok(claims) => {
                metrics::record_verification("valid");
                debug!(sub = %claims.sub, jti = %claims.jti, "token verified");
            }
            Err(e) => {
                metrics::record_verification(e.kind());
                debug!(reason = e.kind(), "token rejected");
            }
        }
        result
    }

    /// Boundary variant of [`verify`](Self::verify): the reason for a
    /// rejection is not revealed.
    pub fn authenticate(&self, token: &str) -> Result<Claims, Rejection> {
        self.verify(token).map_err(Rejection::from)
    }

    fn check(&self, token: &str, now: i64) -> Result<Claims, VerificationError> {
        let header = parse_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| VerificationError::Malformed("missing kid".to_string()))?;

        // Refused before the key set is consulted.
        if header.alg != SigningAlgorithm::PS256.as_str() {
            return Err(VerificationError::UnsupportedAlgorithm(header.alg));
        }

        let key = self
            .publisher
            .public_key(&kid)
            .ok_or(VerificationError::UnknownKey { kid })?;
        if header.alg != key.algorithm.as_str() {
            return Err(VerificationError::UnsupportedAlgorithm(header.alg));
        }

        let mut validation = Validation::new(key.algorithm.jwt_algorithm());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => VerificationError::BadSignature,
                ErrorKind::InvalidAlgorithm => {
                    VerificationError::UnsupportedAlgorithm(key.algorithm.as_str().to_string())
                }
                _ => VerificationError::Malformed(e.to_string()),
            })?
            .claims;

        let leeway = i64::try_from(self.config.clock_skew.as_secs()).unwrap_or(i64::MAX);

        if claims.exp.saturating_add(leeway) <= now {
            return Err(VerificationError::Expired {
                expired_at: claims.exp,
            });
        }
        if claims.nbf.saturating_sub(leeway) > now {
            return Err(VerificationError::NotYetValid {
                valid_from: claims.nbf,
            });
        }
        if claims.iss != self.config.issuer {
            return Err(VerificationError::InvalidIssuer(claims.iss));
        }
        if !claims.aud.contains(&self.config.audience) {
            return Err(VerificationError::InvalidAudience);
        }

        Ok(claims)
    }
}

fn parse_header(token: &str) -> Result<RawHeader, VerificationError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(VerificationError::Malformed(
            "expected three segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| VerificationError::Malformed(format!("header encoding: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VerificationError::Malformed(format!("header: {}", e)))
}
