//! RSA signing key material.

use crate::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// JWS algorithm used by generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSASSA-PSS with SHA-256
    PS256,
}

impl SigningAlgorithm {
    /// Algorithm name for the JWT header.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PS256 => "PS256",
        }
    }

    #[must_use]
    pub const fn jwt_algorithm(&self) -> Algorithm {
        match self {
            Self::PS256 => Algorithm::PS256,
        }
    }
}

/// Lifecycle state of a key within the current key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    Active,
    Retired,
}

/// RSA public components, base64url without padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicMaterial {
    pub n: String,
    pub e: String,
}

impl PublicMaterial {
    fn from_private(key: &RsaPrivateKey) -> Self {
        Self {
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }
}

/// Durable form of a signing key, one file per key.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredKey {
    pub kid: String,
    pub alg: SigningAlgorithm,
    pub created_at: DateTime<Utc>,
    pub public_jwk: PublicMaterial,
    pub private_pem: String,
}

impl Drop for StoredKey {
    fn drop(&mut self) {
        self.private_pem.zeroize();
    }
}

/// An RSA key pair with its identifier and ready-to-use JWT keys.
pub struct SigningKey {
    kid: String,
    algorithm: SigningAlgorithm,
    created_at: DateTime<Utc>,
    public: PublicMaterial,
    private_pem: Zeroizing<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Generate a fresh key pair with a random key id.
    ///
    /// CPU bound; call from a blocking context.
    pub fn generate(bits: usize) -> Result<Self, AuthError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| AuthError::signing(format!("RSA key generation failed: {}", e)))?;

        Self::from_private(
            uuid::Uuid::new_v4().to_string(),
            SigningAlgorithm::PS256,
            Utc::now(),
            &private,
        )
    }

    fn from_private(
        kid: String,
        algorithm: SigningAlgorithm,
        created_at: DateTime<Utc>,
        private: &RsaPrivateKey,
    ) -> Result<Self, AuthError> {
        let private_pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| AuthError::signing(format!("Failed to encode private key: {}", e)))?;
        let public = PublicMaterial::from_private(private);

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())?;
        let decoding_key = DecodingKey::from_rsa_components(&public.n, &public.e)?;

        Ok(Self {
            kid,
            algorithm,
            created_at,
            public,
            private_pem,
            encoding_key,
            decoding_key,
        })
    }

    /// Rebuild a key from its durable record.
    pub(crate) fn from_stored(stored: &StoredKey) -> Result<Self, AuthError> {
        let private = RsaPrivateKey::from_pkcs1_pem(&stored.private_pem).map_err(|e| {
            AuthError::config(format!("Cannot parse private key {}: {}", stored.kid, e))
        })?;

        let key = Self::from_private(stored.kid.clone(), stored.alg, stored.created_at, &private)
            .map_err(|e| AuthError::config(format!("Cannot load key {}: {}", stored.kid, e)))?;

        if key.public != stored.public_jwk {
            return Err(AuthError::config(format!(
                "Public material of key {} does not match its private key",
                stored.kid
            )));
        }

        Ok(key)
    }

    pub(crate) fn to_stored(&self) -> StoredKey {
        StoredKey {
            kid: self.kid.clone(),
            alg: self.algorithm,
            created_at: self.created_at,
            public_jwk: self.public.clone(),
            private_pem: (*self.private_pem).clone(),
        }
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn public_material(&self) -> &PublicMaterial {
        &self.public
    }

    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public portion of this key, tagged with its status.
    #[must_use]
    pub fn public_key(&self, status: KeyStatus) -> PublicKey {
        PublicKey {
            kid: self.kid.clone(),
            algorithm: self.algorithm,
            created_at: self.created_at,
            status,
            material: self.public.clone(),
            decoding_key: self.decoding_key.clone(),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Verification-only view of a signing key.
#[derive(Clone)]
pub struct PublicKey {
    pub kid: String,
    pub algorithm: SigningAlgorithm,
    pub created_at: DateTime<Utc>,
    pub status: KeyStatus,
    pub material: PublicMaterial,
    decoding_key: DecodingKey,
}

impl PublicKey {
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_reload() {
        let key = SigningKey::generate(2048).unwrap();
        assert_eq!(key.algorithm(), SigningAlgorithm::PS256);
        assert_eq!(key.public_material().e, "AQAB");

        let stored = key.to_stored();
        let reloaded = SigningKey::from_stored(&stored).unwrap();

        assert_eq!(reloaded.kid(), key.kid());
        assert_eq!(reloaded.created_at(), key.created_at());
        assert_eq!(reloaded.public_material(), key.public_material());
    }

    #[test]
    fn test_mismatched_public_material_rejected() {
        let key = SigningKey::generate(2048).unwrap();
        let mut stored = key.to_stored();
        stored.public_jwk.n = "AAAA".to_string();

        let result = SigningKey::from_stored(&stored);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_garbage_private_key_rejected() {
        let stored = StoredKey {
            kid: "broken".to_string(),
            alg: SigningAlgorithm::PS256,
            created_at: Utc::now(),
            public_jwk: PublicMaterial {
                n: "AA".to_string(),
                e: "AQAB".to_string(),
            },
            private_pem: "not a pem".to_string(),
        };

        assert!(matches!(
            SigningKey::from_stored(&stored),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_omits_private_material() {
        let key = SigningKey::generate(2048).unwrap();
        let rendered = format!("{:?}", key);
        assert!(rendered.contains(key.kid()));
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(SigningAlgorithm::PS256.as_str(), "PS256");
        assert_eq!(SigningAlgorithm::PS256.jwt_algorithm(), Algorithm::PS256);
    }
}
