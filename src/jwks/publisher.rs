use crate::keys::{KeyStatus, KeyStore, PublicKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub key_use: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

impl From<&PublicKey> for Jwk {
    fn from(key: &PublicKey) -> Self {
        Jwk {
            kty: "RSA".to_string(),
            kid: key.kid.clone(),
            key_use: "sig".to_string(),
            alg: key.algorithm.as_str().to_string(),
            n: key.material.n.clone(),
            e: key.material.e.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn new() -> Self {
        Jwks { keys: Vec::new() }
    }

    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Publishes the public half of every key the store currently holds.
#[derive(Clone)]
pub struct JwksPublisher {
    keys: Arc<KeyStore>,
}

impl JwksPublisher {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        JwksPublisher { keys }
    }

    /// Active key first, then retained keys newest first.
    pub fn all_public_keys(&self) -> Vec<PublicKey> {
        self.keys.all_public_keys()
    }

    /// Public key with the given id, taken from one consistent snapshot.
    pub fn public_key(&self, kid: &str) -> Option<PublicKey> {
        self.keys
            .snapshot()
            .find(kid)
            .map(|(status, key)| key.public_key(status))
    }

    pub fn get_jwks(&self) -> Jwks {
        Jwks {
            keys: self.all_public_keys().iter().map(Jwk::from).collect(),
        }
    }

    pub fn find_key(&self, kid: &str) -> Option<Jwk> {
        self.public_key(kid).as_ref().map(Jwk::from)
    }

    pub fn current_key_id(&self) -> String {
        self.keys.active_key().kid().to_string()
    }

    /// Ids of keys that verify but no longer sign.
    pub fn retired_key_ids(&self) -> Vec<String> {
        self.all_public_keys()
            .into_iter()
            .filter(|k| k.status == KeyStatus::Retired)
            .map(|k| k.kid)
            .collect()
    }
}
