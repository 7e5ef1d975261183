//! Centralized configuration.
//!
//! All configuration is loaded from environment variables and validated
//! at startup.

use crate::error::AuthError;
use crate::telemetry::TracingConfig;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest RSA modulus accepted for signing keys.
pub const MIN_RSA_BITS: usize = 2048;

/// Signing key storage settings.
#[derive(Debug, Clone)]
pub struct KeyStoreConfig {
    /// Directory holding `active.json` and retired key records
    pub directory: PathBuf,
    /// Number of retired keys kept for verification
    pub max_old: usize,
    /// Rotate once right after loading
    pub rotate_on_start: bool,
    /// RSA modulus size for generated keys
    pub rsa_bits: usize,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./keys"),
            max_old: 2,
            rotate_on_start: false,
            rsa_bits: MIN_RSA_BITS,
        }
    }
}

impl KeyStoreConfig {
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    #[must_use]
    pub fn with_max_old(mut self, max_old: usize) -> Self {
        self.max_old = max_old;
        self
    }

    #[must_use]
    pub fn with_rotate_on_start(mut self, rotate: bool) -> Self {
        self.rotate_on_start = rotate;
        self
    }
}

/// Claim settings shared by the issuer and the verifier.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// `iss` claim written and required
    pub issuer: String,
    /// Audience written by default and required on verification
    pub audience: String,
    /// Leeway applied to `exp` and `nbf`
    pub clock_skew: Duration,
    /// Default access token TTL
    pub access_token_ttl: Duration,
    /// Default refresh token TTL
    pub refresh_token_ttl: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:9000".to_string(),
            audience: "algoverse-api".to_string(),
            clock_skew: Duration::ZERO,
            access_token_ttl: Duration::from_secs(900),
            refresh_token_ttl: Duration::from_secs(2_592_000),
        }
    }
}

/// Backend used for grants, clients and consents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local maps
    Memory,
    /// Redis server
    Redis {
        /// Connection URL
        url: String,
    },
}

/// Grant/client/consent storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Key prefix for shared backends
    pub namespace: String,
    /// Store digests of code/access/refresh values instead of raw values
    pub hash_token_values: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            namespace: "algoverse".to_string(),
            hash_token_values: false,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub keys: KeyStoreConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub tracing: TracingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let rsa_bits = parse_env("KEYS_RSA_BITS", MIN_RSA_BITS)?;
        if rsa_bits < MIN_RSA_BITS {
            return Err(AuthError::config(format!(
                "KEYS_RSA_BITS must be at least {}, got {}",
                MIN_RSA_BITS, rsa_bits
            )));
        }

        let keys = KeyStoreConfig {
            directory: PathBuf::from(env::var("KEYS_DIR").unwrap_or_else(|_| "./keys".to_string())),
            max_old: parse_env("KEYS_MAX_OLD", 2)?,
            rotate_on_start: parse_env("KEYS_ROTATE_ON_START", false)?,
            rsa_bits,
        };

        let jwt = JwtConfig {
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "http://localhost:9000".to_string()),
            audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "algoverse-api".to_string()),
            clock_skew: Duration::from_secs(parse_env("JWT_CLOCK_SKEW", 0)?),
            access_token_ttl: Duration::from_secs(parse_env("ACCESS_TOKEN_TTL", 900)?),
            refresh_token_ttl: Duration::from_secs(parse_env("REFRESH_TOKEN_TTL", 2_592_000)?),
        };
        if jwt.issuer.is_empty() || jwt.audience.is_empty() {
            return Err(AuthError::config("JWT_ISSUER and JWT_AUDIENCE must not be empty"));
        }

        let backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            "redis" => StorageBackend::Redis {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            other => {
                return Err(AuthError::config(format!("Invalid STORAGE_BACKEND: {}", other)));
            }
        };

        let storage = StorageConfig {
            backend,
            namespace: env::var("STORAGE_NAMESPACE").unwrap_or_else(|_| "algoverse".to_string()),
            hash_token_values: parse_env("GRANT_HASH_TOKEN_VALUES", false)?,
        };

        let mut tracing = TracingConfig::default()
            .with_service_name("algoverse-auth")
            .with_log_level(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));
        if parse_env("LOG_JSON", false)? {
            tracing = tracing.with_json_output();
        }

        Ok(Self {
            keys,
            jwt,
            storage,
            tracing,
        })
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| AuthError::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default() {
        assert_eq!(parse_env("ALGOVERSE_TEST_UNSET_VAR", 7usize).unwrap(), 7);
    }

    #[test]
    fn test_parse_env_invalid() {
        env::set_var("ALGOVERSE_TEST_BAD_BOOL", "maybe");
        let result = parse_env("ALGOVERSE_TEST_BAD_BOOL", false);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
        env::remove_var("ALGOVERSE_TEST_BAD_BOOL");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.keys.max_old, 2);
        assert_eq!(config.keys.rsa_bits, 2048);
        assert!(!config.keys.rotate_on_start);
        assert_eq!(config.jwt.audience, "algoverse-api");
        assert_eq!(config.jwt.issuer, "http://localhost:9000");
        assert_eq!(config.jwt.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(!config.storage.hash_token_values);
    }

    #[test]
    fn test_key_store_config_builder() {
        let config = KeyStoreConfig::default()
            .with_directory("/tmp/keys")
            .with_max_old(5)
            .with_rotate_on_start(true);

        assert_eq!(config.directory, PathBuf::from("/tmp/keys"));
        assert_eq!(config.max_old, 5);
        assert!(config.rotate_on_start);
    }
}
