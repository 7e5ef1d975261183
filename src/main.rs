//! Operator command line for the signing key store and token pipeline.

use algoverse_auth::admin::KeyAdmin;
use algoverse_auth::clients::seed_default_clients;
use algoverse_auth::config::Config;
use algoverse_auth::jwks::JwksPublisher;
use algoverse_auth::jwt::{ClaimsTemplate, TokenIssuer, TokenVerifier};
use algoverse_auth::keys::KeyStore;
use algoverse_auth::storage::Storage;
use algoverse_auth::telemetry::init_tracing;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Signing key and token administration
#[derive(Parser, Debug)]
#[command(name = "algoverse-auth")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Key directory (overrides KEYS_DIR)
    #[arg(long, global = true)]
    keys_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the active key and retained keys
    Status,

    /// Rotate the signing key
    Rotate {
        /// Name recorded as the operator
        #[arg(long, env = "USER", default_value = "operator")]
        operator: String,
    },

    /// Print the public key set as JWKS
    Jwks,

    /// Issue a signed access token
    Issue {
        /// Token subject
        #[arg(long)]
        subject: String,

        /// Granted scope (repeatable)
        #[arg(long = "scope")]
        scopes: Vec<String>,

        /// Role, with or without the ROLE_ prefix (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Audience replacing the configured one (repeatable)
        #[arg(long = "audience")]
        audiences: Vec<String>,

        /// Lifetime in seconds (defaults to ACCESS_TOKEN_TTL)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Verify a token and print its claims
    Verify {
        token: String,
    },

    /// Register the built-in clients in the configured storage
    SeedClients {
        /// Hash of the service client secret
        #[arg(long, env = "SERVICE_CLIENT_SECRET_HASH")]
        secret_hash: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.keys_dir {
        config.keys.directory = dir;
    }
    init_tracing(&config.tracing)?;

    match cli.command {
        Command::Status => {
            let publisher = JwksPublisher::new(load_keys(&config).await?);
            let keys: Vec<_> = publisher
                .all_public_keys()
                .into_iter()
                .map(|k| {
                    serde_json::json!({
                        "kid": k.kid,
                        "alg": k.algorithm.as_str(),
                        "status": k.status,
                        "created_at": k.created_at,
                    })
                })
                .collect();
            let status = serde_json::json!({
                "active_kid": publisher.current_key_id(),
                "max_old": config.keys.max_old,
                "keys": keys,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Rotate { operator } => {
            let keys = load_keys(&config).await?;
            let publisher = JwksPublisher::new(Arc::clone(&keys));
            let verifier = Arc::new(TokenVerifier::new(publisher, config.jwt.clone()));
            let report = KeyAdmin::new(keys, verifier).rotate_local(&operator).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Jwks => {
            let publisher = JwksPublisher::new(load_keys(&config).await?);
            println!("{}", serde_json::to_string_pretty(&publisher.get_jwks())?);
        }
        Command::Issue {
            subject,
            scopes,
            roles,
            audiences,
            ttl,
        } => {
            let mut template = ClaimsTemplate::default();
            if !audiences.is_empty() {
                template = template.with_audience(audiences);
            }
            let ttl = ttl
                .map(Duration::from_secs)
                .unwrap_or(config.jwt.access_token_ttl);

            let issuer = TokenIssuer::new(load_keys(&config).await?, config.jwt.clone());
            let token = issuer.issue(&template, &subject, scopes, roles, ttl)?;
            println!("{}", token);
        }
        Command::Verify { token } => {
            let publisher = JwksPublisher::new(load_keys(&config).await?);
            let verifier = TokenVerifier::new(publisher, config.jwt.clone());
            match verifier.verify(&token) {
                Ok(claims) => println!("{}", serde_json::to_string_pretty(&claims)?),
                Err(e) => anyhow::bail!("token rejected: {}", e),
            }
        }
        Command::SeedClients { secret_hash } => {
            let storage = Storage::connect(&config.storage).await?;
            let seeded = seed_default_clients(&storage.clients, &secret_hash).await?;
            println!("{}", serde_json::to_string_pretty(&seeded)?);
        }
    }

    Ok(())
}

async fn load_keys(config: &Config) -> anyhow::Result<Arc<KeyStore>> {
    let keys = KeyStore::initialize(&config.keys)
        .await
        .context("failed to load signing keys")?;
    info!(
        dir = %config.keys.directory.display(),
        active_kid = %keys.active_key().kid(),
        "key store ready"
    );
    Ok(Arc::new(keys))
}
