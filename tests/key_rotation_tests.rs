//! Rotation behaviour observed through issuance and verification.

use algoverse_auth::config::{JwtConfig, KeyStoreConfig};
use algoverse_auth::error::VerificationError;
use algoverse_auth::jwks::JwksPublisher;
use algoverse_auth::jwt::{ClaimsTemplate, TokenIssuer, TokenVerifier};
use algoverse_auth::keys::{KeyStatus, KeyStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    _dir: tempfile::TempDir,
    keys: Arc<KeyStore>,
    issuer: Arc<TokenIssuer>,
    verifier: Arc<TokenVerifier>,
}

async fn harness(max_old: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = KeyStoreConfig::default()
        .with_directory(dir.path())
        .with_max_old(max_old);
    let keys = Arc::new(KeyStore::initialize(&config).await.unwrap());
    let jwt = JwtConfig::default();

    Harness {
        issuer: Arc::new(TokenIssuer::new(Arc::clone(&keys), jwt.clone())),
        verifier: Arc::new(TokenVerifier::new(JwksPublisher::new(Arc::clone(&keys)), jwt)),
        keys,
        _dir: dir,
    }
}

fn issue(issuer: &TokenIssuer) -> String {
    issuer
        .issue(
            &ClaimsTemplate::default(),
            "alice",
            ["read"],
            ["USER"],
            Duration::from_secs(300),
        )
        .unwrap()
}

fn kid_of(token: &str) -> String {
    jsonwebtoken::decode_header(token).unwrap().kid.unwrap()
}

#[tokio::test]
async fn test_three_rotations_with_max_old_two() {
    let h = harness(2).await;

    let mut tokens = vec![issue(&h.issuer)];
    for _ in 0..3 {
        h.keys.rotate().await.unwrap();
        tokens.push(issue(&h.issuer));
    }

    let snapshot = h.keys.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.retired().len(), 2);

    let first_kid = kid_of(&tokens[0]);
    assert!(snapshot.find(&first_kid).is_none());
    assert_eq!(
        h.verifier.verify(&tokens[0]),
        Err(VerificationError::UnknownKey { kid: first_kid })
    );

    for token in &tokens[1..] {
        assert!(h.verifier.verify(token).is_ok());
    }
    assert_eq!(
        snapshot.find(&kid_of(&tokens[3])).map(|(s, _)| s),
        Some(KeyStatus::Active)
    );

    // Retired records on disk follow the in-memory set.
    let retired_files = std::fs::read_dir(h.keys.directory().root())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with("retired-")
        })
        .count();
    assert_eq!(retired_files, 2);
}

#[tokio::test]
async fn test_max_old_zero_invalidates_previous_tokens() {
    let h = harness(0).await;
    let token = issue(&h.issuer);
    assert!(h.verifier.verify(&token).is_ok());

    h.keys.rotate().await.unwrap();

    assert!(matches!(
        h.verifier.verify(&token),
        Err(VerificationError::UnknownKey { .. })
    ));
    assert!(h.verifier.verify(&issue(&h.issuer)).is_ok());
}

#[tokio::test]
async fn test_tokens_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = KeyStoreConfig::default().with_directory(dir.path());
    let jwt = JwtConfig::default();

    let token = {
        let keys = Arc::new(KeyStore::initialize(&config).await.unwrap());
        let issuer = TokenIssuer::new(Arc::clone(&keys), jwt.clone());
        let token = issue(&issuer);
        keys.rotate().await.unwrap();
        token
    };

    let keys = Arc::new(KeyStore::initialize(&config).await.unwrap());
    let verifier = TokenVerifier::new(JwksPublisher::new(keys), jwt);
    assert!(verifier.verify(&token).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_issuance_during_rotation_sees_whole_keys() {
    let h = harness(8).await;
    let initial = h.keys.active_key().kid().to_string();

    let mut workers = Vec::new();
    for _ in 0..4 {
        let issuer = Arc::clone(&h.issuer);
        let verifier = Arc::clone(&h.verifier);
        let keys = Arc::clone(&h.keys);
        workers.push(tokio::spawn(async move {
            let mut seen = HashSet::new();
            for _ in 0..25 {
                let snapshot = keys.snapshot();
                assert!(snapshot
                    .retired()
                    .iter()
                    .all(|k| k.kid() != snapshot.active().kid()));

                let token = issue(&issuer);
                verifier.verify(&token).unwrap();
                seen.insert(kid_of(&token));
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    let mut rotated = vec![initial];
    for _ in 0..3 {
        rotated.push(h.keys.rotate().await.unwrap().kid().to_string());
    }

    for worker in workers {
        let seen = worker.await.unwrap();
        assert!(seen.iter().all(|kid| rotated.contains(kid)));
    }
    assert_eq!(h.keys.snapshot().len(), 4);
}
