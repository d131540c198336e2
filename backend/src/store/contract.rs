//! Behaviour every [`AtomicKeyStore`] backend must share.
//!
//! Each check takes the store and a key prefix so the same suite can run
//! against a shared Redis without colliding with earlier runs.

use super::{AtomicKeyStore, CodePolicy, SetCodeOutcome, VerifyCodeOutcome};
use futures::future::join_all;
use std::time::Duration;

fn policy() -> CodePolicy {
    CodePolicy {
        ttl: Duration::from_secs(600),
        resend_cooldown: Duration::from_secs(60),
        max_attempts: 3,
    }
}

pub async fn marker_expires(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:marker");
    assert!(!store.exists(&key).await.unwrap());
    store
        .set_with_expiry(&key, "", Duration::from_millis(100))
        .await
        .unwrap();
    assert!(store.exists(&key).await.unwrap());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!store.exists(&key).await.unwrap());
}

pub async fn slide_window_prunes_old_entries(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:window");
    let interval = Duration::from_millis(1000);

    assert!(!store.slide_window(&key, interval, 2, 1_000).await.unwrap());
    assert!(!store.slide_window(&key, interval, 2, 1_500).await.unwrap());
    assert!(store.slide_window(&key, interval, 2, 1_900).await.unwrap());
    // The entry at 1_000 falls out of the window at 2_000.
    assert!(!store.slide_window(&key, interval, 2, 2_000).await.unwrap());
    assert!(store.slide_window(&key, interval, 2, 2_100).await.unwrap());
}

pub async fn slide_window_counts_same_millisecond_hits(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:burst");
    let interval = Duration::from_secs(60);

    let results = join_all((0..20).map(|_| store.slide_window(&key, interval, 5, 42_000))).await;
    let allowed = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|limited| !limited)
        .count();
    assert_eq!(allowed, 5);
}

pub async fn set_code_respects_cooldown(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:cooldown");
    assert_eq!(
        store.set_code(&key, "111111", policy()).await.unwrap(),
        SetCodeOutcome::Created
    );
    assert_eq!(
        store.set_code(&key, "222222", policy()).await.unwrap(),
        SetCodeOutcome::Cooldown
    );
    // The first code is untouched by the rejected resend.
    assert_eq!(
        store.verify_code(&key, "111111", policy()).await.unwrap(),
        VerifyCodeOutcome::Matched
    );
}

pub async fn set_code_overwrites_after_cooldown(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:overwrite");
    let short = CodePolicy {
        ttl: Duration::from_millis(400),
        resend_cooldown: Duration::from_millis(100),
        max_attempts: 3,
    };
    store.set_code(&key, "111111", short).await.unwrap();
    tokio::time::sleep(Duration::from_millis(180)).await;
    assert_eq!(
        store.set_code(&key, "222222", short).await.unwrap(),
        SetCodeOutcome::Created
    );
    // The overwrite also reset the attempt counter.
    assert_eq!(
        store.verify_code(&key, "111111", short).await.unwrap(),
        VerifyCodeOutcome::Mismatched
    );
    assert_eq!(
        store.verify_code(&key, "222222", short).await.unwrap(),
        VerifyCodeOutcome::Matched
    );
}

pub async fn verify_code_caps_attempts(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:cap");
    store.set_code(&key, "123456", policy()).await.unwrap();
    for _ in 0..3 {
        assert_eq!(
            store.verify_code(&key, "000000", policy()).await.unwrap(),
            VerifyCodeOutcome::Mismatched
        );
    }
    // Even the right code is refused once the cap is reached.
    assert_eq!(
        store.verify_code(&key, "123456", policy()).await.unwrap(),
        VerifyCodeOutcome::TooManyAttempts
    );
    assert!(store.exists(&key).await.unwrap());
}

pub async fn verify_code_consumes_on_match(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:consume");
    assert_eq!(
        store.verify_code(&key, "123456", policy()).await.unwrap(),
        VerifyCodeOutcome::NotFound
    );
    store.set_code(&key, "123456", policy()).await.unwrap();
    assert_eq!(
        store.verify_code(&key, "123456", policy()).await.unwrap(),
        VerifyCodeOutcome::Matched
    );
    assert_eq!(
        store.verify_code(&key, "123456", policy()).await.unwrap(),
        VerifyCodeOutcome::NotFound
    );
}

pub async fn expired_code_is_not_found(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:expired");
    let short = CodePolicy {
        ttl: Duration::from_millis(100),
        resend_cooldown: Duration::from_millis(20),
        max_attempts: 3,
    };
    store.set_code(&key, "123456", short).await.unwrap();
    for _ in 0..3 {
        store.verify_code(&key, "000000", short).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(250)).await;
    // Past the TTL a capped entry reads as absent, not as capped.
    assert_eq!(
        store.verify_code(&key, "123456", short).await.unwrap(),
        VerifyCodeOutcome::NotFound
    );
}

pub async fn concurrent_sends_write_once(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:race-send");
    let codes: Vec<String> = (0..16).map(|i| format!("{i:06}")).collect();

    let results = join_all(codes.iter().map(|c| store.set_code(&key, c, policy()))).await;
    let created = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|o| *o == SetCodeOutcome::Created)
        .count();
    assert_eq!(created, 1);
}

pub async fn concurrent_verifies_match_once(store: &dyn AtomicKeyStore, prefix: &str) {
    let key = format!("{prefix}:race-verify");
    store.set_code(&key, "654321", policy()).await.unwrap();

    let results = join_all((0..16).map(|_| store.verify_code(&key, "654321", policy()))).await;
    let outcomes: Vec<VerifyCodeOutcome> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == VerifyCodeOutcome::Matched)
            .count(),
        1
    );
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, VerifyCodeOutcome::Matched | VerifyCodeOutcome::NotFound))
    );
}

/// Runs every check above in sequence.
pub async fn run_all(store: &dyn AtomicKeyStore, prefix: &str) {
    marker_expires(store, prefix).await;
    slide_window_prunes_old_entries(store, prefix).await;
    slide_window_counts_same_millisecond_hits(store, prefix).await;
    set_code_respects_cooldown(store, prefix).await;
    set_code_overwrites_after_cooldown(store, prefix).await;
    verify_code_caps_attempts(store, prefix).await;
    verify_code_consumes_on_match(store, prefix).await;
    expired_code_is_not_found(store, prefix).await;
    concurrent_sends_write_once(store, prefix).await;
    concurrent_verifies_match_once(store, prefix).await;
}
