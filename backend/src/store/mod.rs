//! Shared key-value store used by every instance of the service.
//!
//! All cross-request state (rate windows, verification codes, session
//! revocation markers) lives behind [`AtomicKeyStore`]. Every operation whose
//! race matters is a single call on the trait, so a backend must execute it
//! as one indivisible step: Lua scripts for Redis, one critical section for
//! the in-process store.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod redis;

#[cfg(test)]
pub(crate) mod contract;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A key holds data the scripts never write (e.g. a code without expiry).
    #[error("inconsistent entry for key {key}")]
    Inconsistent { key: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of the atomic "set code" script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCodeOutcome {
    /// A new entry was written, either on an empty key or over a stale one.
    Created,
    /// A live entry is still inside its resend cooldown; nothing was written.
    Cooldown,
}

/// Outcome of the atomic "verify code" script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyCodeOutcome {
    /// Input matched; the entry has been deleted.
    Matched,
    /// Input did not match; the attempt counter was incremented.
    Mismatched,
    /// The attempt counter already reached the cap; nothing was changed.
    TooManyAttempts,
    /// No live entry for the key.
    NotFound,
}

/// Parameters of a verification-code entry.
#[derive(Debug, Clone, Copy)]
pub struct CodePolicy {
    /// Lifetime of a freshly written code.
    pub ttl: Duration,
    /// Window after issuance during which a resend is rejected.
    pub resend_cooldown: Duration,
    /// Number of mismatched verifications tolerated.
    pub max_attempts: u32,
}

/// A key-value store reachable by all service instances, with atomic
/// read-check-write operations.
#[async_trait]
pub trait AtomicKeyStore: Send + Sync {
    /// Writes `value` under `key`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Returns whether a live entry exists under `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Sliding-window check-and-append.
    ///
    /// Drops entries older than `now_ms - interval`, then reports `true`
    /// (limited) when `rate` entries remain, otherwise records `now_ms` and
    /// reports `false`.
    async fn slide_window(
        &self,
        key: &str,
        interval: Duration,
        rate: u32,
        now_ms: i64,
    ) -> StoreResult<bool>;

    /// Writes a fresh code with a zero attempt counter unless a live entry
    /// is still inside `policy.resend_cooldown`.
    async fn set_code(&self, key: &str, code: &str, policy: CodePolicy)
    -> StoreResult<SetCodeOutcome>;

    /// Compares `input` against the stored code and mutates the entry
    /// according to the outcome.
    async fn verify_code(
        &self,
        key: &str,
        input: &str,
        policy: CodePolicy,
    ) -> StoreResult<VerifyCodeOutcome>;
}
