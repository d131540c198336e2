//! In-process implementation of [`AtomicKeyStore`].
//!
//! Every operation runs under one mutex, which gives the same indivisibility
//! the Redis scripts give across instances. Only useful for a single process
//! (local runs and tests); state is lost on restart.

use super::{
    AtomicKeyStore, CodePolicy, SetCodeOutcome, StoreError, StoreResult, VerifyCodeOutcome,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Writes between two sweeps of expired entries.
const SWEEP_EVERY: u64 = 1024;

#[derive(Debug, Clone)]
enum Value {
    /// Written by `set_with_expiry`; only ever checked for presence.
    Marker,
    Window(VecDeque<i64>),
    Code { code: String, attempts: u32 },
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Entry>,
    writes: u64,
}

impl Entries {
    /// Returns the live entry under `key`, evicting it first if expired.
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.map.get(key).is_some_and(|e| !e.is_live(now)) {
            self.map.remove(key);
        }
        self.map.get_mut(key)
    }

    /// Counts a write and drops every expired entry once per `SWEEP_EVERY`.
    ///
    /// Expired keys are otherwise only evicted when touched again, so keys
    /// chosen by clients (one window per IP) would pile up.
    fn record_write(&mut self, now: Instant) {
        self.writes += 1;
        if self.writes % SWEEP_EVERY == 0 {
            self.map.retain(|_, e| e.is_live(now));
        }
    }
}

/// Single-process key-value store with expiry.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // A panic while holding the lock cannot leave an entry half-written,
        // so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of entries held, expired or not.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().map.len()
    }
}

#[async_trait]
impl AtomicKeyStore for MemoryStore {
    async fn set_with_expiry(&self, key: &str, _value: &str, ttl: Duration) -> StoreResult<()> {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.map.insert(
            key.to_string(),
            Entry {
                value: Value::Marker,
                expires_at: Some(now + ttl),
            },
        );
        entries.record_write(now);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.lock();
        Ok(entries.live(key, Instant::now()).is_some())
    }

    async fn slide_window(
        &self,
        key: &str,
        interval: Duration,
        rate: u32,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let mut entries = self.lock();
        let now = Instant::now();
        let interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        let min = now_ms.saturating_sub(interval_ms);

        entries.live(key, now);
        let entry = entries.map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Window(VecDeque::new()),
            expires_at: None,
        });
        let Value::Window(stamps) = &mut entry.value else {
            return Err(StoreError::Inconsistent {
                key: key.to_string(),
            });
        };

        while stamps.front().is_some_and(|&ts| ts <= min) {
            stamps.pop_front();
        }
        if stamps.len() >= rate as usize {
            return Ok(true);
        }
        stamps.push_back(now_ms);
        entry.expires_at = Some(now + interval);
        entries.record_write(now);
        Ok(false)
    }

    async fn set_code(
        &self,
        key: &str,
        code: &str,
        policy: CodePolicy,
    ) -> StoreResult<SetCodeOutcome> {
        let mut entries = self.lock();
        let now = Instant::now();
        if let Some(entry) = entries.live(key, now) {
            let Some(expires_at) = entry.expires_at else {
                return Err(StoreError::Inconsistent {
                    key: key.to_string(),
                });
            };
            let remaining = expires_at.saturating_duration_since(now);
            if remaining >= policy.ttl.saturating_sub(policy.resend_cooldown) {
                return Ok(SetCodeOutcome::Cooldown);
            }
        }
        entries.map.insert(
            key.to_string(),
            Entry {
                value: Value::Code {
                    code: code.to_string(),
                    attempts: 0,
                },
                expires_at: Some(now + policy.ttl),
            },
        );
        entries.record_write(now);
        Ok(SetCodeOutcome::Created)
    }

    async fn verify_code(
        &self,
        key: &str,
        input: &str,
        policy: CodePolicy,
    ) -> StoreResult<VerifyCodeOutcome> {
        let mut entries = self.lock();
        let Some(entry) = entries.live(key, Instant::now()) else {
            return Ok(VerifyCodeOutcome::NotFound);
        };
        let Value::Code { code, attempts } = &mut entry.value else {
            return Err(StoreError::Inconsistent {
                key: key.to_string(),
            });
        };

        if *attempts >= policy.max_attempts {
            return Ok(VerifyCodeOutcome::TooManyAttempts);
        }
        if code == input {
            entries.map.remove(key);
            return Ok(VerifyCodeOutcome::Matched);
        }
        *attempts += 1;
        Ok(VerifyCodeOutcome::Mismatched)
    }
}
