//! Redis implementation of [`AtomicKeyStore`].
//!
//! The three race-sensitive operations are Lua scripts evaluated server
//! side, so check and mutate happen in one step no matter how many service
//! instances share the same Redis.
//!
//! Commands go through a [`ConnectionManager`], which re-establishes the
//! connection after Redis restarts. Every command is bounded by the
//! configured response timeout; an expired timeout surfaces as
//! [`StoreError::Backend`].

use super::{
    AtomicKeyStore, CodePolicy, SetCodeOutcome, StoreError, StoreResult, VerifyCodeOutcome,
};
use crate::config::RedisConfig;
use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{Client, RedisError, Script};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const SLIDE_WINDOW_LUA: &str = include_str!("lua/slide_window.lua");
const SET_CODE_LUA: &str = include_str!("lua/set_code.lua");
const VERIFY_CODE_LUA: &str = include_str!("lua/verify_code.lua");

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Store backed by a shared Redis instance.
pub struct RedisStore {
    conn: ConnectionManager,
    slide_window: Script,
    set_code: Script,
    verify_code: Script,
}

impl RedisStore {
    /// Connects to `config.url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Fails when the first connection cannot be made within
    /// `connection_timeout` after `reconnect_retries` retries.
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.response_timeout)
            .set_number_of_retries(config.reconnect_retries);
        let conn = ConnectionManager::new_with_config(client, manager_config).await?;
        info!("Connected to Redis at {}", config.url);

        Ok(Self {
            conn,
            slide_window: Script::new(SLIDE_WINDOW_LUA),
            set_code: Script::new(SET_CODE_LUA),
            verify_code: Script::new(VERIFY_CODE_LUA),
        })
    }
}

#[async_trait]
impl AtomicKeyStore for RedisStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = ::redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(count > 0)
    }

    async fn slide_window(
        &self,
        key: &str,
        interval: Duration,
        rate: u32,
        now_ms: i64,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        // Unique member so two hits in the same millisecond both count.
        let member = format!("{}-{}", now_ms, Uuid::now_v7());
        let limited: i64 = self
            .slide_window
            .key(key)
            .arg(millis(interval))
            .arg(rate)
            .arg(now_ms)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(limited == 1)
    }

    async fn set_code(
        &self,
        key: &str,
        code: &str,
        policy: CodePolicy,
    ) -> StoreResult<SetCodeOutcome> {
        let mut conn = self.conn.clone();
        let res: i64 = self
            .set_code
            .key(key)
            .arg(code)
            .arg(millis(policy.ttl))
            .arg(millis(policy.resend_cooldown))
            .invoke_async(&mut conn)
            .await?;
        match res {
            0 => Ok(SetCodeOutcome::Created),
            -1 => Ok(SetCodeOutcome::Cooldown),
            _ => Err(StoreError::Inconsistent {
                key: key.to_string(),
            }),
        }
    }

    async fn verify_code(
        &self,
        key: &str,
        input: &str,
        policy: CodePolicy,
    ) -> StoreResult<VerifyCodeOutcome> {
        let mut conn = self.conn.clone();
        let res: i64 = self
            .verify_code
            .key(key)
            .arg(input)
            .arg(policy.max_attempts)
            .invoke_async(&mut conn)
            .await?;
        match res {
            0 => Ok(VerifyCodeOutcome::Matched),
            -1 => Ok(VerifyCodeOutcome::TooManyAttempts),
            -2 => Ok(VerifyCodeOutcome::Mismatched),
            -3 => Ok(VerifyCodeOutcome::NotFound),
            _ => Err(StoreError::Inconsistent {
                key: key.to_string(),
            }),
        }
    }
}
