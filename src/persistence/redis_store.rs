//! Redis implementation of [`KeyValueStore`].
//!
//! Uses an auto-reconnecting multiplexed [`ConnectionManager`]; every
//! command runs under the configured deadline. Batches go out as a single
//! non-transactional pipeline, and the token bucket runs server-side as a
//! Lua script so that refill, check and decrement happen in one atomic step.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};

use super::{KeyValueStore, WriteOp};
use crate::error::StoreError;

/// Atomic token-bucket check-and-update.
///
/// `KEYS[1]` bucket hash; `ARGV` = now (ms), rate (tokens/s), burst,
/// idle TTL (ms). Returns 1 when a token was taken, 0 otherwise. Must stay
/// in step with [`crate::domain::TokenBucket::take`].
const TOKEN_BUCKET_LUA: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local burst = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])
local state = redis.call('HMGET', key, 'tokens', 'ts')
local tokens = tonumber(state[1])
local last = tonumber(state[2])
if tokens == nil or last == nil then
  tokens = burst
  last = now
end
local elapsed = math.max(0, now - last)
tokens = math.min(burst, tokens + elapsed * rate / 1000)
local allowed = 0
if tokens >= 1 then
  tokens = tokens - 1
  allowed = 1
end
redis.call('HSET', key, 'tokens', tostring(tokens), 'ts', tostring(math.max(last, now)))
if ttl > 0 then
  redis.call('PEXPIRE', key, ttl)
end
return allowed
";

/// Redis-backed shared store.
pub struct RedisStore {
    conn: ConnectionManager,
    command_timeout: Duration,
    token_bucket: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the Redis server at `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the URL is invalid or the first
    /// connection cannot be established within `command_timeout`.
    pub async fn connect(url: &str, command_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(command_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(millis(command_timeout)))??;
        Ok(Self {
            conn,
            command_timeout,
            token_bucket: Script::new(TOKEN_BUCKET_LUA),
        })
    }

    /// Awaits a command under the configured deadline.
    async fn run<T>(&self, command: impl Future<Output = RedisResult<T>>) -> Result<T, StoreError> {
        tokio::time::timeout(self.command_timeout, command)
            .await
            .map_err(|_| StoreError::Timeout(millis(self.command_timeout)))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: redis::Value = self.run(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl).max(1));
        }
        let _: redis::Value = self.run(cmd.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl).max(1));
        let reply: redis::Value = self.run(cmd.query_async(&mut conn)).await?;
        Ok(!matches!(reply, redis::Value::Nil))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        self.run(conn.del(keys)).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        self.run(conn.hgetall(key)).await
    }

    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("HGETALL").arg(key.as_str());
        }
        self.run(pipe.query_async(&mut conn)).await
    }

    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        let Some((start, stop)) = rank_bounds(start, stop) else {
            return Ok(Vec::new());
        };
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("ZREVRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.run(cmd.query_async(&mut conn)).await
    }

    async fn sorted_set_remove_below(&self, key: &str, cutoff: f64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("ZREMRANGEBYSCORE");
        cmd.arg(key).arg("-inf").arg(format!("({cutoff}"));
        self.run(cmd.query_async(&mut conn)).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(1000);
            let (next, batch): (u64, Vec<String>) = self.run(cmd.query_async(&mut conn)).await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for op in ops {
            match op {
                WriteOp::HashSet { key, fields } => {
                    pipe.cmd("HSET").arg(key).arg(fields).ignore();
                }
                WriteOp::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE").arg(key).arg(millis(ttl).max(1)).ignore();
                }
                WriteOp::SortedSetAdd { key, member, score } => {
                    pipe.cmd("ZADD").arg(key).arg(score).arg(member).ignore();
                }
            }
        }
        let _: () = self.run(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn take_token(
        &self,
        key: &str,
        now_ms: i64,
        rate_per_sec: f64,
        burst: f64,
        idle_ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.token_bucket.key(key);
        invocation
            .arg(now_ms)
            .arg(rate_per_sec)
            .arg(burst)
            .arg(millis(idle_ttl));
        let allowed: i64 = self.run(invocation.invoke_async(&mut conn)).await?;
        Ok(allowed == 1)
    }
}

/// Converts a rank window to the signed range Redis accepts. `None` when
/// `start` is past every possible rank; `stop` saturates.
fn rank_bounds(start: usize, stop: usize) -> Option<(i64, i64)> {
    let start = i64::try_from(start).ok()?;
    Some((start, i64::try_from(stop).unwrap_or(i64::MAX)))
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
