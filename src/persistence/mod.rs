//! Persistence layer: the shared key-value store.
//!
//! Provides the [`KeyValueStore`] trait with the primitives the gateway
//! needs (strings with TTL, hashes, sorted sets, key enumeration, batched
//! writes and the atomic token-bucket script). The store is the only
//! synchronization point between requests and between processes; nothing
//! above this layer holds in-process locks.
//!
//! Two implementations exist: [`RedisStore`] for deployments and
//! [`MemoryStore`] for tests and single-process development runs.

pub mod keys;
pub mod memory;
pub mod models;
pub mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// One write inside a [`KeyValueStore::apply_batch`] call.
///
/// Each operation is atomic on its own key; a batch as a whole is not.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Set the given hash fields, leaving other fields untouched.
    HashSet {
        /// Hash key.
        key: String,
        /// Field/value pairs to write.
        fields: Vec<(String, String)>,
    },
    /// Set a key's time to live.
    Expire {
        /// Target key.
        key: String,
        /// Time to live from now.
        ttl: Duration,
    },
    /// Insert a sorted-set member or update its score in place.
    SortedSetAdd {
        /// Sorted-set key.
        key: String,
        /// Member to upsert.
        member: String,
        /// New score.
        score: f64,
    },
}

/// Async client for the shared key-value store.
///
/// Every method is a suspension point and is cancelled by dropping the
/// future (request deadline or shutdown).
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Checks that the store answers.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store is unreachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Reads a string value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure or a non-string key.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a string value, with an optional TTL.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Writes a string value with a TTL only if the key does not exist.
    ///
    /// Returns `true` if the value was written.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Deletes keys, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Reads all fields of a hash. A missing key yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure or a non-hash key.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Reads all fields of several hashes in one round trip, in key order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure or a non-hash key.
    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError>;

    /// Returns sorted-set members by descending score, for ranks
    /// `start..=stop` (both zero-based and inclusive).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure or a non-sorted-set key.
    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Removes sorted-set members with a score strictly below `cutoff`,
    /// returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure or a non-sorted-set key.
    async fn sorted_set_remove_below(&self, key: &str, cutoff: f64) -> Result<u64, StoreError>;

    /// Enumerates keys matching a glob pattern (`*` and `?` wildcards).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Submits several writes in one round trip.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if submission fails. Some writes may have
    /// been applied already; nothing is rolled back.
    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Atomically refills the token bucket stored at `key` and tries to
    /// take one token (see [`crate::domain::TokenBucket::take`]), then
    /// sets the bucket's TTL to `idle_ttl`.
    ///
    /// Returns `true` if a token was taken.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure. Callers must treat an
    /// error as a rejection, never as an admission.
    async fn take_token(
        &self,
        key: &str,
        now_ms: i64,
        rate_per_sec: f64,
        burst: f64,
        idle_ttl: Duration,
    ) -> Result<bool, StoreError>;
}
