//! Process-local [`KeyValueStore`].
//!
//! Mirrors the Redis semantics the gateway relies on: TTL expiry (lazy on
//! read, plus a periodic sweep on writes), typed values, descending-score
//! ranges with reverse-lexicographic ties, and glob key enumeration. All
//! state sits behind one async mutex, so every trait method (including
//! [`KeyValueStore::take_token`]) is atomic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KeyValueStore, WriteOp};
use crate::domain::TokenBucket;
use crate::error::StoreError;

const BUCKET_TOKENS: &str = "tokens";
const BUCKET_TS: &str = "ts";

/// Writes between two sweeps of expired entries.
const SWEEP_EVERY: u32 = 256;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    SortedSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    writes: u32,
}

/// Expiry instant for `ttl` from now. A TTL past the clock's range never
/// expires.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

impl State {
    /// Drops every expired entry.
    fn sweep(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at.is_none_or(|at| at > now));
    }

    /// Counts one write and sweeps when the interval is reached.
    fn note_write(&mut self) {
        self.writes += 1;
        if self.writes >= SWEEP_EVERY {
            self.writes = 0;
            self.sweep();
        }
    }

    /// Returns the live entry at `key`, dropping it first if it expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn hash(&mut self, key: &str) -> Result<Option<&mut HashMap<String, String>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(map),
                ..
            }) => Ok(Some(map)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn sorted_set(&mut self, key: &str) -> Result<Option<&mut HashMap<String, f64>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::SortedSet(set),
                ..
            }) => Ok(Some(set)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn hash_or_insert(&mut self, key: &str) -> Result<&mut HashMap<String, String>, StoreError> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        self.hash(key)?
            .ok_or_else(|| StoreError::WrongType(key.to_string()))
    }

    fn sorted_set_or_insert(&mut self, key: &str) -> Result<&mut HashMap<String, f64>, StoreError> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::SortedSet(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        self.sorted_set(key)?
            .ok_or_else(|| StoreError::WrongType(key.to_string()))
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        if let Some(entry) = self.live(key) {
            entry.expires_at = deadline(ttl);
        }
    }

    fn apply(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::HashSet { key, fields } => {
                self.hash_or_insert(&key)?.extend(fields);
            }
            WriteOp::Expire { key, ttl } => self.expire(&key, ttl),
            WriteOp::SortedSetAdd { key, member, score } => {
                self.sorted_set_or_insert(&key)?.insert(member, score);
            }
        }
        Ok(())
    }
}

/// In-memory store with Redis-compatible behavior for the primitives the
/// gateway uses.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut state = self.state.lock().await;
        match state.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.note_write();
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.and_then(deadline),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.note_write();
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: deadline(ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut removed = 0;
        for key in keys {
            if state.live(key).is_some() {
                state.entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.hash(key)?.cloned().unwrap_or_default())
    }

    async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        let mut state = self.state.lock().await;
        keys.iter()
            .map(|key| Ok(state.hash(key)?.cloned().unwrap_or_default()))
            .collect()
    }

    async fn sorted_set_rev_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(set) = state.sorted_set(key)? else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(&String, f64)> = set.iter().map(|(m, s)| (m, *s)).collect();
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(a.0)));
        Ok(members
            .into_iter()
            .skip(start)
            .take(stop.saturating_sub(start).saturating_add(1))
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn sorted_set_remove_below(&self, key: &str, cutoff: f64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let Some(set) = state.sorted_set(key)? else {
            return Ok(0);
        };
        let before = set.len();
        set.retain(|_, score| *score >= cutoff);
        let removed = before - set.len();
        if set.is_empty() {
            state.entries.remove(key);
        }
        Ok(removed as u64)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock().await;
        state.sweep();
        let mut keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| glob_match(pattern.as_bytes(), k.as_bytes()))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.note_write();
        for op in ops {
            state.apply(op)?;
        }
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
        let mut state = self.state.lock().await;
        state.note_write();
        let bucket = state.hash_or_insert(key)?;
        let prior = match (bucket.get(BUCKET_TOKENS), bucket.get(BUCKET_TS)) {
            (Some(tokens), Some(ts)) => tokens
                .parse()
                .ok()
                .zip(ts.parse().ok())
                .map(|(tokens, last_refill_ms)| TokenBucket {
                    tokens,
                    last_refill_ms,
                }),
            _ => None,
        };
        let (next, allowed) = TokenBucket::take(prior, now_ms, rate_per_sec, burst);
        bucket.insert(BUCKET_TOKENS.to_string(), next.tokens.to_string());
        bucket.insert(BUCKET_TS.to_string(), next.last_refill_ms.to_string());
        if !idle_ttl.is_zero() {
            state.expire(key, idle_ttl);
        }
        Ok(allowed)
    }
}

/// Redis-style glob matching supporting `*` and `?`.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.split_first(), text.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => {
            glob_match(rest, text)
                || text
                    .split_first()
                    .is_some_and(|(_, tail)| glob_match(pattern, tail))
        }
        (Some((b'?', rest)), Some((_, text_rest))) => glob_match(rest, text_rest),
        (Some((p, rest)), Some((t, text_rest))) if p == t => glob_match(rest, text_rest),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn add(key: &str, member: &str, score: f64) -> WriteOp {
        WriteOp::SortedSetAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn set_if_absent_only_writes_once() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        assert!(matches!(store.set_if_absent("k", "1", ttl).await, Ok(true)));
        assert!(matches!(store.set_if_absent("k", "2", ttl).await, Ok(false)));
        assert!(matches!(store.get("k").await, Ok(Some(v)) if v == "1"));
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let store = MemoryStore::new();
        let _ = store.set("k", "v", Some(Duration::from_secs(5))).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(store.get("k").await, Ok(Some(_))));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(store.get("k").await, Ok(None)));
        assert!(matches!(
            store.set_if_absent("k", "again", Duration::from_secs(5)).await,
            Ok(true)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_buckets_are_swept_by_later_writes() {
        let store = MemoryStore::new();
        let idle = Duration::from_secs(3);
        for client in 0..10_000 {
            let key = format!("rl:10.0.{}.{}", client / 256, client % 256);
            let _ = store.take_token(&key, 0, 5.0, 10.0, idle).await;
        }
        assert_eq!(store.entry_count().await, 10_000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        for step in 0..1_000 {
            let _ = store
                .take_token("rl:192.0.2.1", 3_600_000 + step, 5.0, 10.0, idle)
                .await;
        }
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn ttl_beyond_the_clock_range_never_expires() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_if_absent("idem:k", "1", Duration::MAX).await,
            Ok(true)
        ));
        let _ = store.set("k", "v", Some(Duration::MAX)).await;
        let _ = store
            .apply_batch(vec![WriteOp::Expire {
                key: "k".to_string(),
                ttl: Duration::MAX,
            }])
            .await;
        assert!(matches!(store.get("k").await, Ok(Some(v)) if v == "v"));
        assert!(matches!(store.get("idem:k").await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn rev_range_orders_by_score_then_member() {
        let store = MemoryStore::new();
        let ops = vec![
            add("z", "a", 1.0),
            add("z", "b", 3.0),
            add("z", "c", 3.0),
            add("z", "d", 2.0),
        ];
        let _ = store.apply_batch(ops).await;

        let Ok(all) = store.sorted_set_rev_range("z", 0, 10).await else {
            panic!("range failed");
        };
        assert_eq!(all, vec!["c", "b", "d", "a"]);

        let Ok(page) = store.sorted_set_rev_range("z", 1, 2).await else {
            panic!("range failed");
        };
        assert_eq!(page, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn re_adding_a_member_moves_it() {
        let store = MemoryStore::new();
        let _ = store.apply_batch(vec![add("z", "a", 1.0), add("z", "b", 2.0)]).await;
        let _ = store.apply_batch(vec![add("z", "a", 3.0)]).await;
        let Ok(all) = store.sorted_set_rev_range("z", 0, 10).await else {
            panic!("range failed");
        };
        assert_eq!(all, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn remove_below_is_strict() {
        let store = MemoryStore::new();
        let _ = store
            .apply_batch(vec![add("z", "old", 10.0), add("z", "edge", 20.0), add("z", "new", 30.0)])
            .await;
        assert!(matches!(store.sorted_set_remove_below("z", 20.0).await, Ok(1)));
        let Ok(all) = store.sorted_set_rev_range("z", 0, 10).await else {
            panic!("range failed");
        };
        assert_eq!(all, vec!["new", "edge"]);
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let store = MemoryStore::new();
        let _ = store.set("s", "v", None).await;
        assert!(matches!(
            store.hash_get_all("s").await,
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(
            store.sorted_set_rev_range("s", 0, 1).await,
            Err(StoreError::WrongType(_))
        ));
    }

    #[tokio::test]
    async fn scan_keys_matches_globs() {
        let store = MemoryStore::new();
        let _ = store.set("token:a", "1", None).await;
        let _ = store.set("token:b", "1", None).await;
        let _ = store.set("rl:1.2.3.4", "1", None).await;
        let Ok(keys) = store.scan_keys("token:*").await else {
            panic!("scan failed");
        };
        assert_eq!(keys, vec!["token:a", "token:b"]);
        let Ok(keys) = store.scan_keys("rl:?.2.3.4").await else {
            panic!("scan failed");
        };
        assert_eq!(keys, vec!["rl:1.2.3.4"]);
    }

    #[test]
    fn glob_edge_cases() {
        assert!(glob_match(b"*", b""));
        assert!(glob_match(b"a*c", b"abbbc"));
        assert!(!glob_match(b"a*c", b"abbb"));
        assert!(!glob_match(b"?", b""));
    }
}
