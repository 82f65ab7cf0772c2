//! Store double whose every command fails, for error-path tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use super::{KeyValueStore, WriteOp};
use crate::error::StoreError;

/// A store that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStore;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Timeout(0))
}

#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn ping(&self) -> Result<(), StoreError> {
        down()
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        down()
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        down()
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<bool, StoreError> {
        down()
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, StoreError> {
        down()
    }

    async fn hash_get_all(&self, _key: &str) -> Result<HashMap<String, String>, StoreError> {
        down()
    }

    async fn hash_get_all_many(
        &self,
        _keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, StoreError> {
        down()
    }

    async fn sorted_set_rev_range(
        &self,
        _key: &str,
        _start: usize,
        _stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        down()
    }

    async fn sorted_set_remove_below(&self, _key: &str, _cutoff: f64) -> Result<u64, StoreError> {
        down()
    }

    async fn scan_keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
        down()
    }

    async fn apply_batch(&self, _ops: Vec<WriteOp>) -> Result<(), StoreError> {
        down()
    }

    async fn take_token(
        &self,
        _key: &str,
        _now_ms: i64,
        _rate_per_sec: f64,
        _burst: f64,
        _idle_ttl: Duration,
    ) -> Result<bool, StoreError> {
        down()
    }
}
