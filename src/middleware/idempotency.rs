//! Duplicate-request suppression keyed by the `Idempotency-Key` header.
//!
//! A client-supplied key becomes a short-lived lock in the shared store
//! (`SET NX` with a TTL). While the lock exists, any other request with the
//! same key is rejected with a conflict. The lock is released as soon as the
//! guarded request finishes; the TTL only matters when a process dies while
//! holding it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::app_state::AppState;
use crate::error::{GatewayError, StoreError};
use crate::persistence::{KeyValueStore, keys};

/// Request header carrying the idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Placeholder stored under a held key.
const LOCK_VALUE: &str = "1";

/// Store-backed mutual exclusion per idempotency key.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl IdempotencyGuard {
    /// Creates a guard whose locks expire after `ttl` if never released.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Tries to take the lock for `key` with the guard's TTL.
    ///
    /// Returns `false` when the key is already held.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store could not be reached.
    pub async fn begin(&self, key: &str) -> Result<bool, StoreError> {
        self.begin_with_ttl(key, self.ttl).await
    }

    /// Tries to take the lock for `key` with an explicit TTL.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store could not be reached.
    pub async fn begin_with_ttl(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.store
            .set_if_absent(&keys::idempotency(key), LOCK_VALUE, ttl)
            .await
    }

    /// Releases the lock for `key`, whether or not it is held.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store could not be reached.
    pub async fn end(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&[keys::idempotency(key)]).await?;
        Ok(())
    }

    /// Takes the lock for `key` as a scoped [`IdempotencyLock`].
    ///
    /// Returns `None` when the key is already held.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store could not be reached.
    pub async fn acquire(&self, key: &str) -> Result<Option<IdempotencyLock>, StoreError> {
        if !self.begin(key).await? {
            return Ok(None);
        }
        Ok(Some(IdempotencyLock {
            store: Arc::clone(&self.store),
            key: keys::idempotency(key),
            released: false,
        }))
    }
}

/// A held idempotency lock.
///
/// Call [`IdempotencyLock::release`] when the guarded work is done. If the
/// lock is dropped without a successful release (the request future was
/// cancelled, or the handler panicked), the delete is scheduled on the
/// current runtime instead.
#[derive(Debug)]
#[must_use = "an unreleased lock blocks its key until dropped"]
pub struct IdempotencyLock {
    store: Arc<dyn KeyValueStore>,
    key: String,
    released: bool,
}

impl IdempotencyLock {
    /// Store key holding the lock.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Deletes the lock.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete failed; the drop path then
    /// retries it once in the background.
    pub async fn release(mut self) -> Result<(), StoreError> {
        self.store.delete(std::slice::from_ref(&self.key)).await?;
        self.released = true;
        Ok(())
    }
}

impl Drop for IdempotencyLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.delete(std::slice::from_ref(&key)).await {
                        tracing::warn!(%key, error = %e, "idempotency lock left to expire");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%key, "no runtime to release idempotency lock; left to expire");
            }
        }
    }
}

/// Reads the idempotency key of a request.
///
/// A missing or blank header yields `None`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] if the header is not visible
/// ASCII.
pub fn idempotency_key(request: &Request) -> Result<Option<String>, GatewayError> {
    let Some(value) = request.headers().get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| {
        GatewayError::InvalidRequest(format!("{IDEMPOTENCY_HEADER} must be visible ASCII"))
    })?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// Axum middleware holding the idempotency lock around the handler.
///
/// Requests without a key pass straight through.
///
/// # Errors
///
/// Returns [`GatewayError::DuplicateRequest`] when the key is held,
/// [`GatewayError::InvalidRequest`] for an unreadable key, and
/// [`GatewayError::Store`] when the lock could not be taken.
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(key) = idempotency_key(&request)? else {
        return Ok(next.run(request).await);
    };

    let Some(lock) = state.idempotency.acquire(&key).await? else {
        tracing::warn!(%key, "duplicate request rejected");
        return Err(GatewayError::DuplicateRequest);
    };

    let response = next.run(request).await;

    if let Err(e) = lock.release().await {
        tracing::warn!(%key, error = %e, "failed to release idempotency lock");
    }
    Ok(response)
}
