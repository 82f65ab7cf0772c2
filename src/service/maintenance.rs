//! One-shot maintenance: removal of everything the mirror owns.

use crate::error::StoreError;
use crate::persistence::{KeyValueStore, keys};

/// Keys per `DEL` command.
const DELETE_CHUNK: usize = 500;

/// Deletes every token record, every recency index and the stored
/// validation token, returning how many keys existed.
///
/// Rate-limit buckets and idempotency locks are left to their TTLs.
///
/// # Errors
///
/// Returns a [`StoreError`] if enumeration or deletion fails; keys deleted
/// before the failure stay deleted.
pub async fn purge(store: &dyn KeyValueStore) -> Result<u64, StoreError> {
    let mut owned = store.scan_keys(keys::TOKEN_PATTERN).await?;
    owned.extend(store.scan_keys(keys::INDEX_PATTERN).await?);
    owned.push(keys::FEED_ETAG.to_string());

    let mut removed = 0;
    for chunk in owned.chunks(DELETE_CHUNK) {
        removed += store.delete(chunk).await?;
    }
    tracing::info!(removed, "purged mirrored state");
    Ok(removed)
}
