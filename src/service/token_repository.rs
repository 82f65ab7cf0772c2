//! Read side of the mirror: point lookups and recency-ordered listings.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::TokenRecord;
use crate::error::GatewayError;
use crate::persistence::models::{record_from_fields, record_to_fields};
use crate::persistence::{KeyValueStore, WriteOp, keys};

/// Resolves recency indexes and record hashes into [`TokenRecord`]s.
///
/// Index reads and hash reads are two separate round trips with no lock in
/// between. A record that expires in that gap is skipped, and one rewritten
/// by the poller in that gap is returned with its new fields.
#[derive(Debug, Clone)]
pub struct TokenRepository {
    store: Arc<dyn KeyValueStore>,
}

impl TokenRepository {
    /// Creates a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Looks up one record by token address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] if the store could not be read.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<TokenRecord>, GatewayError> {
        let fields = self.store.hash_get_all(&keys::token(address)).await?;
        Ok(record_from_fields(fields))
    }

    /// Lists the most recently seen records across all chains.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] if the store could not be read.
    pub async fn list_latest(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, GatewayError> {
        self.list_index(keys::LATEST_ALL, offset, limit).await
    }

    /// Lists the most recently seen records of one chain.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Store`] if the store could not be read.
    pub async fn list_latest_by_chain(
        &self,
        chain: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, GatewayError> {
        self.list_index(&keys::latest_for_chain(chain), offset, limit)
            .await
    }

    async fn list_index(
        &self,
        index: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TokenRecord>, GatewayError> {
        let Some(last) = limit.checked_sub(1) else {
            return Ok(Vec::new());
        };
        let addresses = self
            .store
            .sorted_set_rev_range(index, offset, offset.saturating_add(last))
            .await?;
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let hash_keys: Vec<String> = addresses.iter().map(|a| keys::token(a)).collect();
        let hashes = self.store.hash_get_all_many(&hash_keys).await?;

        Ok(hashes
            .into_iter()
            .filter_map(record_from_fields)
            .take(limit)
            .collect())
    }

    /// Stores a manually supplied record, replacing any existing one.
    ///
    /// The record is not added to the recency indexes; it is reachable by
    /// address only. `ttl` applies as for ingested records.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the chain id or token
    /// address is empty and [`GatewayError::Store`] if the write failed.
    pub async fn create(
        &self,
        record: TokenRecord,
        ttl: Option<Duration>,
    ) -> Result<TokenRecord, GatewayError> {
        if record.chain_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("chainId is required".into()));
        }
        if record.token_address.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "tokenAddress is required".into(),
            ));
        }

        let key = keys::token(&record.token_address);
        self.store.delete(std::slice::from_ref(&key)).await?;

        let mut ops = vec![WriteOp::HashSet {
            key: key.clone(),
            fields: record_to_fields(&record),
        }];
        if let Some(ttl) = ttl {
            ops.push(WriteOp::Expire { key, ttl });
        }
        self.store.apply_batch(ops).await?;

        tracing::info!(
            chain = %record.chain_id,
            address = %record.token_address,
            "token created"
        );
        Ok(record)
    }
}
