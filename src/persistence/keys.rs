//! Store key layout.
//!
//! | Key                   | Type       | Content                          |
//! |-----------------------|------------|----------------------------------|
//! | `token:<address>`     | hash       | one [`crate::domain::TokenRecord`] |
//! | `z:tokens:latest`     | sorted set | all-chain recency index          |
//! | `z:<chain>:latest`    | sorted set | per-chain recency index          |
//! | `dex:latest:etag`     | string     | upstream validation token        |
//! | `rl:<identity>`       | hash       | token bucket (`tokens`, `ts`)    |
//! | `idem:<token>`        | string     | idempotency lock placeholder     |

/// Upstream validation token (ETag) of the last applied feed body.
pub const FEED_ETAG: &str = "dex:latest:etag";

/// All-chain recency index.
pub const LATEST_ALL: &str = "z:tokens:latest";

/// Glob matching every token record hash.
pub const TOKEN_PATTERN: &str = "token:*";

/// Glob matching every recency index, the all-chain one included.
pub const INDEX_PATTERN: &str = "z:*:latest";

/// Hash key of a token record.
#[must_use]
pub fn token(address: &str) -> String {
    format!("token:{address}")
}

/// Recency index of one chain.
#[must_use]
pub fn latest_for_chain(chain: &str) -> String {
    format!("z:{chain}:latest")
}

/// Token bucket of one rate-limited identity.
#[must_use]
pub fn rate_limit(identity: &str) -> String {
    format!("rl:{identity}")
}

/// Idempotency lock for a client-supplied token.
#[must_use]
pub fn idempotency(token: &str) -> String {
    format!("idem:{token}")
}
