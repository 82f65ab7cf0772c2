//! Request admission layers: per-client rate limiting and idempotency locks.
//!
//! Both layers keep their state in the shared store so that any number of
//! gateway instances enforce one limit and one lock per key.

pub mod idempotency;
pub mod rate_limit;

pub use idempotency::{IDEMPOTENCY_HEADER, IdempotencyGuard, IdempotencyLock};
pub use rate_limit::RateLimiter;
