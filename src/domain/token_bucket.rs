//! Token bucket refill arithmetic.
//!
//! This is the reference form of the check-and-update that the store runs
//! atomically (a Lua script on Redis, a locked section in memory). Both
//! backends must produce exactly the transitions defined here.

/// Persisted bucket state for one identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    /// Available tokens, never above the burst capacity.
    pub tokens: f64,
    /// Time of the last refill, in ms since epoch. Never moves backwards.
    pub last_refill_ms: i64,
}

impl TokenBucket {
    /// A full bucket refilled at `now_ms`.
    #[must_use]
    pub const fn full(burst: f64, now_ms: i64) -> Self {
        Self {
            tokens: burst,
            last_refill_ms: now_ms,
        }
    }

    /// Refills `prior` (or a full bucket when there is no prior state) up
    /// to `now_ms` and tries to take one token.
    ///
    /// Returns the state to persist and whether the call was admitted.
    /// A rejected call still persists the refilled, undecremented state.
    #[must_use]
    pub fn take(prior: Option<Self>, now_ms: i64, rate_per_sec: f64, burst: f64) -> (Self, bool) {
        let prior = prior.unwrap_or_else(|| Self::full(burst, now_ms));
        let elapsed_ms = now_ms.saturating_sub(prior.last_refill_ms).max(0);
        #[allow(clippy::cast_precision_loss)]
        let refilled = (prior.tokens + elapsed_ms as f64 * rate_per_sec / 1000.0).min(burst);
        let last_refill_ms = prior.last_refill_ms.max(now_ms);

        if refilled < 1.0 {
            (
                Self {
                    tokens: refilled,
                    last_refill_ms,
                },
                false,
            )
        } else {
            (
                Self {
                    tokens: refilled - 1.0,
                    last_refill_ms,
                },
                true,
            )
        }
    }
}
