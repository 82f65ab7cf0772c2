//! Per-client token-bucket admission control.
//!
//! Bucket state lives in the shared store and is updated by one atomic
//! check-and-update per request ([`KeyValueStore::take_token`]), so
//! concurrent requests from the same client, on any gateway instance,
//! never spend the same token twice.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use crate::app_state::AppState;
use crate::error::{GatewayError, StoreError};
use crate::persistence::{KeyValueStore, keys};

/// Identity used when the peer address is unknown.
const UNKNOWN_CLIENT: &str = "unknown";

/// Longest refill time given an idle TTL (100 years). Slower buckets are
/// kept without expiry.
const MAX_IDLE_SECS: f64 = 100.0 * 365.0 * 86_400.0;

/// Token-bucket rate limiter backed by the shared store.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    rate_per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    /// Creates a limiter with the default refill rate and capacity used by
    /// [`RateLimiter::check`].
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, rate_per_sec: f64, burst: f64) -> Self {
        Self {
            store,
            rate_per_sec,
            burst,
        }
    }

    /// Admits or rejects one request from `identity` with the configured
    /// rate and burst.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the bucket could not be updated.
    pub async fn check(&self, identity: &str) -> Result<bool, StoreError> {
        self.admit(identity, self.rate_per_sec, self.burst).await
    }

    /// Admits or rejects one request from `identity`, refilling at
    /// `rate_per_sec` up to `burst` tokens.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the bucket could not be updated. The
    /// caller must not treat this as an admission.
    pub async fn admit(
        &self,
        identity: &str,
        rate_per_sec: f64,
        burst: f64,
    ) -> Result<bool, StoreError> {
        self.admit_at(identity, rate_per_sec, burst, Utc::now().timestamp_millis())
            .await
    }

    /// Same as [`RateLimiter::admit`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the bucket could not be updated.
    pub async fn admit_at(
        &self,
        identity: &str,
        rate_per_sec: f64,
        burst: f64,
        now_ms: i64,
    ) -> Result<bool, StoreError> {
        self.store
            .take_token(
                &keys::rate_limit(identity),
                now_ms,
                rate_per_sec,
                burst,
                idle_ttl(rate_per_sec, burst),
            )
            .await
    }

    /// Upper bound on the wait before a rejected client earns a token.
    #[must_use]
    pub fn retry_after_ms(&self) -> u64 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = (1000.0 / self.rate_per_sec).ceil() as u64;
        ms.max(1)
    }
}

/// How long an untouched bucket is kept: the time it takes to refill from
/// empty to full, plus one second. Past that point a missing bucket and a
/// stored one produce the same decision. [`Duration::ZERO`] (no expiry)
/// when the refill time is unbounded or beyond [`MAX_IDLE_SECS`].
fn idle_ttl(rate_per_sec: f64, burst: f64) -> Duration {
    if rate_per_sec <= 0.0 || !rate_per_sec.is_finite() {
        return Duration::ZERO;
    }
    let refill_secs = (burst / rate_per_sec).ceil().max(0.0);
    if refill_secs.is_nan() || refill_secs >= MAX_IDLE_SECS {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(refill_secs + 1.0)
}

/// Extracts the rate-limit identity (peer IP) of a request.
#[must_use]
pub fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_string(), |info| info.0.ip().to_string())
}

/// Axum middleware rejecting requests whose client bucket is empty.
///
/// # Errors
///
/// Returns [`GatewayError::RateLimited`] when the bucket is empty and
/// [`GatewayError::Store`] when the bucket could not be checked.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let identity = client_identity(&request);

    if !state.rate_limiter.check(&identity).await? {
        tracing::warn!(client = %identity, "rate limit exceeded");
        return Err(GatewayError::RateLimited {
            retry_after_ms: state.rate_limiter.retry_after_ms(),
        });
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::persistence::testing::UnavailableStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), 5.0, 10.0)
    }

    async fn admitted(limiter: &RateLimiter, identity: &str, now_ms: i64) -> bool {
        let Ok(allowed) = limiter.admit_at(identity, 5.0, 10.0, now_ms).await else {
            panic!("store failed");
        };
        allowed
    }

    #[tokio::test]
    async fn first_contact_gets_a_full_burst() {
        let limiter = limiter();
        let mut accepted = 0;
        for _ in 0..15 {
            accepted += usize::from(admitted(&limiter, "1.1.1.1", 1_000).await);
        }
        assert_eq!(accepted, 10);
    }

    #[tokio::test]
    async fn identities_have_separate_buckets() {
        let limiter = limiter();
        for _ in 0..10 {
            assert!(admitted(&limiter, "a", 0).await);
        }
        assert!(!admitted(&limiter, "a", 0).await);
        assert!(admitted(&limiter, "b", 0).await);
    }

    #[tokio::test]
    async fn tokens_accrue_with_elapsed_time() {
        let limiter = limiter();
        for _ in 0..10 {
            let _ = admitted(&limiter, "c", 0).await;
        }
        assert!(!admitted(&limiter, "c", 100).await);
        // 5 tokens/s: one token every 200 ms.
        assert!(admitted(&limiter, "c", 200).await);
        assert!(!admitted(&limiter, "c", 250).await);
    }

    #[tokio::test]
    async fn accepted_calls_never_exceed_burst_plus_refill() {
        let limiter = limiter();
        let (rate, burst) = (5.0, 10.0);
        let mut accepted = 0_u32;
        let mut now = 0_i64;
        // A client hammering every 37 ms for 30 s.
        while now <= 30_000 {
            if admitted(&limiter, "hammer", now).await {
                accepted += 1;
            }
            let window_secs = now as f64 / 1000.0;
            assert!(f64::from(accepted) <= burst + rate * window_secs + 1e-9);
            now += 37;
        }
        assert!(accepted > 100);
    }

    #[tokio::test]
    async fn concurrent_calls_never_share_the_last_token() {
        let limiter = limiter();
        for _ in 0..9 {
            let _ = admitted(&limiter, "race", 0).await;
        }
        let (a, b) = tokio::join!(
            limiter.admit_at("race", 5.0, 10.0, 0),
            limiter.admit_at("race", 5.0, 10.0, 0)
        );
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("store failed");
        };
        assert!(a ^ b, "exactly one of the two may take the last token");
    }

    #[tokio::test]
    async fn store_failure_is_an_error_not_an_admission() {
        let limiter = RateLimiter::new(Arc::new(UnavailableStore), 5.0, 10.0);
        assert!(limiter.check("x").await.is_err());
    }

    #[test]
    fn idle_ttl_covers_a_full_refill() {
        assert_eq!(idle_ttl(5.0, 10.0), Duration::from_secs(3));
        assert_eq!(idle_ttl(0.5, 10.0), Duration::from_secs(21));
        assert_eq!(idle_ttl(1.0 / 1024.0, 100.0), Duration::from_secs(102_401));
        assert_eq!(idle_ttl(1e-12, 1e9), Duration::ZERO);
        assert_eq!(idle_ttl(0.0, 10.0), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_buckets_outlive_a_day_of_idleness() {
        let limiter = limiter();
        // 2 tokens refilling at 0.00001/s: 200,000 s from empty to full.
        let (rate, burst) = (0.00001, 2.0);
        for _ in 0..2 {
            assert!(matches!(limiter.admit_at("slow", rate, burst, 0).await, Ok(true)));
        }
        tokio::time::advance(Duration::from_secs(90_000)).await;
        assert!(matches!(
            limiter.admit_at("slow", rate, burst, 90_000_000).await,
            Ok(false)
        ));
    }

    #[test]
    fn retry_after_is_one_token_interval() {
        assert_eq!(limiter().retry_after_ms(), 200);
    }
}
