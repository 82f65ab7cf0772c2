//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::middleware::{IdempotencyGuard, RateLimiter};
use crate::persistence::KeyValueStore;
use crate::service::TokenRepository;

/// Shared application state available to all handlers and middleware via
/// Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GatewayConfig>,
    /// Shared key-value store.
    pub store: Arc<dyn KeyValueStore>,
    /// Read side over the mirrored records.
    pub tokens: Arc<TokenRepository>,
    /// Per-client admission control.
    pub rate_limiter: Arc<RateLimiter>,
    /// Duplicate-request suppression.
    pub idempotency: Arc<IdempotencyGuard>,
}

impl AppState {
    /// Wires every component over one store.
    #[must_use]
    pub fn new(config: GatewayConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let tokens = TokenRepository::new(Arc::clone(&store));
        let rate_limiter = RateLimiter::new(
            Arc::clone(&store),
            config.rate_limit_rps,
            config.rate_limit_burst,
        );
        let idempotency = IdempotencyGuard::new(Arc::clone(&store), config.idempotency_ttl());
        Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
            rate_limiter: Arc::new(rate_limiter),
            idempotency: Arc::new(idempotency),
        }
    }
}
