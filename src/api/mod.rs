//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Every route sits behind the same admission stack. A request is first
//! charged against its client's rate-limit bucket, then takes its
//! idempotency lock (if it carries a key), then reaches the handler.

pub mod dto;
pub mod handlers;
pub mod openapi;

use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn_with_state;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::middleware::idempotency::idempotency_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;

/// Builds the router with all REST endpoints, without middleware.
pub fn build_router() -> Router<AppState> {
    Router::new().merge(handlers::routes())
}

/// Builds the complete application: routes, admission middleware, request
/// deadline, tracing, CORS and (with the `swagger-ui` feature) the API docs.
pub fn build_app(state: AppState) -> Router {
    let deadline = Duration::from_secs(state.config.request_timeout_secs);

    // Last layer added runs first.
    let router = build_router()
        .layer(from_fn_with_state(state.clone(), idempotency_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(TimeoutLayer::new(deadline))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    router.with_state(state)
}
