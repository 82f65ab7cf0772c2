//! System endpoints: liveness and readiness.

use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /healthz`: Process liveness.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "System",
    summary = "Liveness check",
    responses(
        (status = 200, description = "Process is up", body = String),
    )
)]
pub async fn healthz() -> &'static str {
    "ok"
}

/// `GET /readyz`: Store reachability.
///
/// # Errors
///
/// Returns [`GatewayError::Store`] when the store does not answer.
#[utoipa::path(
    get,
    path = "/readyz",
    tag = "System",
    summary = "Readiness check",
    description = "Pings the shared store.",
    responses(
        (status = 200, description = "Store reachable", body = String),
        (status = 500, description = "Store unreachable", body = ErrorResponse),
    )
)]
pub async fn readyz(State(state): State<AppState>) -> Result<&'static str, GatewayError> {
    state.store.ping().await?;
    Ok("ready")
}

/// System routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
