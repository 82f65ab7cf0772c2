//! Feed-compatible listings for the configured chain.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ListParams, TokenProfileDto, profiles};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /token-profiles/latest/v1`: Drop-in replacement for the upstream
/// endpoint: the first page of the configured chain.
///
/// # Errors
///
/// Returns [`GatewayError::Store`] if the store could not be read.
#[utoipa::path(
    get,
    path = "/token-profiles/latest/v1",
    tag = "Feed",
    summary = "Latest token profiles",
    description = "Same shape as the upstream feed: a JSON array of the most recently seen profiles on the mirrored chain.",
    responses(
        (status = 200, description = "Token profiles", body = Vec<TokenProfileDto>),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    )
)]
pub async fn latest_profiles(
    State(state): State<AppState>,
) -> Result<Json<Vec<TokenProfileDto>>, GatewayError> {
    let records = state
        .tokens
        .list_latest_by_chain(&state.config.poller_chain, 0, state.config.feed_page_size)
        .await?;
    Ok(Json(profiles(records)))
}

/// `GET /token-profiles/latest/by-chain`: Paginated listing of the
/// configured chain. Only one chain is mirrored, so no chain parameter is
/// read.
///
/// # Errors
///
/// Returns [`GatewayError::Store`] if the store could not be read.
#[utoipa::path(
    get,
    path = "/token-profiles/latest/by-chain",
    tag = "Feed",
    summary = "Latest token profiles, paginated",
    params(ListParams),
    responses(
        (status = 200, description = "Token profiles", body = Vec<TokenProfileDto>),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    )
)]
pub async fn latest_by_chain(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TokenProfileDto>>, GatewayError> {
    let records = state
        .tokens
        .list_latest_by_chain(&state.config.poller_chain, params.offset(), params.limit())
        .await?;
    Ok(Json(profiles(records)))
}

/// `GET /feed/latest`: All-chain listing.
///
/// # Errors
///
/// Returns [`GatewayError::Store`] if the store could not be read.
#[utoipa::path(
    get,
    path = "/feed/latest",
    tag = "Feed",
    summary = "Latest tokens on all chains",
    params(ListParams),
    responses(
        (status = 200, description = "Token profiles", body = Vec<TokenProfileDto>),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    )
)]
pub async fn feed_latest(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TokenProfileDto>>, GatewayError> {
    let records = state
        .tokens
        .list_latest(params.offset(), params.limit())
        .await?;
    Ok(Json(profiles(records)))
}

/// Feed routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/token-profiles/latest/v1", get(latest_profiles))
        .route("/token-profiles/latest/by-chain", get(latest_by_chain))
        .route("/feed/latest", get(feed_latest))
}
