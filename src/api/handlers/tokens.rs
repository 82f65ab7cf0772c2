//! Token handlers: lookup by address, all-chain listing, manual create.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{CreateTokenRequest, ListParams, TokenProfileDto, profiles};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /tokens/{address}`: Look up one token profile.
///
/// # Errors
///
/// Returns [`GatewayError::TokenNotFound`] if no record exists for the
/// address.
#[utoipa::path(
    get,
    path = "/tokens/{address}",
    tag = "Tokens",
    summary = "Get a token profile",
    description = "Returns the stored profile for a token address on any chain.",
    params(
        ("address" = String, Path, description = "Token address"),
    ),
    responses(
        (status = 200, description = "Token profile", body = TokenProfileDto),
        (status = 404, description = "No record for this address", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    )
)]
pub async fn get_token(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<TokenProfileDto>, GatewayError> {
    let record = state
        .tokens
        .get_by_address(&address)
        .await?
        .ok_or(GatewayError::TokenNotFound(address))?;
    Ok(Json(record.into()))
}

/// `GET /tokens`: Most recently seen tokens across all chains.
///
/// # Errors
///
/// Returns [`GatewayError::Store`] if the store could not be read.
#[utoipa::path(
    get,
    path = "/tokens",
    tag = "Tokens",
    summary = "List latest tokens",
    description = "Returns token profiles from every chain, most recently seen first.",
    params(ListParams),
    responses(
        (status = 200, description = "Token profiles", body = Vec<TokenProfileDto>),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    )
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TokenProfileDto>>, GatewayError> {
    let records = state
        .tokens
        .list_latest(params.offset(), params.limit())
        .await?;
    Ok(Json(profiles(records)))
}

/// `POST /tokens`: Store a token profile by hand.
///
/// The record expires like an ingested one but is not listed in the
/// recency indexes.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when the chain id or address
/// is missing.
#[utoipa::path(
    post,
    path = "/tokens",
    tag = "Tokens",
    summary = "Create a token profile",
    description = "Writes a profile with the given fields and no links. Send an `Idempotency-Key` header to suppress duplicates.",
    request_body = CreateTokenRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Client-chosen key for duplicate suppression"),
    ),
    responses(
        (status = 201, description = "Profile stored", body = TokenProfileDto),
        (status = 400, description = "Missing chain id or address", body = ErrorResponse),
        (status = 409, description = "Duplicate request in flight", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    )
)]
pub async fn create_token(
    State(state): State<AppState>,
    Json(req): Json<CreateTokenRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let created = state
        .tokens
        .create(req.into_record(), state.config.token_ttl())
        .await?;
    Ok((StatusCode::CREATED, Json(TokenProfileDto::from(created))))
}

/// Token routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(list_tokens).post(create_token))
        .route("/tokens/{address}", get(get_token))
}
