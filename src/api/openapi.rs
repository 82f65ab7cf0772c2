//! `OpenAPI` document for the served HTTP surface.

use utoipa::OpenApi;

use crate::api::dto::{CreateTokenRequest, TokenProfileDto};
use crate::api::handlers;
use crate::domain::TokenLink;
use crate::error::{ErrorBody, ErrorResponse};

/// `OpenAPI` documentation for the gateway.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "dexfeed-gateway",
        description = "Mirror of the latest token-profile feed, with per-client rate limiting and idempotent writes"
    ),
    paths(
        handlers::feed::latest_profiles,
        handlers::feed::latest_by_chain,
        handlers::feed::feed_latest,
        handlers::tokens::get_token,
        handlers::tokens::list_tokens,
        handlers::tokens::create_token,
        handlers::system::healthz,
        handlers::system::readyz,
    ),
    components(schemas(
        TokenProfileDto,
        TokenLink,
        CreateTokenRequest,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Feed", description = "Feed-compatible listings of the mirrored chain"),
        (name = "Tokens", description = "Token lookup, listing and manual create"),
        (name = "System", description = "Liveness and readiness"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/token-profiles/latest/v1",
            "/token-profiles/latest/by-chain",
            "/feed/latest",
            "/tokens",
            "/tokens/{address}",
            "/healthz",
            "/readyz",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
