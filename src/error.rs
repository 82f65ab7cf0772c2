//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! [`StoreError`] covers failures of the shared key-value store and is
//! always surfaced as a server error, never as a permissive default.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "token not found: 7xKX...",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the code ranges on [`GatewayError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure of a shared key-value store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Error reported by the Redis client or server.
    #[error("redis: {0}")]
    Backend(#[from] redis::RedisError),

    /// The command did not complete within its deadline.
    #[error("store command timed out after {0} ms")]
    Timeout(u64),

    /// The key holds a value of a different type than the command expects.
    #[error("wrong value type at key {0}")]
    WrongType(String),

    /// A stored value could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(String),
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server/Upstream | 500 / 502                    |
/// | 429       | Rate limiting   | 429 Too Many Requests        |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No record exists for the requested token address.
    #[error("token not found: {0}")]
    TokenNotFound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The idempotency key is held by an in-flight or very recent request.
    #[error("duplicate request")]
    DuplicateRequest,

    /// Client exceeded rate limit.
    #[error("rate limit exceeded; retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until the client may retry.
        retry_after_ms: u64,
    },

    /// Shared store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Upstream feed unreachable or answered with a non-success status.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Upstream body matched none of the accepted shapes.
    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::TokenNotFound(_) => 2001,
            Self::DuplicateRequest => 2002,
            Self::RateLimited { .. } => 429,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::Upstream(_) => 3002,
            Self::MalformedPayload(_) => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::TokenNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateRequest => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) | Self::MalformedPayload(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = match &self {
            Self::RateLimited { retry_after_ms } => Some(retry_after_ms.div_ceil(1000).max(1)),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
