//! HTTP client for the upstream profile feed with conditional fetch.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};

use crate::error::GatewayError;

/// Result of one conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The upstream confirmed the validation token; nothing changed.
    NotModified,
    /// A full body was returned.
    Fresh {
        /// Raw response body.
        body: Vec<u8>,
        /// Validation token sent with the body, if any.
        etag: Option<String>,
    },
}

/// Upstream feed client.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    url: String,
}

impl FeedClient {
    /// Builds a client for `url` with a whole-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the HTTP client cannot be
    /// constructed (TLS backend initialization).
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Feed URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the feed, sending `If-None-Match` when `etag` is known.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Upstream`] on transport failure, timeout, or
    /// any status other than 2xx and 304.
    pub async fn fetch(&self, etag: Option<&str>) -> Result<FetchOutcome, GatewayError> {
        let mut request = self.http.get(&self.url);
        if let Some(etag) = etag.filter(|t| !t.is_empty()) {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!("feed answered {status}")));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(FetchOutcome::Fresh {
            body: body.to_vec(),
            etag,
        })
    }
}
