//! Public token profile shape and listing parameters.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{TokenLink, TokenRecord};

/// Page size used when `limit` is absent or invalid.
pub const DEFAULT_LIMIT: usize = 50;

/// Largest accepted `limit`.
pub const MAX_LIMIT: usize = 200;

/// Token profile as served to clients, in the upstream feed's shape.
///
/// Empty optional fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenProfileDto {
    /// Display URL of the profile page.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// Chain identifier.
    pub chain_id: String,
    /// Token address.
    pub token_address: String,
    /// Icon image URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    /// Header image URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub header: String,
    /// Open-graph image URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub open_graph: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Social and web links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<TokenLink>,
}

impl From<TokenRecord> for TokenProfileDto {
    fn from(record: TokenRecord) -> Self {
        Self {
            url: record.url,
            chain_id: record.chain_id,
            token_address: record.token_address,
            icon: record.icon,
            header: record.header,
            open_graph: record.open_graph,
            description: record.description,
            links: record.links,
        }
    }
}

/// Converts records to their public shape, preserving order.
#[must_use]
pub fn profiles(records: Vec<TokenRecord>) -> Vec<TokenProfileDto> {
    records.into_iter().map(TokenProfileDto::from).collect()
}

/// `limit`/`offset` query parameters for listings.
///
/// Values are kept as raw strings so that an unparsable value falls back to
/// its default instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Page size, 1 to 200. Anything else means 50.
    #[param(value_type = Option<u32>, minimum = 1, maximum = 200)]
    pub limit: Option<String>,
    /// Number of entries to skip. Defaults to 0.
    #[param(value_type = Option<u32>)]
    pub offset: Option<String>,
}

impl ListParams {
    /// Effective page size.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| (1..=MAX_LIMIT).contains(n))
            .unwrap_or(DEFAULT_LIMIT)
    }

    /// Effective offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Request body for `POST /tokens`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    /// Chain identifier. Required.
    #[serde(default)]
    pub chain_id: String,
    /// Token address. Required.
    #[serde(default)]
    pub token_address: String,
    /// Display URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Icon image URL.
    #[serde(default)]
    pub icon: Option<String>,
    /// Header image URL.
    #[serde(default)]
    pub header: Option<String>,
    /// Open-graph image URL.
    #[serde(default)]
    pub open_graph: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateTokenRequest {
    /// Builds the record to store: no links, no last-seen time.
    #[must_use]
    pub fn into_record(self) -> TokenRecord {
        TokenRecord {
            chain_id: self.chain_id.trim().to_string(),
            token_address: self.token_address.trim().to_string(),
            url: self.url.unwrap_or_default(),
            icon: self.icon.unwrap_or_default(),
            header: self.header.unwrap_or_default(),
            open_graph: self.open_graph.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            links: Vec::new(),
            last_seen_ms: None,
        }
    }
}
