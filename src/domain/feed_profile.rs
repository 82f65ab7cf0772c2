//! Upstream feed wire shapes.
//!
//! The feed answers either with a bare JSON array of profiles or with an
//! object wrapping the array in a `profiles` field. [`FeedBody`] accepts
//! both. Items are decoded one by one so a single malformed profile does
//! not reject the page.

use serde::Deserialize;
use serde_json::Value;

use super::token_record::{TokenLink, TokenRecord, null_as_default};
use crate::error::GatewayError;

/// One profile object as published by the upstream feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedProfile {
    /// Display URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Chain identifier.
    #[serde(default, deserialize_with = "null_as_default")]
    pub chain_id: String,
    /// Token address.
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_address: String,
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
    /// Link list; `null` and missing both mean empty.
    #[serde(default)]
    pub links: Option<Vec<TokenLink>>,
}

impl FeedProfile {
    /// Converts the profile into a full record observed at `seen_at_ms`,
    /// normalizing the link list.
    #[must_use]
    pub fn into_record(self, seen_at_ms: i64) -> TokenRecord {
        TokenRecord {
            chain_id: self.chain_id,
            token_address: self.token_address,
            url: self.url.unwrap_or_default(),
            icon: self.icon.unwrap_or_default(),
            header: self.header.unwrap_or_default(),
            open_graph: self.open_graph.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            links: self
                .links
                .unwrap_or_default()
                .into_iter()
                .map(TokenLink::normalized)
                .collect(),
            last_seen_ms: Some(seen_at_ms),
        }
    }
}

/// Response body of the upstream feed, in either accepted shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeedBody {
    /// Bare array of profile objects.
    List(Vec<Value>),
    /// Object with a `profiles` array.
    Wrapped {
        /// The wrapped profile objects.
        profiles: Vec<Value>,
    },
}

/// Profiles decoded from one feed body.
#[derive(Debug, Default)]
pub struct DecodedFeed {
    /// Profiles that decoded, in feed order.
    pub profiles: Vec<FeedProfile>,
    /// Items that were not a valid profile object.
    pub undecodable: usize,
}

impl FeedBody {
    /// Parses a raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MalformedPayload`] when the body is neither
    /// a profile array nor an object with a `profiles` array.
    pub fn parse(raw: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice(raw).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
    }

    /// Decodes each item, keeping feed order and counting the items that
    /// are not a profile object.
    #[must_use]
    pub fn into_profiles(self) -> DecodedFeed {
        let (Self::List(items) | Self::Wrapped { profiles: items }) = self;
        let mut decoded = DecodedFeed::default();
        for item in items {
            match serde_json::from_value::<FeedProfile>(item) {
                Ok(profile) => decoded.profiles.push(profile),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping undecodable feed item");
                    decoded.undecodable += 1;
                }
            }
        }
        decoded
    }
}
