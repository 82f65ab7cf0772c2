//! Token record: the locally mirrored profile of one (chain, address) pair.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

/// A single social or web link attached to a token profile.
///
/// Serialized in the upstream shape: `{"type": .., "label": .., "url": ..}`
/// with `label` omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenLink {
    /// Link category (e.g. `"twitter"`, `"telegram"`, `"website"`).
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub link_type: String,
    /// Optional display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Target URL.
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

/// Reads an explicit `null` as the type's default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl TokenLink {
    /// Drops an empty label so it is omitted on output.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            label: self.label.filter(|label| !label.is_empty()),
            ..self
        }
    }
}

/// Full record stored for one token address.
///
/// Always written whole: an ingestion pass that observes the address
/// replaces every field, there is no field-level merge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenRecord {
    /// Chain identifier (e.g. `"solana"`).
    pub chain_id: String,
    /// Token address, the natural key.
    pub token_address: String,
    /// Display URL of the profile page.
    pub url: String,
    /// Icon image URL.
    pub icon: String,
    /// Header image URL.
    pub header: String,
    /// Open-graph image URL.
    pub open_graph: String,
    /// Free-text description.
    pub description: String,
    /// Ordered link list.
    pub links: Vec<TokenLink>,
    /// Last time an ingestion pass observed the record, in ms since epoch.
    /// `None` for records created through the manual create endpoint.
    pub last_seen_ms: Option<i64>,
}
