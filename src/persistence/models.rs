//! Hash field mapping for stored token records.

use std::collections::HashMap;

use crate::domain::{TokenLink, TokenRecord};

const CHAIN_ID: &str = "chainId";
const TOKEN_ADDRESS: &str = "tokenAddress";
const URL: &str = "url";
const ICON: &str = "icon";
const HEADER: &str = "header";
const OPEN_GRAPH: &str = "openGraph";
const DESCRIPTION: &str = "description";
const LINKS: &str = "links";
const LAST_SEEN: &str = "last_seen";

/// Encodes a record as hash fields. Every field is always written so that
/// a rewrite replaces the previous record entirely.
#[must_use]
pub fn record_to_fields(record: &TokenRecord) -> Vec<(String, String)> {
    // A Vec of plain structs cannot fail to serialize.
    let links = serde_json::to_string(&record.links).unwrap_or_else(|_| "[]".to_string());
    let mut fields = vec![
        (CHAIN_ID.to_string(), record.chain_id.clone()),
        (TOKEN_ADDRESS.to_string(), record.token_address.clone()),
        (URL.to_string(), record.url.clone()),
        (ICON.to_string(), record.icon.clone()),
        (HEADER.to_string(), record.header.clone()),
        (OPEN_GRAPH.to_string(), record.open_graph.clone()),
        (DESCRIPTION.to_string(), record.description.clone()),
        (LINKS.to_string(), links),
    ];
    if let Some(seen) = record.last_seen_ms {
        fields.push((LAST_SEEN.to_string(), seen.to_string()));
    }
    fields
}

/// Decodes hash fields into a record.
///
/// Returns `None` when the hash is empty or has no token address, which is
/// how an expired or never-written record looks to a reader. An unreadable
/// link list decodes as empty rather than failing the whole record.
#[must_use]
pub fn record_from_fields(mut fields: HashMap<String, String>) -> Option<TokenRecord> {
    let token_address = fields.remove(TOKEN_ADDRESS).filter(|a| !a.is_empty())?;
    let mut take = |name: &str| fields.remove(name).unwrap_or_default();

    let links = take(LINKS);
    let links: Vec<TokenLink> = if links.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&links).unwrap_or_else(|e| {
            tracing::debug!(%token_address, error = %e, "unreadable link list");
            Vec::new()
        })
    };

    Some(TokenRecord {
        chain_id: take(CHAIN_ID),
        url: take(URL),
        icon: take(ICON),
        header: take(HEADER),
        open_graph: take(OPEN_GRAPH),
        description: take(DESCRIPTION),
        last_seen_ms: take(LAST_SEEN).parse().ok(),
        links: links.into_iter().map(TokenLink::normalized).collect(),
        token_address,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn sample() -> TokenRecord {
        TokenRecord {
            chain_id: "solana".into(),
            token_address: "Mint111".into(),
            url: "https://dexscreener.com/solana/mint111".into(),
            icon: "https://cdn/icon.png".into(),
            description: "memecoin".into(),
            links: vec![TokenLink {
                link_type: "twitter".into(),
                label: None,
                url: "https://x.com/mint".into(),
            }],
            last_seen_ms: Some(1_700_000_000_123),
            ..TokenRecord::default()
        }
    }

    #[test]
    fn fields_decode_back_to_the_record() {
        let record = sample();
        let fields: HashMap<_, _> = record_to_fields(&record).into_iter().collect();
        assert_eq!(fields.get("links").map(String::as_str), Some(
            r#"[{"type":"twitter","url":"https://x.com/mint"}]"#
        ));
        assert_eq!(record_from_fields(fields), Some(record));
    }

    #[test]
    fn empty_hash_is_absent() {
        assert_eq!(record_from_fields(HashMap::new()), None);
    }

    #[test]
    fn hash_without_address_is_absent() {
        let fields = HashMap::from([("chainId".to_string(), "solana".to_string())]);
        assert_eq!(record_from_fields(fields), None);
    }

    #[test]
    fn manual_record_has_no_last_seen() {
        let fields = HashMap::from([
            ("tokenAddress".to_string(), "abc".to_string()),
            ("chainId".to_string(), "solana".to_string()),
            ("links".to_string(), "[]".to_string()),
        ]);
        let Some(record) = record_from_fields(fields) else {
            panic!("record expected");
        };
        assert_eq!(record.last_seen_ms, None);
        assert!(record.links.is_empty());
    }
}
