//! Ingestion: mirrors the upstream profile feed into the store.
//!
//! [`FeedClient`] performs the conditional fetch; [`Poller`] parses the
//! body, keeps the configured chain, writes records and recency indexes in
//! one batch, and trims the indexes to the record TTL window.

pub mod feed_client;
pub mod poller;
#[cfg(test)]
pub(crate) mod testing;

pub use feed_client::{FeedClient, FetchOutcome};
pub use poller::{Poller, TickReport};
