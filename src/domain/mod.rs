//! Domain layer: token records, upstream feed shapes, and rate-limit math.
//!
//! Nothing in here talks to the store or the network; the persistence and
//! ingestion layers translate between these types and their wire forms.

pub mod feed_profile;
pub mod token_bucket;
pub mod token_record;

pub use feed_profile::{DecodedFeed, FeedBody, FeedProfile};
pub use token_bucket::TokenBucket;
pub use token_record::{TokenLink, TokenRecord};
