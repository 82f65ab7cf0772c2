//! Service layer: read access to the mirrored token records, and the
//! maintenance purge.
//!
//! [`TokenRepository`] never talks to the upstream feed; it only resolves
//! what the poller (or the manual create endpoint) left in the store.

pub mod maintenance;
pub mod token_repository;

pub use token_repository::TokenRepository;
