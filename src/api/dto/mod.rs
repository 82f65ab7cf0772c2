//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names follow the upstream feed (`camelCase`) so that the served
//! profile endpoint is a drop-in replacement for it.

pub mod token_dto;

pub use token_dto::*;
