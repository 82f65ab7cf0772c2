//! # dexfeed-gateway
//!
//! Local mirror of the "latest token profiles" feed.
//!
//! A background poller fetches the upstream feed with conditional requests,
//! keeps the profiles of one chain, and stores them as hashes plus
//! recency-ordered indexes in Redis. An HTTP API serves those records in
//! the upstream's shape, behind a per-client token-bucket rate limiter and
//! an idempotency-key lock. All cross-request and cross-process state lives
//! in the store; the process itself holds no shared mutable state.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)                    Upstream feed
//!     │                                   │
//!     ├── RateLimiter (middleware/)       ├── FeedClient (ingest/)
//!     ├── IdempotencyGuard (middleware/)  ├── Poller (ingest/)
//!     ├── REST Handlers (api/)            │
//!     ├── TokenRepository (service/)      │
//!     │                                   │
//!     └────────── KeyValueStore (persistence/) ──── Redis
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod persistence;
pub mod service;
