//! REST endpoint handlers organized by resource.

pub mod feed;
pub mod system;
pub mod tokens;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(tokens::routes())
        .merge(feed::routes())
        .merge(system::routes())
}
