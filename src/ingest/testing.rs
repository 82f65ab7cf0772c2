//! Local stand-in for the upstream feed, served on an ephemeral port.
#![allow(clippy::panic)]

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::Mutex;

#[derive(Debug)]
struct FeedState {
    status: StatusCode,
    body: String,
    etag: Option<String>,
    last_if_none_match: Option<String>,
}

/// Scriptable feed server honoring `If-None-Match`.
#[derive(Debug, Clone)]
pub(crate) struct FakeFeed {
    state: Arc<Mutex<FeedState>>,
    url: String,
}

impl FakeFeed {
    pub(crate) async fn start() -> Self {
        let state = Arc::new(Mutex::new(FeedState {
            status: StatusCode::OK,
            body: "[]".to_string(),
            etag: None,
            last_if_none_match: None,
        }));
        let app = Router::new()
            .route("/token-profiles/latest/v1", get(serve_feed))
            .with_state(Arc::clone(&state));

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            state,
            url: format!("http://{addr}/token-profiles/latest/v1"),
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) async fn serve(&self, body: impl Into<String>, etag: Option<&str>) {
        let mut state = self.state.lock().await;
        state.status = StatusCode::OK;
        state.body = body.into();
        state.etag = etag.map(str::to_string);
    }

    pub(crate) async fn fail_with(&self, status: u16) {
        let mut state = self.state.lock().await;
        state.status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    }

    pub(crate) async fn last_if_none_match(&self) -> Option<String> {
        self.state.lock().await.last_if_none_match.clone()
    }
}

async fn serve_feed(State(state): State<Arc<Mutex<FeedState>>>, headers: HeaderMap) -> Response {
    let mut state = state.lock().await;
    let presented = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.last_if_none_match.clone_from(&presented);

    if !state.status.is_success() {
        return state.status.into_response();
    }
    if state.etag.is_some() && state.etag == presented {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let mut response = ([(CONTENT_TYPE, "application/json")], state.body.clone()).into_response();
    if let Some(tag) = state.etag.as_deref().and_then(|t| HeaderValue::from_str(t).ok()) {
        response.headers_mut().insert(ETAG, tag);
    }
    response
}
