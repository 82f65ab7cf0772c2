//! dexfeed-gateway entry point.
//!
//! Depending on `RUN_MODE`, serves the HTTP API, runs the ingestion poller,
//! does both, or purges the mirrored state and exits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dexfeed_gateway::api;
use dexfeed_gateway::app_state::AppState;
use dexfeed_gateway::config::{GatewayConfig, RunMode, StoreBackend};
use dexfeed_gateway::ingest::{FeedClient, Poller};
use dexfeed_gateway::persistence::{KeyValueStore, MemoryStore, RedisStore};
use dexfeed_gateway::service::maintenance;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(
        mode = ?config.run_mode,
        backend = ?config.store_backend,
        chain = %config.poller_chain,
        "starting dexfeed-gateway"
    );

    // Connect the store
    let store: Arc<dyn KeyValueStore> = match config.store_backend {
        StoreBackend::Redis => Arc::new(
            RedisStore::connect(
                &config.redis_url,
                Duration::from_millis(config.store_command_timeout_ms),
            )
            .await?,
        ),
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; state is not shared between processes");
            Arc::new(MemoryStore::new())
        }
    };

    if config.run_mode == RunMode::Purge {
        maintenance::purge(store.as_ref()).await?;
        return Ok(());
    }

    let cancel = CancellationToken::new();

    // Start the poller
    let poller = if config.run_mode.runs_poller() {
        let feed = FeedClient::new(
            config.dex_url.clone(),
            Duration::from_secs(config.upstream_timeout_secs),
        )?;
        let poller = Poller::new(
            Arc::clone(&store),
            feed,
            config.poller_chain.clone(),
            config.token_ttl(),
            Duration::from_secs(config.poll_interval_secs),
        );
        Some(tokio::spawn(poller.run(cancel.clone())))
    } else {
        None
    };

    // Serve HTTP, or wait for a signal when only polling
    if config.run_mode.serves_api() {
        let listen_addr = config.listen_addr;
        let app = api::build_app(AppState::new(config, Arc::clone(&store)));

        let listener = tokio::net::TcpListener::bind(listen_addr).await?;
        tracing::info!(addr = %listen_addr, "server listening");

        let shutdown = cancel.clone();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;
    } else {
        shutdown_signal().await;
    }
    cancel.cancel();

    if let Some(poller) = poller {
        if let Err(e) = poller.await {
            tracing::error!(error = %e, "poller task failed");
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
