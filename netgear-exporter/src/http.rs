//! Scrape endpoint for Prometheus plus liveness and readiness checks.
//!
//! `/ready` turns 200 once the first cycle has been projected and drops back
//! to 503 when the poller terminates, so an orchestrator stops routing
//! scrapes to an exporter that is about to exit.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::poller::PollState;
use crate::store::SharedStore;

const CONTENT_TYPE_TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
struct AppState {
    store: SharedStore,
    poll_state: watch::Receiver<PollState>,
}

fn create_router(state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, CONTENT_TYPE_TEXT_FORMAT)],
        state.store.render(),
    )
        .into_response()
}

/// Liveness: fails only once the poller gave up.
async fn health_handler(State(state): State<AppState>) -> Response {
    match *state.poll_state.borrow() {
        PollState::Running => (StatusCode::OK, "ok\n").into_response(),
        PollState::Terminated => {
            (StatusCode::SERVICE_UNAVAILABLE, "poller terminated\n").into_response()
        }
    }
}

async fn ready_handler(State(state): State<AppState>) -> Response {
    if *state.poll_state.borrow() == PollState::Terminated {
        return (StatusCode::SERVICE_UNAVAILABLE, "poller terminated\n").into_response();
    }

    let stats = state.store.stats();
    if stats.scrapes == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "waiting for first scrape\n").into_response();
    }

    (
        StatusCode::OK,
        format!("ready, {} channels\n", stats.last_channels),
    )
        .into_response()
}

/// Exposition server bound to its listen address.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Bind the listen address.
    ///
    /// Binding happens up front so a busy port fails startup before the
    /// first login.
    pub async fn bind(
        store: SharedStore,
        poll_state: watch::Receiver<PollState>,
        listen_addr: SocketAddr,
        metrics_path: &str,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", listen_addr))?;
        let router = create_router(AppState { store, poll_state }, metrics_path);

        info!(addr = %listener.local_addr()?, path = metrics_path, "HTTP server listening");
        Ok(Self { listener, router })
    }

    /// The bound address, with the actual port when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the shutdown signal is set or its sender is dropped.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .context("HTTP server error")?;

        info!("HTTP server stopped");
        Ok(())
    }
}
