//! HTTP control surface
//!
//! A thin axum adapter over the registry: JSON control endpoints, the raw
//! frame pull endpoint, and the websocket push channel. All origins are
//! allowed; viewers are expected to be embedded anywhere.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::registry::StreamRegistry;

pub mod handlers;
pub mod ws;

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<StreamRegistry>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(registry: Arc<StreamRegistry>, config: ServerConfig) -> Self {
        Self { registry, config }
    }
}

/// Build the router with every control and consumer endpoint
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/streams",
            post(handlers::create_stream).get(handlers::list_streams),
        )
        .route("/api/streams/start-with-url", post(handlers::start_with_url))
        .route("/api/streams/:stream_id", delete(handlers::stop_stream))
        .route(
            "/api/streams/:stream_id/force",
            delete(handlers::force_stop_stream),
        )
        .route("/api/streams/:stream_id/stats", get(handlers::stream_stats))
        .route(
            "/api/streams/:stream_id/status",
            get(handlers::stream_status),
        )
        .route("/api/streams/:stream_id/frame", get(handlers::latest_frame))
        .route("/ws/:stream_id", get(ws::attach))
        .route("/health", get(handlers::health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(state: AppState, listener: TcpListener) -> crate::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Serve until the shutdown future completes
pub async fn serve_with_shutdown<F>(
    state: AppState,
    listener: TcpListener,
    shutdown: F,
) -> crate::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
