//! HTTP/WebSocket API layer.
//!
//! Thin handlers that delegate to the core services; this module owns only
//! router construction, app state, and the server bind/serve loop.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::bus::BroadcastBus;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::pipeline::PipelineManager;
use crate::session::SessionRegistry;

pub mod http;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    /// The serve loop itself returned an error.
    #[error("server loop failed: {0}")]
    Serve(std::io::Error),
}

/// Shared application state for every route and WebSocket handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub bus: Arc<BroadcastBus>,
    pub connections: Arc<ConnectionManager>,
    pub pipelines: Arc<PipelineManager>,
    pub cancel_token: CancellationToken,
}

impl AppState {
    /// Builds the app state from a fully wired [`BootstrappedServices`].
    #[must_use]
    pub fn new(services: &BootstrappedServices) -> Self {
        Self {
            config: Arc::clone(&services.config),
            sessions: Arc::clone(&services.sessions),
            bus: Arc::clone(&services.bus),
            connections: Arc::clone(&services.connections),
            pipelines: Arc::clone(&services.pipelines),
            cancel_token: services.cancel_token.clone(),
        }
    }
}

/// Binds and serves the HTTP/WebSocket surface until the state's
/// cancellation token trips.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = SocketAddr::new(
        state
            .config
            .bind_host
            .parse()
            .expect("bind_host is a valid IP address"),
        state.config.bind_port,
    );

    let cancel_token = state.cancel_token.clone();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(addr, e))?;

    log::info!("[Server] listening on {addr}");

    let router = http::create_router(state);
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await
        .map_err(ServerError::Serve)?;

    Ok(())
}
