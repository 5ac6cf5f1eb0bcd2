//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::BroadcastBus;
use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::HubResult;
use crate::pipeline::PipelineManager;
use crate::session::SessionRegistry;

/// Container for all bootstrapped services.
///
/// Holds every service created during bootstrap, ready to be handed to
/// [`crate::api::AppState`].
pub struct BootstrappedServices {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
    pub bus: Arc<BroadcastBus>,
    pub connections: Arc<ConnectionManager>,
    pub pipelines: Arc<PipelineManager>,
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services: stops accepting new
    /// work, force-closes attached peers, and stops every active pipeline
    /// with the same stop procedure as an explicit `stream_stop`.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] beginning graceful shutdown");
        self.cancel_token.cancel();
        self.connections.close_all();
        self.pipelines.stop_all().await;
        log::info!("[Bootstrap] shutdown complete");
    }
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together, in dependency order: state (Slot Registry, Broadcast
/// Bus), then the connection manager, then the Stream Pipeline Manager
/// (depends on the config and the bus).
pub fn bootstrap_services(config: Config) -> HubResult<BootstrappedServices> {
    let config = Arc::new(config);
    let sessions = SessionRegistry::new();
    let bus = BroadcastBus::new();
    let connections = ConnectionManager::new();
    let pipelines = PipelineManager::new(Arc::clone(&config), Arc::clone(&bus));

    log::info!(
        "[Bootstrap] services wired (bind={}:{}, live_root={}, recording_root={})",
        config.bind_host,
        config.bind_port,
        config.live_root.display(),
        config.recording_root.display()
    );

    Ok(BootstrappedServices {
        config,
        sessions,
        bus,
        connections,
        pipelines,
        cancel_token: CancellationToken::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_wires_every_service_with_no_state() {
        let services = bootstrap_services(Config::default()).unwrap();
        assert_eq!(services.sessions.occupied(), Vec::<u8>::new());
        assert_eq!(services.connections.connection_count(), 0);
        assert!(!services.cancel_token.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_cancels_token_and_closes_connections() {
        let services = bootstrap_services(Config::default()).unwrap();
        let guard = services.connections.register(1);
        services.shutdown().await;
        assert!(services.cancel_token.is_cancelled());
        assert!(guard.cancel_token().is_cancelled());
    }
}
