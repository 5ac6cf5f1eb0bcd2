//! Peer connection tracking for graceful shutdown.
//!
//! Mirrors the registry in the broadcast bus conceptually but tracks
//! connections rather than frames: every attached peer registers here and
//! gets a [`PeerGuard`] whose [`Drop`] unregisters it, and whose
//! cancellation token is tripped by [`ConnectionManager::close_all`] so the
//! server can force-close every connection during shutdown without walking
//! individual peer tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

struct ConnectionState {
    slot_id: u8,
}

/// Tracks all currently attached peer connections.
pub struct ConnectionManager {
    connections: DashMap<u64, ConnectionState>,
    next_id: AtomicU64,
    global_cancel: RwLock<CancellationToken>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        })
    }

    /// Registers a newly attached peer and returns a guard for RAII cleanup.
    pub fn register(self: &Arc<Self>, slot_id: u8) -> PeerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(id, ConnectionState { slot_id });
        log::info!(
            "[WS] Peer {} attached on slot {} (total: {})",
            id,
            slot_id,
            self.connections.len()
        );

        PeerGuard {
            id,
            slot_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: u64) {
        if self.connections.remove(&id).is_some() {
            log::info!(
                "[WS] Peer {} detached (remaining: {})",
                id,
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Force-closes every connection by cancelling the current global token
    /// and replacing it with a fresh one so future registrations aren't
    /// pre-cancelled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }
}

/// RAII guard that unregisters a peer connection when dropped.
pub struct PeerGuard {
    id: u64,
    slot_id: u8,
    manager: Arc<ConnectionManager>,
    cancel_token: CancellationToken,
}

impl PeerGuard {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn slot_id(&self) -> u8 {
        self.slot_id
    }

    /// Token that trips when the server force-closes all connections
    /// (graceful shutdown or `close_all`).
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for PeerGuard {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_increments_connection_count() {
        let manager = ConnectionManager::new();
        let guard = manager.register(1);
        assert_eq!(manager.connection_count(), 1);
        drop(guard);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn close_all_cancels_tokens_and_allows_new_registrations() {
        let manager = ConnectionManager::new();
        let guard = manager.register(1);
        assert!(!guard.cancel_token().is_cancelled());

        let closed = manager.close_all();
        assert_eq!(closed, 1);
        assert!(guard.cancel_token().is_cancelled());

        // A fresh registration after close_all is not pre-cancelled.
        let guard2 = manager.register(2);
        assert!(!guard2.cancel_token().is_cancelled());
    }
}
