//! Broadcast bus: best-effort fan-out of outbound frames to every attached peer.
//!
//! Backed by a `tokio::sync::broadcast` channel. Each attached peer holds its
//! own `Receiver`, so a slow peer accumulates lag independently rather than
//! blocking the sender or other peers. When a receiver falls behind the
//! channel's bounded capacity, its next `recv()` returns
//! `Lagged(n)` — the peer's write loop treats that as "this connection is
//! dead" and closes it, matching the overflow policy in the design.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::protocol::Outbound;
use crate::protocol_constants::PEER_OUTBOUND_QUEUE_CAPACITY;

/// Delivers one outbound frame to every currently subscribed peer.
pub struct BroadcastBus {
    tx: broadcast::Sender<Outbound>,
}

impl BroadcastBus {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(PEER_OUTBOUND_QUEUE_CAPACITY);
        Arc::new(Self { tx })
    }

    /// Subscribes a new peer, returning a receiver of all frames broadcast
    /// from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }

    /// Broadcasts a frame to every currently subscribed peer.
    ///
    /// A send with zero active receivers is not an error — it just means no
    /// peers are attached right now.
    pub fn broadcast(&self, frame: Outbound) {
        if self.tx.send(frame).is_err() {
            log::trace!("[Bus] broadcast with no attached peers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_broadcast_frames_in_order() {
        let bus = BroadcastBus::new();
        let mut rx = bus.subscribe();

        bus.broadcast(Outbound::Reset);
        bus.broadcast(Outbound::TravelMode { active: true });

        assert_eq!(rx.recv().await.unwrap(), Outbound::Reset);
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::TravelMode { active: true }
        );
    }

    #[tokio::test]
    async fn broadcast_with_no_subscribers_does_not_panic() {
        let bus = BroadcastBus::new();
        bus.broadcast(Outbound::Reset);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_affecting_others() {
        let bus = BroadcastBus::new();
        let mut slow_rx = bus.subscribe();
        let mut fast_rx = bus.subscribe();

        for _ in 0..(PEER_OUTBOUND_QUEUE_CAPACITY + 10) {
            bus.broadcast(Outbound::Reset);
            fast_rx.recv().await.unwrap();
        }

        // The slow receiver never drained, so it has lagged.
        assert!(matches!(
            slow_rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
