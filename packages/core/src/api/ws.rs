//! WebSocket handler: connection lifecycle and protocol dispatch.
//!
//! One task per connection runs [`handle_connection`] from accept to
//! teardown, racing three event sources: the peer's force-close
//! cancellation token, inbound frames from the client, and frames pushed
//! out by the broadcast bus.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use tokio::sync::broadcast;

use crate::api::AppState;
use crate::protocol::{Inbound, Outbound};
use crate::protocol_constants::COUNTDOWN_DURATION_MS;
use crate::utils::now_millis;

/// WebSocket upgrade handler for the `/ws` endpoint.
pub async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let max_frame = state.config.ws_max_frame_bytes;
    ws.max_frame_size(max_frame)
        .max_message_size(max_frame)
        .on_upgrade(move |socket| handle_connection(socket, state))
}

/// Drives one peer connection from slot assignment to teardown.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let slot_id = match state.sessions.acquire() {
        Ok(id) => id,
        Err(e) => {
            log::warn!("[WS] rejecting connection: {e}");
            let _ = sender
                .send(Message::Text(Outbound::error(e.to_string()).to_json().into()))
                .await;
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: axum::extract::ws::close_code::POLICY,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let peer_guard = state.connections.register(slot_id);
    let cancel_token = peer_guard.cancel_token().clone();
    let mut broadcast_rx = state.bus.subscribe();

    log::info!(
        "[WS] peer {} attached on slot {slot_id}",
        peer_guard.id()
    );

    let assigned = Outbound::agent_assigned(slot_id, state.sessions.snapshot());
    if sender
        .send(Message::Text(assigned.to_json().into()))
        .await
        .is_err()
    {
        teardown(&state, slot_id).await;
        return;
    }
    state
        .bus
        .broadcast(Outbound::ready_state(state.sessions.snapshot()));

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] peer {} force-closed", peer_guard.id());
                break;
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_text(&state, slot_id, &text, &mut sender).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        state.pipelines.write_frame(slot_id, &data).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            frame = broadcast_rx.recv() => {
                match frame {
                    Ok(frame) => {
                        if sender.send(Message::Text(frame.to_json().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("[WS] peer {} lagged by {n} frame(s), closing", peer_guard.id());
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    drop(peer_guard);
    teardown(&state, slot_id).await;
}

/// Runs the disconnect/error teardown path: stop any active pipeline,
/// release the slot, and broadcast the resulting snapshot.
async fn teardown(state: &AppState, slot_id: u8) {
    state.pipelines.stop(slot_id).await;
    state.sessions.release(slot_id);
    state
        .bus
        .broadcast(Outbound::ready_state(state.sessions.snapshot()));
    log::info!("[WS] slot {slot_id} released");
}

/// Parses one inbound text frame and dispatches it, sending any direct
/// reply back to the originating peer.
async fn dispatch_text(
    state: &AppState,
    slot_id: u8,
    text: &str,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let inbound: Inbound = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            log::warn!("[Protocol] slot {slot_id} sent an unrecognised frame: {e}");
            return;
        }
    };

    if let Some(frame) = dispatch(state, slot_id, inbound).await {
        reply(sender, frame).await;
    }
}

/// Applies one decoded inbound message: mutates session state and
/// broadcasts the resulting frames to every peer. Returns a frame destined
/// for the originating peer only (an error or a pong), if any - kept
/// separate from the sender so the dispatch/ordering logic can be driven
/// directly in tests without a real socket.
async fn dispatch(state: &AppState, slot_id: u8, inbound: Inbound) -> Option<Outbound> {
    match inbound {
        Inbound::Ready { value } => {
            state.sessions.set_ready(slot_id, value);
            broadcast_ready_state(state);
            None
        }
        Inbound::SetName { name } => {
            state.sessions.set_name(slot_id, &name);
            broadcast_ready_state(state);
            None
        }
        Inbound::StartRequest { timestamp } => {
            if state.sessions.all_ready() {
                state.bus.broadcast(Outbound::Countdown {
                    timestamp,
                    duration: COUNTDOWN_DURATION_MS,
                });
                state.bus.broadcast(Outbound::Start {
                    timestamp,
                    starter_agent_id: slot_id,
                });
                None
            } else {
                Some(Outbound::error(
                    "All connected users must be Ready to start",
                ))
            }
        }
        Inbound::TravelRequest => {
            state.sessions.start_travel();
            state.bus.broadcast(Outbound::TravelMode { active: true });
            broadcast_ready_state(state);
            None
        }
        Inbound::ExecuteTravel => {
            if state.sessions.is_travel_mode() {
                state.bus.broadcast(Outbound::ExecuteTravel);
                state.sessions.end_travel();
                state.bus.broadcast(Outbound::TravelMode { active: false });
                broadcast_ready_state(state);
                None
            } else {
                Some(Outbound::error("Not in travel mode"))
            }
        }
        Inbound::ResetRaid => {
            state.sessions.end_travel();
            state.bus.broadcast(Outbound::TravelMode { active: false });
            state.bus.broadcast(Outbound::Reset);
            broadcast_ready_state(state);
            None
        }
        Inbound::StreamStart => {
            if state.pipelines.is_streaming(slot_id) {
                Some(Outbound::error("Already streaming"))
            } else {
                let name = state.sessions.name(slot_id);
                match state.pipelines.start(slot_id, &name).await {
                    Ok(()) => {
                        state.bus.broadcast(Outbound::StreamStatus {
                            streams: state.pipelines.streams(),
                        });
                        None
                    }
                    Err(e) => {
                        log::warn!("[Pipeline] failed to start session for slot {slot_id}: {e}");
                        Some(Outbound::error(e))
                    }
                }
            }
        }
        Inbound::StreamStop => {
            state.pipelines.stop(slot_id).await;
            None
        }
        Inbound::Ping => Some(Outbound::Pong {
            timestamp: now_millis(),
        }),
    }
}

fn broadcast_ready_state(state: &AppState) {
    state
        .bus
        .broadcast(Outbound::ready_state(state.sessions.snapshot()));
}

/// Sends a single frame to this peer only.
async fn reply(sender: &mut SplitSink<WebSocket, Message>, frame: Outbound) {
    let _ = sender.send(Message::Text(frame.to_json().into())).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap_services;
    use crate::config::Config;

    fn test_state() -> AppState {
        let services = bootstrap_services(Config::default()).unwrap();
        AppState::new(&services)
    }

    #[tokio::test]
    async fn start_request_without_all_ready_replies_error_and_broadcasts_nothing() {
        let state = test_state();
        let a = state.sessions.acquire().unwrap();
        state.sessions.acquire().unwrap();
        state.sessions.set_ready(a, true);
        let mut rx = state.bus.subscribe();

        let reply = dispatch(&state, a, Inbound::StartRequest { timestamp: 1000 }).await;

        assert_eq!(
            reply,
            Some(Outbound::error("All connected users must be Ready to start"))
        );
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn start_request_when_all_ready_broadcasts_countdown_before_start() {
        let state = test_state();
        let a = state.sessions.acquire().unwrap();
        let b = state.sessions.acquire().unwrap();
        state.sessions.set_ready(a, true);
        state.sessions.set_ready(b, true);
        let mut rx = state.bus.subscribe();

        let reply = dispatch(&state, a, Inbound::StartRequest { timestamp: 5000 }).await;

        assert_eq!(reply, None);
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::Countdown {
                timestamp: 5000,
                duration: COUNTDOWN_DURATION_MS,
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::Start {
                timestamp: 5000,
                starter_agent_id: a,
            }
        );
    }

    #[tokio::test]
    async fn travel_cycle_broadcasts_in_order() {
        let state = test_state();
        let a = state.sessions.acquire().unwrap();
        let mut rx = state.bus.subscribe();

        assert_eq!(dispatch(&state, a, Inbound::TravelRequest).await, None);
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::TravelMode { active: true }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::ready_state(state.sessions.snapshot())
        );

        assert_eq!(dispatch(&state, a, Inbound::ExecuteTravel).await, None);
        assert_eq!(rx.recv().await.unwrap(), Outbound::ExecuteTravel);
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::TravelMode { active: false }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::ready_state(state.sessions.snapshot())
        );
        assert!(!state.sessions.is_travel_mode());
    }

    #[tokio::test]
    async fn execute_travel_outside_travel_mode_replies_error_without_broadcast() {
        let state = test_state();
        let a = state.sessions.acquire().unwrap();
        let mut rx = state.bus.subscribe();

        let reply = dispatch(&state, a, Inbound::ExecuteTravel).await;

        assert_eq!(reply, Some(Outbound::error("Not in travel mode")));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn reset_raid_broadcasts_travel_mode_then_reset_then_ready_state() {
        let state = test_state();
        let a = state.sessions.acquire().unwrap();
        dispatch(&state, a, Inbound::TravelRequest).await;
        let mut rx = state.bus.subscribe();

        assert_eq!(dispatch(&state, a, Inbound::ResetRaid).await, None);

        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::TravelMode { active: false }
        );
        assert_eq!(rx.recv().await.unwrap(), Outbound::Reset);
        assert_eq!(
            rx.recv().await.unwrap(),
            Outbound::ready_state(state.sessions.snapshot())
        );
    }

    #[tokio::test]
    async fn ping_replies_pong_without_broadcasting() {
        let state = test_state();
        let a = state.sessions.acquire().unwrap();
        let mut rx = state.bus.subscribe();

        let reply = dispatch(&state, a, Inbound::Ping).await;

        assert!(matches!(reply, Some(Outbound::Pong { .. })));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
