//! Wire protocol types.
//!
//! The hub speaks JSON text frames over a single WebSocket endpoint. Inbound
//! frames decode into [`Inbound`]; outbound frames are serialised from
//! [`Outbound`]. Both use a `type` string discriminator so that unknown or
//! malformed frames are rejected at the deserialisation boundary rather than
//! silently matched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Snapshot of ready flags and display names across all 8 slots.
///
/// Always covers the full `1..=8` range; unoccupied slots report `false` and
/// `""`. Keys are decimal slot ids rendered as strings, matching the wire
/// format clients expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub agents: BTreeMap<String, bool>,
    pub names: BTreeMap<String, String>,
}

/// One entry in a `stream_status` broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamStatusEntry {
    #[serde(rename = "agentId")]
    pub agent_id: u8,
    pub name: String,
    #[serde(rename = "hlsUrl")]
    pub hls_url: String,
    #[serde(rename = "startedAt")]
    pub started_at: u64,
}

/// Inbound text frames, decoded from client-sent JSON.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Ready { value: bool },
    SetName { name: String },
    StartRequest { timestamp: u64 },
    TravelRequest,
    ExecuteTravel,
    ResetRaid,
    StreamStart,
    StreamStop,
    Ping,
}

/// Outbound text frames, serialised to JSON and sent to one or more peers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    AgentAssigned {
        #[serde(rename = "agentId")]
        agent_id: u8,
        agents: BTreeMap<String, bool>,
        names: BTreeMap<String, String>,
    },
    ReadyState {
        agents: BTreeMap<String, bool>,
        names: BTreeMap<String, String>,
    },
    Countdown {
        timestamp: u64,
        duration: u64,
    },
    Start {
        timestamp: u64,
        #[serde(rename = "starterAgentId")]
        starter_agent_id: u8,
    },
    TravelMode {
        active: bool,
    },
    ExecuteTravel,
    Reset,
    StreamStatus {
        streams: Vec<StreamStatusEntry>,
    },
    Pong {
        timestamp: u64,
    },
    Error {
        message: String,
    },
}

impl Outbound {
    pub fn ready_state(snapshot: Snapshot) -> Self {
        Self::ReadyState {
            agents: snapshot.agents,
            names: snapshot.names,
        }
    }

    pub fn agent_assigned(agent_id: u8, snapshot: Snapshot) -> Self {
        Self::AgentAssigned {
            agent_id,
            agents: snapshot.agents,
            names: snapshot.names,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialises this frame to a single JSON text frame payload.
    ///
    /// # Panics
    ///
    /// Panics if serialisation fails, which would indicate a bug in this
    /// type's `Serialize` implementation (all fields are plain JSON-safe
    /// types) rather than a recoverable runtime condition.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Outbound frames are always serialisable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_ready_decodes() {
        let msg: Inbound = serde_json::from_str(r#"{"type":"ready","value":true}"#).unwrap();
        assert_eq!(msg, Inbound::Ready { value: true });
    }

    #[test]
    fn inbound_start_request_decodes() {
        let msg: Inbound =
            serde_json::from_str(r#"{"type":"start_request","timestamp":5000}"#).unwrap();
        assert_eq!(msg, Inbound::StartRequest { timestamp: 5000 });
    }

    #[test]
    fn inbound_unknown_type_is_rejected() {
        let result: Result<Inbound, _> = serde_json::from_str(r#"{"type":"nonsense"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn outbound_agent_assigned_uses_camel_case_fields() {
        let mut agents = BTreeMap::new();
        agents.insert("1".to_string(), false);
        let mut names = BTreeMap::new();
        names.insert("1".to_string(), String::new());
        let snapshot = Snapshot { agents, names };
        let frame = Outbound::agent_assigned(1, snapshot);
        let json = frame.to_json();
        assert!(json.contains(r#""agentId":1"#));
        assert!(json.contains(r#""type":"agent_assigned""#));
    }

    #[test]
    fn outbound_start_uses_starter_agent_id() {
        let frame = Outbound::Start {
            timestamp: 5000,
            starter_agent_id: 2,
        };
        let json = frame.to_json();
        assert!(json.contains(r#""starterAgentId":2"#));
    }

    #[test]
    fn outbound_countdown_duration_is_3000() {
        let frame = Outbound::Countdown {
            timestamp: 1000,
            duration: crate::protocol_constants::COUNTDOWN_DURATION_MS,
        };
        assert!(frame.to_json().contains(r#""duration":3000"#));
    }
}
