//! SyncRun Hub core library.
//!
//! A stateful WebSocket coordination service for small (≤ 8 participant)
//! speedrunning groups: slot allocation, shared ready/name/travel-mode
//! state with broadcast fan-out, a unanimous-readiness countdown gate, and
//! a per-agent video remux-and-archive pipeline.

pub mod api;
pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod connection;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod protocol_constants;
pub mod session;
pub mod utils;

pub use api::{start_server, AppState, ServerError};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use bus::BroadcastBus;
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{ErrorCode, HubError, HubResult};
pub use pipeline::PipelineManager;
pub use session::SessionRegistry;
