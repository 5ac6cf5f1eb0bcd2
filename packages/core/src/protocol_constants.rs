//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the coordination protocol itself and changing
//! them would break compatibility between hub and clients already in the wild.

// ─────────────────────────────────────────────────────────────────────────────
// Slot Allocation
// ─────────────────────────────────────────────────────────────────────────────

/// Number of identity slots in the fixed pool (agents 1..=8).
pub const MAX_SLOTS: u8 = 8;

// ─────────────────────────────────────────────────────────────────────────────
// Countdown
// ─────────────────────────────────────────────────────────────────────────────

/// Countdown duration broadcast alongside the client-supplied timestamp.
///
/// Fixed by the protocol: clients schedule their local countdown UI and the
/// starter's in-game action relative to this value, so it cannot be tuned
/// per-deployment without breaking already-deployed clients.
pub const COUNTDOWN_DURATION_MS: u64 = 3000;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum inbound WebSocket frame size, to accommodate video chunks.
pub const MAX_WS_FRAME_BYTES: usize = 5 * 1024 * 1024;

/// Capacity of each peer's outbound frame queue.
///
/// A peer that falls this far behind the broadcast bus is considered dead
/// and its connection is closed rather than allowed to buffer unboundedly.
pub const PEER_OUTBOUND_QUEUE_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Stream Pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Bound on how long the stop procedure waits for the transcoder to exit
/// on its own before force-terminating it.
pub const PIPELINE_STOP_TIMEOUT_SECS: u64 = 10;

/// Target duration of each HLS segment, in seconds.
pub const HLS_SEGMENT_DURATION_SECS: u32 = 1;

/// Number of segments kept in the live rolling playlist.
pub const HLS_PLAYLIST_SIZE: u32 = 4;

/// Container extension for the remuxed live segments.
pub const HLS_SEGMENT_EXTENSION: &str = "ts";

/// Container extension for the archival file (and the remux output container).
pub const ARCHIVE_CONTAINER_EXTENSION: &str = "mp4";

/// Filename of the live playlist within a slot's live directory.
pub const HLS_PLAYLIST_FILENAME: &str = "stream.m3u8";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service name reported by the `/` and `/health` endpoints.
pub const SERVICE_NAME: &str = "syncrun-hub";
