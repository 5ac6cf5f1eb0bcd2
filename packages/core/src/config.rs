//! Core runtime configuration.
//!
//! This is a plain data struct produced by the server binary's own config
//! layer (YAML + env overrides) and handed to [`crate::bootstrap`]. The core
//! library itself never reads the environment directly.

use std::path::PathBuf;

use crate::protocol_constants::{MAX_WS_FRAME_BYTES, PIPELINE_STOP_TIMEOUT_SECS};

/// Runtime configuration for the hub.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_host: String,
    pub bind_port: u16,

    /// Root directory under which per-slot live HLS directories are created.
    pub live_root: PathBuf,

    /// Root directory under which per-session archive files are written.
    pub recording_root: PathBuf,

    /// Path to the external transcoder binary (e.g. `ffmpeg`).
    pub transcoder_path: String,

    /// Base URL of the external archive store. Upload is skipped if absent.
    pub archive_site_url: Option<String>,

    /// Bearer token for the external archive store. Upload is skipped if absent.
    pub archive_bearer_token: Option<String>,

    /// How long to wait for the transcoder to exit after closing its stdin
    /// before force-killing it.
    pub pipeline_stop_timeout_secs: u64,

    /// Maximum accepted WebSocket frame size, in bytes.
    pub ws_max_frame_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 3001,
            live_root: PathBuf::from("./data/live"),
            recording_root: PathBuf::from("./data/recordings"),
            transcoder_path: "ffmpeg".to_string(),
            archive_site_url: None,
            archive_bearer_token: None,
            pipeline_stop_timeout_secs: PIPELINE_STOP_TIMEOUT_SECS,
            ws_max_frame_bytes: MAX_WS_FRAME_BYTES,
        }
    }
}

impl Config {
    /// True iff the external archive store is configured. When false, the
    /// upload sequence in the pipeline manager is skipped entirely.
    #[must_use]
    pub fn archive_configured(&self) -> bool {
        self.archive_site_url.is_some() && self.archive_bearer_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_archive_store() {
        let config = Config::default();
        assert!(!config.archive_configured());
    }

    #[test]
    fn archive_configured_requires_both_url_and_token() {
        let mut config = Config::default();
        config.archive_site_url = Some("https://example.com".to_string());
        assert!(!config.archive_configured());
        config.archive_bearer_token = Some("token".to_string());
        assert!(config.archive_configured());
    }
}
