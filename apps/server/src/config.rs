//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind the HTTP/WebSocket server to.
    /// Override: `HUB_BIND_HOST`
    pub bind_host: String,

    /// Port to bind the HTTP/WebSocket server to.
    /// Override: `HUB_BIND_PORT`
    pub bind_port: u16,

    /// Root directory under which per-slot live HLS directories are created.
    /// Override: `HUB_LIVE_ROOT`
    pub live_root: PathBuf,

    /// Root directory under which per-session archive files are written.
    /// Override: `HUB_RECORDING_ROOT`
    pub recording_root: PathBuf,

    /// Path to the external transcoder binary.
    /// Override: `HUB_TRANSCODER_PATH`
    pub transcoder_path: String,

    /// Base URL of the external archive store. Upload is skipped if absent.
    /// Override: `HUB_ARCHIVE_SITE_URL`
    pub archive_site_url: Option<String>,

    /// Bearer token for the external archive store. Upload is skipped if absent.
    /// Override: `HUB_ARCHIVE_BEARER_TOKEN`
    pub archive_bearer_token: Option<String>,

    /// Seconds to wait for the transcoder to exit before force-killing it.
    pub pipeline_stop_timeout_secs: u64,

    /// Maximum accepted WebSocket frame size, in bytes.
    pub ws_max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = syncrun_core::Config::default();
        Self {
            bind_host: core.bind_host,
            bind_port: core.bind_port,
            live_root: core.live_root,
            recording_root: core.recording_root,
            transcoder_path: core.transcoder_path,
            archive_site_url: core.archive_site_url,
            archive_bearer_token: core.archive_bearer_token,
            pipeline_stop_timeout_secs: core.pipeline_stop_timeout_secs,
            ws_max_frame_bytes: core.ws_max_frame_bytes,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HUB_BIND_HOST") {
            self.bind_host = val;
        }
        if let Ok(val) = std::env::var("HUB_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }
        if let Ok(val) = std::env::var("HUB_LIVE_ROOT") {
            self.live_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HUB_RECORDING_ROOT") {
            self.recording_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("HUB_TRANSCODER_PATH") {
            self.transcoder_path = val;
        }
        if let Ok(val) = std::env::var("HUB_ARCHIVE_SITE_URL") {
            self.archive_site_url = Some(val);
        }
        if let Ok(val) = std::env::var("HUB_ARCHIVE_BEARER_TOKEN") {
            self.archive_bearer_token = Some(val);
        }
    }

    /// Converts to `syncrun_core`'s plain-data `Config` type.
    pub fn to_core_config(&self) -> syncrun_core::Config {
        syncrun_core::Config {
            bind_host: self.bind_host.clone(),
            bind_port: self.bind_port,
            live_root: self.live_root.clone(),
            recording_root: self.recording_root.clone(),
            transcoder_path: self.transcoder_path.clone(),
            archive_site_url: self.archive_site_url.clone(),
            archive_bearer_token: self.archive_bearer_token.clone(),
            pipeline_stop_timeout_secs: self.pipeline_stop_timeout_secs,
            ws_max_frame_bytes: self.ws_max_frame_bytes,
        }
    }
}
