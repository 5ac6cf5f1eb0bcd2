//! Stream Pipeline Manager.
//!
//! One [`PipelineManager`] instance per process owns every active per-slot
//! transcoding session. Each session pairs a supervised transcoder child
//! process (remuxing the client's raw video bytes into a rolling HLS
//! playlist on disk) with an append-only archive file of the same bytes,
//! uploaded to the external archive store when the session stops.
//!
//! The transcoder child is owned exclusively by the task spawned in
//! [`PipelineManager::start`]; it races the child's natural exit against an
//! explicit stop signal, so a transcoder that dies on its own drives the same
//! cleanup path as an explicit `stream_stop`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::bus::BroadcastBus;
use crate::config::Config;
use crate::protocol::{Outbound, StreamStatusEntry};
use crate::protocol_constants::{
    ARCHIVE_CONTAINER_EXTENSION, HLS_PLAYLIST_FILENAME, HLS_PLAYLIST_SIZE,
    HLS_SEGMENT_DURATION_SECS, HLS_SEGMENT_EXTENSION,
};
use crate::utils::{now_millis, safe_archive_stem};

struct SessionIo {
    stdin: Option<ChildStdin>,
    archive_file: Option<tokio::fs::File>,
    bytes_written: u64,
}

struct SessionHandle {
    display_name: String,
    started_at: u64,
    io: Arc<AsyncMutex<SessionIo>>,
    stop_tx: oneshot::Sender<()>,
}

/// Owns every active per-slot stream pipeline.
pub struct PipelineManager {
    config: Arc<Config>,
    bus: Arc<BroadcastBus>,
    http: reqwest::Client,
    sessions: DashMap<u8, SessionHandle>,
}

impl PipelineManager {
    pub fn new(config: Arc<Config>, bus: Arc<BroadcastBus>) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            http: reqwest::Client::new(),
            sessions: DashMap::new(),
        })
    }

    #[must_use]
    pub fn is_streaming(&self, slot_id: u8) -> bool {
        self.sessions.contains_key(&slot_id)
    }

    /// Current status entries for a `stream_status` frame.
    #[must_use]
    pub fn streams(&self) -> Vec<StreamStatusEntry> {
        self.sessions
            .iter()
            .map(|entry| StreamStatusEntry {
                agent_id: *entry.key(),
                name: entry.value().display_name.clone(),
                hls_url: format!("/live/{}/stream.m3u8", entry.key()),
                started_at: entry.value().started_at,
            })
            .collect()
    }

    /// Starts a new pipeline session for `slot_id`. Fails if one is already
    /// active for this slot.
    pub async fn start(self: &Arc<Self>, slot_id: u8, display_name: &str) -> Result<(), String> {
        if self.sessions.contains_key(&slot_id) {
            return Err("Already streaming".to_string());
        }

        let live_dir = self.config.live_root.join(slot_id.to_string());
        match tokio::fs::remove_dir_all(&live_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(format!("failed to clear live directory: {e}")),
        }
        tokio::fs::create_dir_all(&live_dir)
            .await
            .map_err(|e| format!("failed to create live directory: {e}"))?;
        tokio::fs::create_dir_all(&self.config.recording_root)
            .await
            .map_err(|e| format!("failed to create recording directory: {e}"))?;

        let started_at = now_millis();
        let stem = safe_archive_stem(display_name, slot_id);
        let archive_path = self
            .config
            .recording_root
            .join(format!("{stem}_{started_at}.{ARCHIVE_CONTAINER_EXTENSION}"));

        let playlist_path = live_dir.join(HLS_PLAYLIST_FILENAME);
        let segment_template =
            live_dir.join(format!("s{started_at}_%03d.{HLS_SEGMENT_EXTENSION}"));

        let mut child = Command::new(&self.config.transcoder_path)
            .args([
                "-fflags".to_string(),
                "nobuffer".to_string(),
                "-flags".to_string(),
                "low_delay".to_string(),
                "-i".to_string(),
                "pipe:0".to_string(),
                "-map".to_string(),
                "0:v:0".to_string(),
                "-c:v".to_string(),
                "copy".to_string(),
                "-an".to_string(),
                "-f".to_string(),
                "hls".to_string(),
                "-hls_time".to_string(),
                HLS_SEGMENT_DURATION_SECS.to_string(),
                "-hls_list_size".to_string(),
                HLS_PLAYLIST_SIZE.to_string(),
                "-hls_flags".to_string(),
                "delete_segments+independent_segments".to_string(),
                "-hls_segment_filename".to_string(),
                segment_template.to_string_lossy().into_owned(),
                playlist_path.to_string_lossy().into_owned(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn transcoder: {e}"))?;

        let stdin = child.stdin.take();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log::debug!("[Pipeline] transcoder(slot {slot_id}): {line}");
                }
            });
        }

        let archive_file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&archive_path)
            .await
            .map_err(|e| format!("failed to open archive file: {e}"))?;

        let io = Arc::new(AsyncMutex::new(SessionIo {
            stdin,
            archive_file: Some(archive_file),
            bytes_written: 0,
        }));

        let (stop_tx, stop_rx) = oneshot::channel();
        self.sessions.insert(
            slot_id,
            SessionHandle {
                display_name: display_name.to_string(),
                started_at,
                io: Arc::clone(&io),
                stop_tx,
            },
        );

        log::info!("[Pipeline] started session for slot {slot_id}");

        let manager = Arc::clone(self);
        let stop_timeout = Duration::from_secs(self.config.pipeline_stop_timeout_secs);
        let display_name = display_name.to_string();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    log::info!("[Pipeline] transcoder for slot {slot_id} exited on its own: {status:?}");
                }
                _ = stop_rx => {
                    match tokio::time::timeout(stop_timeout, child.wait()).await {
                        Ok(status) => {
                            log::info!("[Pipeline] transcoder for slot {slot_id} exited after stop: {status:?}");
                        }
                        Err(_) => {
                            log::warn!("[Pipeline] transcoder for slot {slot_id} did not exit within timeout, killing");
                            let _ = child.kill().await;
                        }
                    }
                }
            }
            manager
                .finish(slot_id, display_name, started_at, live_dir, archive_path, io)
                .await;
        });

        Ok(())
    }

    /// Writes one binary frame into the active session for `slot_id`, if any.
    /// Frames for an inactive slot are dropped silently.
    pub async fn write_frame(&self, slot_id: u8, chunk: &[u8]) {
        let io = match self.sessions.get(&slot_id) {
            Some(handle) => Arc::clone(&handle.io),
            None => return,
        };

        let mut io = io.lock().await;
        if let Some(stdin) = io.stdin.as_mut() {
            if let Err(e) = stdin.write_all(chunk).await {
                log::warn!("[Pipeline] stdin write failed for slot {slot_id}: {e}");
                io.stdin = None;
            }
        }
        if let Some(file) = io.archive_file.as_mut() {
            if let Err(e) = file.write_all(chunk).await {
                log::warn!("[Pipeline] archive write failed for slot {slot_id}: {e}");
                io.archive_file = None;
            } else {
                io.bytes_written += chunk.len() as u64;
            }
        }
    }

    /// Stops the active session for `slot_id`, if any. Safe to call
    /// repeatedly or concurrently with a natural transcoder exit: only the
    /// first caller observes a session to remove.
    pub async fn stop(&self, slot_id: u8) {
        let Some((_, handle)) = self.sessions.remove(&slot_id) else {
            return;
        };
        log::info!("[Pipeline] stop requested for slot {slot_id}");
        {
            let mut io = handle.io.lock().await;
            io.archive_file = None;
            io.stdin = None;
        }
        let _ = handle.stop_tx.send(());
    }

    /// Stops every active session. Used during graceful shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<u8> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.stop(id).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish(
        self: Arc<Self>,
        slot_id: u8,
        display_name: String,
        started_at: u64,
        live_dir: PathBuf,
        archive_path: PathBuf,
        io: Arc<AsyncMutex<SessionIo>>,
    ) {
        // May already be gone if `stop` raced us here first.
        self.sessions.remove(&slot_id);

        let bytes_written = {
            let mut guard = io.lock().await;
            guard.archive_file = None;
            guard.stdin = None;
            guard.bytes_written
        };

        if bytes_written > 0 {
            if let Err(e) = self
                .upload_archive(slot_id, &display_name, started_at, &archive_path, bytes_written)
                .await
            {
                log::warn!("[Upload] archive upload failed for slot {slot_id}: {e}");
            }
        } else {
            log::debug!("[Pipeline] slot {slot_id} produced no archive bytes, skipping upload");
        }

        if let Err(e) = tokio::fs::remove_dir_all(&live_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[Pipeline] failed to remove live directory for slot {slot_id}: {e}");
            }
        }
        if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("[Pipeline] failed to remove archive file for slot {slot_id}: {e}");
            }
        }

        self.bus.broadcast(Outbound::StreamStatus {
            streams: self.streams(),
        });
        log::info!("[Pipeline] session for slot {slot_id} finished");
    }

    async fn upload_archive(
        &self,
        slot_id: u8,
        display_name: &str,
        started_at: u64,
        archive_path: &Path,
        file_size: u64,
    ) -> Result<(), String> {
        if !self.config.archive_configured() {
            log::warn!("[Upload] archive store not configured, skipping upload for slot {slot_id}");
            return Ok(());
        }
        let site_url = self.config.archive_site_url.as_deref().unwrap_or_default();
        let token = self.config.archive_bearer_token.as_deref().unwrap_or_default();

        #[derive(serde::Deserialize)]
        struct UploadUrlResponse {
            #[serde(rename = "uploadUrl")]
            upload_url: String,
        }
        #[derive(serde::Deserialize)]
        struct StorageIdResponse {
            #[serde(rename = "storageId")]
            storage_id: String,
        }
        #[derive(serde::Serialize)]
        struct SaveRequest<'a> {
            #[serde(rename = "storageId")]
            storage_id: &'a str,
            #[serde(rename = "agentName")]
            agent_name: &'a str,
            #[serde(rename = "agentId")]
            agent_id: u8,
            duration: u64,
            #[serde(rename = "recordedAt")]
            recorded_at: String,
            #[serde(rename = "fileSize")]
            file_size: u64,
            #[serde(rename = "mimeType")]
            mime_type: &'a str,
        }

        let upload_url_resp: UploadUrlResponse = self
            .http
            .post(format!("{site_url}/api/vod/upload-url"))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        let bytes = tokio::fs::read(archive_path)
            .await
            .map_err(|e| e.to_string())?;
        let mime_type = format!("video/{ARCHIVE_CONTAINER_EXTENSION}");

        let storage_resp: StorageIdResponse = self
            .http
            .post(&upload_url_resp.upload_url)
            .header("Content-Type", mime_type.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        let duration_secs = now_millis().saturating_sub(started_at) / 1000;
        let save_req = SaveRequest {
            storage_id: &storage_resp.storage_id,
            agent_name: display_name,
            agent_id: slot_id,
            duration: duration_secs,
            recorded_at: chrono::Utc::now().to_rfc3339(),
            file_size,
            mime_type: &mime_type,
        };

        self.http
            .post(format!("{site_url}/api/vod/save"))
            .bearer_auth(token)
            .json(&save_req)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        log::info!("[Upload] archived slot {slot_id} session ({file_size} bytes)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(live_root: PathBuf, recording_root: PathBuf) -> Arc<Config> {
        Arc::new(Config {
            bind_host: "127.0.0.1".to_string(),
            bind_port: 0,
            live_root,
            recording_root,
            transcoder_path: "true".to_string(),
            archive_site_url: None,
            archive_bearer_token: None,
            pipeline_stop_timeout_secs: 2,
            ws_max_frame_bytes: 1024,
        })
    }

    #[tokio::test]
    async fn start_registers_session_and_stop_removes_it() {
        let live_dir = tempfile::tempdir().unwrap();
        let recording_dir = tempfile::tempdir().unwrap();
        let config = test_config(
            live_dir.path().to_path_buf(),
            recording_dir.path().to_path_buf(),
        );
        let bus = BroadcastBus::new();
        let manager = PipelineManager::new(config, bus);

        manager.start(1, "Runner One").await.unwrap();
        assert!(manager.is_streaming(1));
        assert_eq!(manager.streams().len(), 1);

        manager.stop(1).await;
        assert!(!manager.is_streaming(1));

        // Give the background finish task a moment to run.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!live_dir.path().join("1").exists());
    }

    #[tokio::test]
    async fn start_twice_on_same_slot_is_rejected() {
        let live_dir = tempfile::tempdir().unwrap();
        let recording_dir = tempfile::tempdir().unwrap();
        let config = test_config(
            live_dir.path().to_path_buf(),
            recording_dir.path().to_path_buf(),
        );
        let bus = BroadcastBus::new();
        let manager = PipelineManager::new(config, bus);

        manager.start(1, "Runner One").await.unwrap();
        let result = manager.start(1, "Runner One").await;
        assert_eq!(result, Err("Already streaming".to_string()));

        manager.stop(1).await;
    }

    #[tokio::test]
    async fn stop_on_inactive_slot_is_a_noop() {
        let live_dir = tempfile::tempdir().unwrap();
        let recording_dir = tempfile::tempdir().unwrap();
        let config = test_config(
            live_dir.path().to_path_buf(),
            recording_dir.path().to_path_buf(),
        );
        let bus = BroadcastBus::new();
        let manager = PipelineManager::new(config, bus);

        manager.stop(7).await;
        assert!(!manager.is_streaming(7));
    }
}
