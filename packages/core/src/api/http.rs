//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws::handle_ws_upgrade;
use crate::api::AppState;
use crate::error::HubError;
use crate::protocol_constants::{MAX_SLOTS, SERVICE_NAME};
use crate::utils::now_millis;

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_descriptor))
        .route("/health", get(health))
        .route("/streams", get(list_streams))
        .route("/live/{agent_id}/{filename}", get(serve_live_file))
        .route("/ws", get(handle_ws_upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn service_descriptor() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "maxSlots": MAX_SLOTS,
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "clients": state.connections.connection_count(),
        "activeStreams": state.pipelines.streams().len(),
        "timestamp": now_millis(),
    }))
}

async fn list_streams(State(state): State<AppState>) -> Json<Vec<serde_json::Value>> {
    let now = now_millis();
    let entries = state
        .pipelines
        .streams()
        .into_iter()
        .map(|s| {
            serde_json::json!({
                "agentId": s.agent_id,
                "name": s.name,
                "hlsUrl": s.hls_url,
                "startedAt": s.started_at,
                "durationSeconds": now.saturating_sub(s.started_at) / 1000,
            })
        })
        .collect();
    Json(entries)
}

/// Serves one file (the playlist or a segment) out of a slot's live
/// directory. The content type is chosen by extension since both the
/// playlist and segment routes share this handler.
async fn serve_live_file(
    State(state): State<AppState>,
    Path((agent_id, filename)): Path<(u8, String)>,
) -> Response {
    let path = state
        .config
        .live_root
        .join(agent_id.to_string())
        .join(&filename);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(_) => return HubError::SlotNotFound(agent_id).into_response(),
    };

    let content_type = if filename.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else {
        "video/mp2t"
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        bytes,
    )
        .into_response()
}
