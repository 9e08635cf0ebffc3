//! Edge device endpoints
//!
//! GET /device/:room_id/link upgrades to a WebSocket carrying one JSON
//! `DeviceEvent` per text frame. Each barcode frame is answered with its
//! `ScanReport`. A newer link for the same room closes the older socket.
//! POST /device/:room_id/events takes a single event over plain HTTP.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use growdash_common::harvest::{DeviceEvent, EdgeDeviceStatus, RoomId};
use serde::Serialize;
use serde_json::json;

use super::operator::check_device_key;
use crate::device_bridge::{EdgeBridge, ScanReport};
use crate::error::ApiResult;
use crate::AppState;

/// POST /device/:room_id/events response
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanReport>,
}

/// GET /device/:room_id/link
pub async fn device_link(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = check_device_key(state.device_api_key.as_deref(), &headers) {
        tracing::warn!(room_id = %room_id, "Device link rejected: {}", e);
        return e.into_response();
    }

    let bridge = state.bridge.clone();
    ws.on_upgrade(move |socket| handle_link(socket, bridge, room_id))
}

async fn handle_link(socket: WebSocket, bridge: EdgeBridge, room_id: RoomId) {
    let link = bridge.connect(room_id).await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        let frame = tokio::select! {
            _ = link.superseded.cancelled() => {
                tracing::info!(room_id = %room_id, generation = link.generation, "Closing superseded device link");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            frame = receiver.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(room_id = %room_id, "Device link read error: {}", e);
                break;
            }
        };

        let event: DeviceEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(room_id = %room_id, "Malformed device event: {}", e);
                let reply = json!({ "error": { "code": "BAD_EVENT", "message": e.to_string() } });
                if sender.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let report = match bridge.ingest_from_link(room_id, link.generation, event).await {
            Ok(report) => report,
            Err(e) => {
                tracing::info!(room_id = %room_id, "{}; closing link", e);
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        };

        if let Some(report) = report {
            match serde_json::to_string(&report) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        tracing::debug!(room_id = %room_id, "Device link closed while replying");
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to serialize scan report: {}", e),
            }
        }
    }

    // No-op for a superseded link
    bridge.disconnect(room_id, link.generation).await;
}

/// POST /device/:room_id/events
pub async fn ingest_event(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    headers: HeaderMap,
    Json(event): Json<DeviceEvent>,
) -> ApiResult<Json<IngestResponse>> {
    check_device_key(state.device_api_key.as_deref(), &headers)?;
    let scan = state.bridge.ingest(room_id, event).await;
    Ok(Json(IngestResponse {
        accepted: true,
        scan,
    }))
}

/// GET /device/:room_id/status
pub async fn device_status(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> Json<EdgeDeviceStatus> {
    Json(state.bridge.status(room_id).await)
}

pub fn device_routes() -> Router<AppState> {
    Router::new()
        .route("/device/:room_id/link", get(device_link))
        .route("/device/:room_id/events", post(ingest_event))
        .route("/device/:room_id/status", get(device_status))
}
