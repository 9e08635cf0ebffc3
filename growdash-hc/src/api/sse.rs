//! Server-Sent Events for harvest observers
//!
//! GET /sessions/:id/events streams one session's channel, opening with a
//! `Snapshot` and ending once the session completes. GET /events streams
//! the lobby.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use growdash_common::events::HarvestEvent;
use growdash_common::harvest::{SessionId, SessionStatus};
use growdash_common::sse::{broadcast_sse_stream, to_sse_event, HEARTBEAT_INTERVAL};
use std::convert::Infallible;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::AppState;

/// GET /sessions/:id/events
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before taking the snapshot so no change falls in between
    let rx = state.fanout.subscribe(session_id).await;
    let view = match state.coordinator.snapshot(session_id).await {
        Ok(view) => view,
        Err(e) => {
            state.fanout.unsubscribe(session_id, rx).await;
            return Err(e.into());
        }
    };

    // A completed session gets no further events; end after the snapshot
    let rx = if view.session.status == SessionStatus::Completed {
        state.fanout.unsubscribe(session_id, rx).await;
        let (_, closed) = broadcast::channel(1);
        closed
    } else {
        rx
    };

    let initial = vec![HarvestEvent::Snapshot {
        view,
        timestamp: Utc::now(),
    }];
    Ok(broadcast_sse_stream(
        format!("session {}", session_id),
        initial,
        rx,
    ))
}

/// GET /events
pub async fn lobby_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected to lobby");

    let stream = BroadcastStream::new(state.fanout.subscribe_lobby()).filter_map(|result| async move {
        match result {
            Ok(event) => to_sse_event(&event).map(Ok),
            Err(e) => {
                // Lagged: missed events are skipped
                warn!("Lobby SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
