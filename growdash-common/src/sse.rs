//! Server-Sent Events (SSE) utilities
//!
//! Turns an EventBus subscription into an SSE response with a heartbeat.

use crate::events::HarvestEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Heartbeat interval for every SSE stream
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serialize one event into an SSE frame named after its type
pub fn to_sse_event(event: &HarvestEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// Forward events from `rx` to an SSE client
///
/// `initial` events are sent first (e.g. a session snapshot). A lagged
/// receiver skips the missed events and keeps going; clients reconcile by
/// re-fetching state. The stream ends when the bus is dropped.
pub fn broadcast_sse_stream(
    label: String,
    initial: Vec<HarvestEvent>,
    mut rx: broadcast::Receiver<HarvestEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {}", label);

    let stream = async_stream::stream! {
        for event in &initial {
            if let Some(frame) = to_sse_event(event) {
                yield Ok(frame);
            }
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            debug!("SSE: Broadcasting {} on {}", event.event_type(), label);
                            if let Some(frame) = to_sse_event(&event) {
                                yield Ok(frame);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("SSE: {} client lagged, skipped {} events", label, skipped);
                        }
                        Err(RecvError::Closed) => {
                            info!("SSE: {} stream closed", label);
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
