//! Real-time fan-out of harvest events
//!
//! One [`EventBus`] per observed session plus a lobby bus for session
//! open/complete and for device events of rooms without a session.
//! Delivery is best-effort: publishing never fails and never blocks.

use growdash_common::events::{EventBus, HarvestEvent};
use growdash_common::harvest::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

#[derive(Clone)]
pub struct FanoutHub {
    capacity: usize,
    lobby: EventBus,
    sessions: Arc<RwLock<HashMap<SessionId, EventBus>>>,
}

impl FanoutHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lobby: EventBus::new(capacity),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to one session's events
    pub async fn subscribe(&self, session_id: SessionId) -> broadcast::Receiver<HarvestEvent> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id)
            .or_insert_with(|| EventBus::new(self.capacity))
            .subscribe()
    }

    pub fn subscribe_lobby(&self) -> broadcast::Receiver<HarvestEvent> {
        self.lobby.subscribe()
    }

    /// Drop a receiver and release the session channel if it was the last
    pub async fn unsubscribe(&self, session_id: SessionId, rx: broadcast::Receiver<HarvestEvent>) {
        drop(rx);
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&session_id)
            .is_some_and(|bus| bus.subscriber_count() == 0)
        {
            sessions.remove(&session_id);
            debug!(session_id = %session_id, "Session channel released");
        }
    }

    /// Publish to a session's observers; no-op when nobody listens
    pub async fn publish(&self, session_id: SessionId, event: HarvestEvent) {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&session_id) {
                Some(bus) if bus.subscriber_count() > 0 => {
                    bus.emit_lossy(event);
                    return;
                }
                Some(_) => {}
                None => return,
            }
        }

        // Every subscriber went away without unsubscribing
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&session_id)
            .is_some_and(|bus| bus.subscriber_count() == 0)
        {
            sessions.remove(&session_id);
        }
    }

    /// Release a session's channel; receivers drain what is queued, then see `Closed`
    pub async fn close(&self, session_id: SessionId) {
        if self.sessions.write().await.remove(&session_id).is_some() {
            debug!(session_id = %session_id, "Session channel closed");
        }
    }

    pub fn publish_lobby(&self, event: HarvestEvent) {
        self.lobby.emit_lossy(event);
    }

    /// Number of session channels currently held open
    pub async fn channel_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn subscriber_count(&self, session_id: SessionId) -> usize {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .map_or(0, |bus| bus.subscriber_count())
    }
}
