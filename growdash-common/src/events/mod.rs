//! Event types for the growdash event system
//!
//! Provides the harvest event definitions and the EventBus used by the
//! real-time fan-out channel.

use crate::harvest::{
    CrewMembership, CrewSummary, DeviceTelemetry, EdgeDeviceStatus, ScanOutcome, SessionView,
    WeightUnit,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which ledger mutation produced a `LedgerChanged` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LedgerChange {
    Recorded { plant_number: u32 },
    Removed { plant_number: u32 },
    Annotated { plant_number: u32 },
}

/// Harvest event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Delivery is best-effort: a client that misses one re-fetches the
/// session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    /// Full session state, sent first on every new session stream
    Snapshot {
        view: SessionView,
        timestamp: DateTime<Utc>,
    },

    /// A room got a new in-progress session
    ///
    /// Triggers:
    /// - Lobby SSE: room dashboards switch to harvest mode
    SessionOpened {
        session_id: Uuid,
        room_id: Uuid,
        room_name: String,
        expected_plant_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// Session reached its terminal state
    ///
    /// Triggers:
    /// - Session SSE: clients show the crew summary
    /// - Lobby SSE: room dashboards leave harvest mode
    SessionCompleted {
        session_id: Uuid,
        room_id: Uuid,
        summary: CrewSummary,
        timestamp: DateTime<Utc>,
    },

    /// Crew roster changed (join, force-join, leave)
    RosterChanged {
        session_id: Uuid,
        /// Active memberships after the change
        crew: Vec<CrewMembership>,
        timestamp: DateTime<Utc>,
    },

    /// Ledger changed (record, remove, annotate)
    LedgerChanged {
        session_id: Uuid,
        change: LedgerChange,
        view: SessionView,
        timestamp: DateTime<Utc>,
    },

    /// Live scale reading, relayed verbatim, never persisted
    DeviceWeight {
        room_id: Uuid,
        weight: Option<f64>,
        unit: WeightUnit,
        stable: bool,
        timestamp: DateTime<Utc>,
    },

    /// Device connectivity projection changed
    DeviceStatusChanged {
        room_id: Uuid,
        status: EdgeDeviceStatus,
        timestamp: DateTime<Utc>,
    },

    /// Advisory diagnostics from the device
    DeviceTelemetry {
        room_id: Uuid,
        telemetry: DeviceTelemetry,
        timestamp: DateTime<Utc>,
    },

    /// A barcode arrived from the device and was offered to the ledger
    BarcodeScanned {
        room_id: Uuid,
        barcode: String,
        plant_number: Option<u32>,
        outcome: ScanOutcome,
        buffered: bool,
        /// Monotonic count of replayed buffered scans
        buffered_synced: u64,
        /// Scans still queued on the device
        backlog_remaining: u32,
        timestamp: DateTime<Utc>,
    },

    /// Device stayed disconnected past the grace period
    DeviceOffline {
        room_id: Uuid,
        disconnected_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Device came back after an offline alert
    DeviceOnline {
        room_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl HarvestEvent {
    /// Get event type as string for SSE event names and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            HarvestEvent::Snapshot { .. } => "Snapshot",
            HarvestEvent::SessionOpened { .. } => "SessionOpened",
            HarvestEvent::SessionCompleted { .. } => "SessionCompleted",
            HarvestEvent::RosterChanged { .. } => "RosterChanged",
            HarvestEvent::LedgerChanged { .. } => "LedgerChanged",
            HarvestEvent::DeviceWeight { .. } => "DeviceWeight",
            HarvestEvent::DeviceStatusChanged { .. } => "DeviceStatusChanged",
            HarvestEvent::DeviceTelemetry { .. } => "DeviceTelemetry",
            HarvestEvent::BarcodeScanned { .. } => "BarcodeScanned",
            HarvestEvent::DeviceOffline { .. } => "DeviceOffline",
            HarvestEvent::DeviceOnline { .. } => "DeviceOnline",
        }
    }

    /// Session the event belongs to, if it is session-scoped
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            HarvestEvent::Snapshot { view, .. } | HarvestEvent::LedgerChanged { view, .. } => {
                Some(view.session.id)
            }
            HarvestEvent::SessionOpened { session_id, .. }
            | HarvestEvent::SessionCompleted { session_id, .. }
            | HarvestEvent::RosterChanged { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event distribution bus backed by `tokio::broadcast`
///
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged receivers skip the events they missed
///
/// # Examples
///
/// ```
/// use growdash_common::events::{EventBus, HarvestEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(HarvestEvent::DeviceOnline {
///     room_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "DeviceOnline");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HarvestEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
