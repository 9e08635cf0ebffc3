//! Harvest data model shared between the coordinator and its consumers
//!
//! A harvest session is the bounded record of one harvest pass over one
//! room. These types are the wire and storage shapes; the rules that keep
//! them consistent live in the coordinator.

mod crew_types;
mod device_types;
mod plant_types;
mod summary_types;

pub use crew_types::{CrewMembership, CrewRole, Operator};
pub use device_types::{DeviceEvent, DeviceTelemetry, EdgeDeviceStatus, ScanOutcome, WeightUnit};
pub use plant_types::PlantRecord;
pub use summary_types::{
    CarrierAssignment, CompletionInputs, CrewSummary, LedgerAggregates, MemberTiming,
    OperatorTotals, RecordingPace, RoleTiming, StrainBreakdown, TripMetrics,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Harvest session identifier
pub type SessionId = Uuid;
/// Room identifier (owned by the room/cycle service)
pub type RoomId = Uuid;
/// Operator identifier (owned by the identity service)
pub type OperatorId = Uuid;

/// Session lifecycle status. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session header fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub room_id: RoomId,
    /// Room name at open time
    pub room_name: String,
    /// Copied from the room's plant count at open time
    pub expected_plant_count: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Live progress figures derived from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub recorded: usize,
    pub expected: u32,
    pub total_wet_grams: u64,
    /// 0.0 - 100.0, 0.0 when nothing is expected
    pub percent: f64,
}

impl Progress {
    pub fn from_plants(plants: &[PlantRecord], expected: u32) -> Self {
        let recorded = plants.len();
        let total_wet_grams = plants.iter().map(|p| p.wet_weight_grams as u64).sum();
        let percent = if expected > 0 {
            ((recorded as f64 / expected as f64) * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            recorded,
            expected,
            total_wet_grams,
            percent,
        }
    }
}

/// Read-only snapshot of one session: header, ledger, active roster
///
/// This is the reconciliation point for clients that missed a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub session: SessionRecord,
    /// Ordered by `recorded_at`, ties in insertion order
    pub plants: Vec<PlantRecord>,
    /// Active memberships only
    pub crew: Vec<CrewMembership>,
    pub progress: Progress,
    /// Present once the session is completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CrewSummary>,
}

impl SessionView {
    pub fn plant(&self, plant_number: u32) -> Option<&PlantRecord> {
        self.plants.iter().find(|p| p.plant_number == plant_number)
    }

    /// Active holder of the given role(s)
    pub fn holders_of(&self, role: CrewRole) -> impl Iterator<Item = &CrewMembership> {
        self.crew.iter().filter(move |m| m.role == role)
    }
}
