//! Crew summary produced once when a session completes
//!
//! Consumed by the reporting view only; the coordinator never reads it
//! back to make decisions.

use super::CrewRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Carry type chosen for a `carrying` crew member in the completion dialog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierAssignment {
    pub operator_id: Uuid,
    pub carry_type: String,
}

/// Optional facts entered at completion, used for trip metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionInputs {
    /// One-way distance from the room to the scale, meters
    #[serde(default)]
    pub distance_to_scale_m: Option<f64>,
    #[serde(default)]
    pub pot_weight_kg: Option<f64>,
    #[serde(default)]
    pub branches_per_plant: Option<f64>,
    #[serde(default)]
    pub pots_per_trip: Option<u32>,
    #[serde(default)]
    pub plants_per_trip: Option<u32>,
    #[serde(default)]
    pub carrier_assignments: Vec<CarrierAssignment>,
}

/// Time spent in one role across all of its memberships
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleTiming {
    pub role: CrewRole,
    pub elapsed_ms: i64,
    pub memberships: usize,
}

/// One membership as it appears in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberTiming {
    pub operator_id: Uuid,
    pub operator_name: String,
    pub role: CrewRole,
    pub carry_type: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
}

/// Everything one operator contributed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorTotals {
    pub operator_id: Uuid,
    pub operator_name: String,
    pub elapsed_ms: i64,
    pub roles: Vec<CrewRole>,
    pub plants_recorded: usize,
    pub wet_weight_grams: u64,
    /// From the carrier assignments, for `carrying` members
    pub carry_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainBreakdown {
    pub strain: String,
    pub plants: usize,
    pub wet_weight_grams: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerAggregates {
    pub total_plants: usize,
    pub expected_plants: u32,
    pub total_wet_grams: u64,
    pub average_wet_grams: Option<f64>,
    pub per_strain: Vec<StrainBreakdown>,
}

/// Carrying effort derived from the completion inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripMetrics {
    pub pot_trips: Option<u32>,
    pub plant_trips: Option<u32>,
    pub pot_distance_m: Option<f64>,
    pub plant_distance_m: Option<f64>,
    pub total_weight_carried_kg: Option<f64>,
    pub total_branches: Option<f64>,
}

/// Recording speed derived from record timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingPace {
    pub plants_per_minute: Option<f64>,
    pub fastest_gap_secs: Option<f64>,
    pub slowest_gap_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewSummary {
    pub session_id: Uuid,
    pub computed_at: DateTime<Utc>,
    pub session_duration_ms: i64,
    pub inputs: CompletionInputs,
    pub roles: Vec<RoleTiming>,
    pub operators: Vec<OperatorTotals>,
    pub members: Vec<MemberTiming>,
    pub ledger: LedgerAggregates,
    pub trips: TripMetrics,
    pub pace: RecordingPace,
}
