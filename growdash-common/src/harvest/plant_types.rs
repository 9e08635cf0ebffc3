//! Plant records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One harvested plant's wet weight and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantRecord {
    /// Unique within a session, >= 1
    pub plant_number: u32,
    /// Whole grams, > 0
    pub wet_weight_grams: u32,
    /// Denormalized from the room layout at record time
    #[serde(default)]
    pub strain: Option<String>,
    pub recorded_by: Uuid,
    #[serde(default)]
    pub recorded_by_name: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub error_note: Option<String>,
    /// Replayed from the edge device's offline queue
    #[serde(default)]
    pub buffered: bool,
    /// Original scan time for scans captured on the edge device
    #[serde(default)]
    pub scanned_at: Option<DateTime<Utc>>,
}

impl PlantRecord {
    pub fn new(
        plant_number: u32,
        wet_weight_grams: u32,
        recorded_by: Uuid,
        recorded_by_name: String,
        strain: Option<String>,
    ) -> Self {
        Self {
            plant_number,
            wet_weight_grams,
            strain,
            recorded_by,
            recorded_by_name,
            recorded_at: Utc::now(),
            error_note: None,
            buffered: false,
            scanned_at: None,
        }
    }
}
