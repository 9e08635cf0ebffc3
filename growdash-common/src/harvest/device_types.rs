//! Edge device wire events and the ephemeral status projection
//!
//! The weighing edge device (scale + barcode scanner gateway) sends one
//! `DeviceEvent` per message. Nothing here is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit attached to a scale reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    G,
    Kg,
    Lb,
    Oz,
}

impl WeightUnit {
    pub fn to_grams(&self, value: f64) -> f64 {
        match self {
            WeightUnit::G => value,
            WeightUnit::Kg => value * 1000.0,
            WeightUnit::Lb => value * 453.592_37,
            WeightUnit::Oz => value * 28.349_523_125,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::G => "g",
            WeightUnit::Kg => "kg",
            WeightUnit::Lb => "lb",
            WeightUnit::Oz => "oz",
        }
    }
}

/// Diagnostic telemetry from the device (advisory only)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    #[serde(default)]
    pub scale_connected: bool,
    #[serde(default)]
    pub barcode_connected: bool,
    #[serde(default)]
    pub serial_port: Option<String>,
    /// Seconds since the device process started
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub last_weight: Option<f64>,
    #[serde(default)]
    pub error_count: u32,
    /// Device wall clock, as reported
    #[serde(default)]
    pub device_time: Option<String>,
}

/// One event from the edge device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Live scale reading
    Weight {
        weight: Option<f64>,
        #[serde(default)]
        unit: WeightUnit,
        #[serde(default)]
        stable: bool,
    },

    /// Device-to-scale connectivity
    Status { connected: bool },

    /// Diagnostic telemetry
    Debug(DeviceTelemetry),

    /// Scanned plant barcode, live or replayed from the offline queue
    Barcode {
        barcode: String,
        /// Original scan time (set for buffered scans)
        #[serde(default)]
        scanned_at: Option<DateTime<Utc>>,
        /// Weight read at scan time, if the device captured one
        #[serde(default)]
        weight: Option<f64>,
        #[serde(default)]
        unit: Option<WeightUnit>,
        #[serde(default)]
        stable: Option<bool>,
        #[serde(default)]
        buffered: bool,
        /// Scans still queued on the device after this one
        #[serde(default)]
        remaining: Option<u32>,
    },
}

impl DeviceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::Weight { .. } => "weight",
            DeviceEvent::Status { .. } => "status",
            DeviceEvent::Debug(_) => "debug",
            DeviceEvent::Barcode { .. } => "barcode",
        }
    }
}

/// What happened to a scanned barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Added to the ledger
    Recorded,
    /// Plant number already recorded in the session
    Duplicate,
    /// Nobody holds the weighing role
    RoleNotHeld,
    /// Captured weight was not positive
    InvalidWeight,
    /// Barcode decoded to plant number 0
    InvalidPlantNumber,
    /// No weight available; an operator must complete the entry
    Pending,
    /// Room has no in-progress session
    NoSession,
    /// Session completed while the scan was in flight
    SessionClosed,
    /// Barcode carried no plant number
    Unparseable,
    /// Ledger write failed on the coordinator side
    Failed,
}

impl ScanOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ScanOutcome::Recorded)
    }
}

/// Projection of the most recent device events for one room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDeviceStatus {
    pub room_id: Uuid,
    /// Device-to-coordinator link
    pub link_connected: bool,
    pub scale_connected: bool,
    pub scanner_connected: bool,
    /// Raised only after the disconnect grace period expired
    pub offline_alert: bool,
    pub last_weight: Option<f64>,
    pub last_unit: WeightUnit,
    pub last_stable: bool,
    pub uptime_secs: Option<u64>,
    pub error_count: u32,
    pub serial_port: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    /// Buffered scans replayed since the coordinator started (monotonic)
    pub buffered_synced: u64,
    /// Backlog still queued on the device, as last reported
    pub backlog_remaining: u32,
    pub scans_accepted: u64,
    pub scans_rejected: u64,
}

impl EdgeDeviceStatus {
    pub fn new(room_id: Uuid) -> Self {
        Self {
            room_id,
            link_connected: false,
            scale_connected: false,
            scanner_connected: false,
            offline_alert: false,
            last_weight: None,
            last_unit: WeightUnit::G,
            last_stable: false,
            uptime_secs: None,
            error_count: 0,
            serial_port: None,
            last_event_at: None,
            buffered_synced: 0,
            backlog_remaining: 0,
            scans_accepted: 0,
            scans_rejected: 0,
        }
    }

    /// Latest stable reading in whole grams
    pub fn stable_grams(&self) -> Option<i64> {
        if !self.last_stable {
            return None;
        }
        self.last_weight
            .map(|w| self.last_unit.to_grams(w).round() as i64)
    }
}
