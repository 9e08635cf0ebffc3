//! Edge device bridge
//!
//! Connection manager for the weighing edge device of each room:
//! `connect` / `ingest` / `disconnect` / `status`. Weight, status and
//! telemetry events only update the [`EdgeDeviceStatus`] projection and are
//! relayed to clients. Barcodes, live or replayed from the device's offline
//! queue, go through the same ledger checks as a manual entry.
//!
//! A dropped link is reported only if the device stays away for the grace
//! period; reconnecting inside the window has no client-visible effect.
//!
//! One producer per room: a new link supersedes the previous one, whose
//! events are refused from then on.

use crate::coordinator::{Coordinator, ScanEntry};
use crate::error::HarvestError;
use chrono::{DateTime, Utc};
use growdash_common::events::HarvestEvent;
use growdash_common::harvest::{DeviceEvent, EdgeDeviceStatus, RoomId, ScanOutcome, WeightUnit};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Extract the plant number from a scanned barcode
///
/// The trailing run of ASCII digits is the plant number: `"P-0042"` -> 42.
pub fn parse_plant_number(barcode: &str) -> Option<i64> {
    let trimmed = barcode.trim();
    let digits_start = trimmed
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    trimmed[digits_start..].parse().ok()
}

/// What happened to one scanned barcode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub barcode: String,
    pub plant_number: Option<i64>,
    pub outcome: ScanOutcome,
    pub buffered: bool,
}

/// A live link, as held by its connection task
#[derive(Debug, Clone)]
pub struct LinkHandle {
    pub generation: u64,
    /// Cancelled when a newer link for the same room connects
    pub superseded: CancellationToken,
}

/// An event arrived on a link that a newer one has replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Device link {generation} for room {room_id} was superseded")]
pub struct LinkSuperseded {
    pub room_id: RoomId,
    pub generation: u64,
}

struct DeviceLink {
    status: EdgeDeviceStatus,
    /// Bumped on every connect; stale events and disconnects are ignored
    generation: u64,
    live: Option<CancellationToken>,
    grace_timer: Option<CancellationToken>,
    disconnected_at: Option<DateTime<Utc>>,
}

impl DeviceLink {
    fn new(room_id: RoomId) -> Self {
        Self {
            status: EdgeDeviceStatus::new(room_id),
            generation: 0,
            live: None,
            grace_timer: None,
            disconnected_at: None,
        }
    }
}

struct BridgeInner {
    coordinator: Arc<Coordinator>,
    grace: Duration,
    links: Mutex<HashMap<RoomId, DeviceLink>>,
}

#[derive(Clone)]
pub struct EdgeBridge {
    inner: Arc<BridgeInner>,
}

impl EdgeBridge {
    pub fn new(coordinator: Arc<Coordinator>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                coordinator,
                grace,
                links: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a live link for `room_id`
    ///
    /// A newer link supersedes an older one for the same room: the older
    /// handle's `superseded` token is cancelled.
    pub async fn connect(&self, room_id: RoomId) -> LinkHandle {
        let (handle, status, was_alerted, within_grace) = {
            let mut links = self.inner.links.lock().await;
            let link = links
                .entry(room_id)
                .or_insert_with(|| DeviceLink::new(room_id));

            link.generation += 1;
            let superseded = CancellationToken::new();
            if let Some(previous) = link.live.replace(superseded.clone()) {
                info!(room_id = %room_id, generation = link.generation - 1, "Edge device link superseded");
                previous.cancel();
            }
            let within_grace = match link.grace_timer.take() {
                Some(timer) => {
                    timer.cancel();
                    true
                }
                None => false,
            };
            let was_alerted = link.status.offline_alert;

            link.status.link_connected = true;
            link.status.offline_alert = false;
            link.status.last_event_at = Some(Utc::now());
            link.disconnected_at = None;

            let handle = LinkHandle {
                generation: link.generation,
                superseded,
            };
            (handle, link.status.clone(), was_alerted, within_grace)
        };

        if within_grace {
            debug!(room_id = %room_id, "Edge device reconnected within grace period");
            return handle;
        }

        info!(room_id = %room_id, generation = handle.generation, "Edge device connected");
        if was_alerted {
            self.inner
                .publish_for_room(
                    room_id,
                    HarvestEvent::DeviceOnline {
                        room_id,
                        timestamp: Utc::now(),
                    },
                )
                .await;
        }
        self.inner.publish_status(room_id, status).await;
        handle
    }

    /// Link `generation` went away; starts the grace timer
    pub async fn disconnect(&self, room_id: RoomId, generation: u64) {
        let token = {
            let mut links = self.inner.links.lock().await;
            let Some(link) = links.get_mut(&room_id) else {
                return;
            };
            if link.generation != generation {
                debug!(room_id = %room_id, generation, "Ignoring disconnect of superseded link");
                return;
            }
            if !link.status.link_connected {
                return;
            }

            link.live = None;
            link.status.link_connected = false;
            link.disconnected_at = Some(Utc::now());
            let token = CancellationToken::new();
            if let Some(old) = link.grace_timer.replace(token.clone()) {
                old.cancel();
            }
            token
        };

        debug!(room_id = %room_id, grace_ms = self.inner.grace.as_millis() as u64, "Edge device link dropped");

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(inner.grace) => {
                    inner.raise_offline(room_id, generation).await;
                }
            }
        });
    }

    /// Current projection for the room's device
    pub async fn status(&self, room_id: RoomId) -> EdgeDeviceStatus {
        self.inner
            .links
            .lock()
            .await
            .get(&room_id)
            .map(|link| link.status.clone())
            .unwrap_or_else(|| EdgeDeviceStatus::new(room_id))
    }

    /// Apply an event read from link `generation`
    ///
    /// Refused once a newer link has connected for the room.
    pub async fn ingest_from_link(
        &self,
        room_id: RoomId,
        generation: u64,
        event: DeviceEvent,
    ) -> Result<Option<ScanReport>, LinkSuperseded> {
        let current = self
            .inner
            .links
            .lock()
            .await
            .get(&room_id)
            .is_some_and(|link| link.generation == generation && link.live.is_some());
        if !current {
            warn!(room_id = %room_id, generation, kind = event.kind(), "Refusing event from superseded link");
            return Err(LinkSuperseded {
                room_id,
                generation,
            });
        }
        Ok(self.ingest(room_id, event).await)
    }

    /// Apply one device event; barcodes return their scan report
    pub async fn ingest(&self, room_id: RoomId, event: DeviceEvent) -> Option<ScanReport> {
        debug!(room_id = %room_id, kind = event.kind(), "Device event");

        match event {
            DeviceEvent::Weight {
                weight,
                unit,
                stable,
            } => {
                self.inner
                    .update(room_id, |s| {
                        s.last_weight = weight;
                        s.last_unit = unit;
                        s.last_stable = stable;
                    })
                    .await;
                self.inner
                    .publish_for_room(
                        room_id,
                        HarvestEvent::DeviceWeight {
                            room_id,
                            weight,
                            unit,
                            stable,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
                None
            }
            DeviceEvent::Status { connected } => {
                let status = self
                    .inner
                    .update(room_id, |s| {
                        s.scale_connected = connected;
                        s.clone()
                    })
                    .await;
                self.inner.publish_status(room_id, status).await;
                None
            }
            DeviceEvent::Debug(telemetry) => {
                self.inner
                    .update(room_id, |s| {
                        s.scale_connected = telemetry.scale_connected;
                        s.scanner_connected = telemetry.barcode_connected;
                        s.serial_port = telemetry.serial_port.clone();
                        s.uptime_secs = telemetry.uptime;
                        s.error_count = telemetry.error_count;
                    })
                    .await;
                self.inner
                    .publish_for_room(
                        room_id,
                        HarvestEvent::DeviceTelemetry {
                            room_id,
                            telemetry,
                            timestamp: Utc::now(),
                        },
                    )
                    .await;
                None
            }
            DeviceEvent::Barcode {
                barcode,
                scanned_at,
                weight,
                unit,
                stable: _,
                buffered,
                remaining,
            } => Some(
                self.inner
                    .handle_scan(room_id, barcode, scanned_at, weight, unit, buffered, remaining)
                    .await,
            ),
        }
    }
}

impl BridgeInner {
    async fn update<R>(&self, room_id: RoomId, f: impl FnOnce(&mut EdgeDeviceStatus) -> R) -> R {
        let mut links = self.links.lock().await;
        let link = links
            .entry(room_id)
            .or_insert_with(|| DeviceLink::new(room_id));
        link.status.last_event_at = Some(Utc::now());
        f(&mut link.status)
    }

    /// Device events go to the room's session, or the lobby when idle
    async fn publish_for_room(&self, room_id: RoomId, event: HarvestEvent) {
        let fanout = self.coordinator.fanout();
        match self.coordinator.active_session_id(room_id).await {
            Some(session_id) => fanout.publish(session_id, event).await,
            None => fanout.publish_lobby(event),
        }
    }

    async fn publish_status(&self, room_id: RoomId, status: EdgeDeviceStatus) {
        self.publish_for_room(
            room_id,
            HarvestEvent::DeviceStatusChanged {
                room_id,
                status,
                timestamp: Utc::now(),
            },
        )
        .await;
    }

    async fn raise_offline(&self, room_id: RoomId, generation: u64) {
        let raised = {
            let mut links = self.links.lock().await;
            match links.get_mut(&room_id) {
                Some(link)
                    if link.generation == generation
                        && !link.status.link_connected
                        && !link.status.offline_alert =>
                {
                    link.status.offline_alert = true;
                    link.grace_timer = None;
                    Some((
                        link.status.clone(),
                        link.disconnected_at.unwrap_or_else(Utc::now),
                    ))
                }
                _ => None,
            }
        };

        let Some((status, disconnected_at)) = raised else {
            return;
        };

        warn!(room_id = %room_id, "Edge device offline past grace period");
        self.publish_for_room(
            room_id,
            HarvestEvent::DeviceOffline {
                room_id,
                disconnected_at,
                timestamp: Utc::now(),
            },
        )
        .await;
        self.publish_status(room_id, status).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_scan(
        &self,
        room_id: RoomId,
        barcode: String,
        scanned_at: Option<DateTime<Utc>>,
        weight: Option<f64>,
        unit: Option<WeightUnit>,
        buffered: bool,
        remaining: Option<u32>,
    ) -> ScanReport {
        let plant_number = parse_plant_number(&barcode);

        let grams = self
            .update(room_id, |s| {
                if buffered {
                    s.buffered_synced += 1;
                }
                if let Some(remaining) = remaining {
                    s.backlog_remaining = remaining;
                } else if buffered {
                    s.backlog_remaining = s.backlog_remaining.saturating_sub(1);
                }

                // A weight captured with the scan wins over the live reading
                match weight {
                    Some(w) => Some(unit.unwrap_or(s.last_unit).to_grams(w).round() as i64),
                    None => s.stable_grams(),
                }
            })
            .await;

        let outcome = self
            .scan_outcome(room_id, plant_number, grams, buffered, scanned_at)
            .await;

        let status = self
            .update(room_id, |s| {
                if outcome.is_accepted() {
                    s.scans_accepted += 1;
                } else {
                    s.scans_rejected += 1;
                }
                s.clone()
            })
            .await;

        if outcome.is_accepted() {
            debug!(room_id = %room_id, barcode = %barcode, buffered, "Scan recorded");
        } else {
            info!(room_id = %room_id, barcode = %barcode, buffered, outcome = ?outcome, "Scan not recorded");
        }

        self.publish_for_room(
            room_id,
            HarvestEvent::BarcodeScanned {
                room_id,
                barcode: barcode.clone(),
                plant_number: plant_number.and_then(|n| u32::try_from(n).ok()),
                outcome,
                buffered,
                buffered_synced: status.buffered_synced,
                backlog_remaining: status.backlog_remaining,
                timestamp: Utc::now(),
            },
        )
        .await;

        ScanReport {
            barcode,
            plant_number,
            outcome,
            buffered,
        }
    }

    async fn scan_outcome(
        &self,
        room_id: RoomId,
        plant_number: Option<i64>,
        grams: Option<i64>,
        buffered: bool,
        scanned_at: Option<DateTime<Utc>>,
    ) -> ScanOutcome {
        let Some(plant_number) = plant_number else {
            return ScanOutcome::Unparseable;
        };
        let Some(session_id) = self.coordinator.active_session_id(room_id).await else {
            return ScanOutcome::NoSession;
        };
        // No weight to go with it: an operator completes the entry
        let Some(grams) = grams else {
            return ScanOutcome::Pending;
        };

        let entry = ScanEntry {
            plant_number,
            wet_weight_grams: grams,
            buffered,
            scanned_at,
        };

        match self.coordinator.record_scan(session_id, entry).await {
            Ok(_) => ScanOutcome::Recorded,
            Err(HarvestError::DuplicatePlant { .. }) => ScanOutcome::Duplicate,
            Err(HarvestError::WeighingVacant(_)) | Err(HarvestError::RoleNotHeld { .. }) => {
                ScanOutcome::RoleNotHeld
            }
            Err(HarvestError::InvalidWeight { .. }) => ScanOutcome::InvalidWeight,
            Err(HarvestError::InvalidPlantNumber { .. }) => ScanOutcome::InvalidPlantNumber,
            Err(HarvestError::SessionClosed(_)) => ScanOutcome::SessionClosed,
            Err(HarvestError::SessionNotFound(_)) => ScanOutcome::NoSession,
            Err(e) => {
                error!(room_id = %room_id, plant_number, "Scan could not be recorded: {}", e);
                ScanOutcome::Failed
            }
        }
    }
}
