//! Harvest recording coordinator
//!
//! Owns every session's state behind a per-session lock. A mutation runs
//! on a copy of the state, is written through to the database, and only
//! then replaces the in-memory state and goes out on the fan-out channel.
//! A failed write therefore leaves memory and subscribers untouched.
//!
//! Lock order: a session lock may be held while taking the room index;
//! never the other way round.

pub mod ledger;
pub mod lifecycle;
pub mod roster;

pub use lifecycle::SessionState;

use crate::db::sessions::{self, SessionFilter};
use crate::error::{HarvestError, HarvestResult};
use crate::fanout::FanoutHub;
use crate::rooms::RoomDirectory;
use chrono::{DateTime, Utc};
use growdash_common::events::{HarvestEvent, LedgerChange};
use growdash_common::harvest::{
    CompletionInputs, CrewMembership, CrewRole, CrewSummary, Operator, PlantRecord, RoomId,
    SessionId, SessionRecord, SessionStatus, SessionView,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

type SessionSlot = Arc<Mutex<SessionState>>;

/// Result of [`Coordinator::open`]
#[derive(Debug, Clone)]
pub struct Opened {
    pub view: SessionView,
    /// False when the room's in-progress session was returned
    pub created: bool,
}

/// A plant entry captured by the edge device
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub plant_number: i64,
    pub wet_weight_grams: i64,
    /// Replayed from the device's offline queue
    pub buffered: bool,
    pub scanned_at: Option<DateTime<Utc>>,
}

/// Who a plant record is written for, and how it arrived
struct NewPlant {
    author: Operator,
    plant_number: i64,
    wet_weight_grams: i64,
    buffered: bool,
    scanned_at: Option<DateTime<Utc>>,
}

pub struct Coordinator {
    pool: SqlitePool,
    rooms: Arc<dyn RoomDirectory>,
    fanout: FanoutHub,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    /// Room -> its in-progress session
    active_rooms: RwLock<HashMap<RoomId, SessionId>>,
    /// Serializes `open` so a room never gets two sessions
    open_lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(pool: SqlitePool, rooms: Arc<dyn RoomDirectory>, fanout: FanoutHub) -> Self {
        Self {
            pool,
            rooms,
            fanout,
            sessions: RwLock::new(HashMap::new()),
            active_rooms: RwLock::new(HashMap::new()),
            open_lock: Mutex::new(()),
        }
    }

    pub fn fanout(&self) -> &FanoutHub {
        &self.fanout
    }

    /// Sessions currently held in memory
    pub async fn resident_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Load every in-progress session from the database
    ///
    /// Called once at startup, before the router accepts requests.
    pub async fn restore(&self) -> HarvestResult<usize> {
        let stored = sessions::load_in_progress(&self.pool).await?;
        let count = stored.len();

        let mut slots = self.sessions.write().await;
        let mut active = self.active_rooms.write().await;
        for session in stored {
            let state = SessionState::from_stored(session);
            let (id, room_id) = (state.id(), state.record.room_id);
            // Oldest first, so a newer duplicate wins
            if let Some(previous) = active.insert(room_id, id) {
                warn!(room_id = %room_id, previous = %previous, kept = %id, "Room had two in-progress sessions");
            }
            slots.insert(id, Arc::new(Mutex::new(state)));
        }

        info!("Restored {} in-progress harvest sessions", count);
        Ok(count)
    }

    async fn slot(&self, session_id: SessionId) -> HarvestResult<SessionSlot> {
        if let Some(slot) = self.sessions.read().await.get(&session_id) {
            return Ok(slot.clone());
        }

        // Not in memory: completed before a restart, or unknown
        let stored = sessions::load_session(&self.pool, session_id)
            .await?
            .ok_or(HarvestError::SessionNotFound(session_id))?;
        let state = SessionState::from_stored(stored);
        if !state.is_open() {
            // Completed sessions are read-only and stay out of memory
            return Ok(Arc::new(Mutex::new(state)));
        }

        let room_id = state.record.room_id;
        let slot = self
            .sessions
            .write()
            .await
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(state)))
            .clone();
        self.active_rooms
            .write()
            .await
            .entry(room_id)
            .or_insert(session_id);
        Ok(slot)
    }

    /// Write `next` through and make it the current state
    async fn commit(
        &self,
        guard: &mut MutexGuard<'_, SessionState>,
        next: SessionState,
    ) -> HarvestResult<()> {
        sessions::save_session(&self.pool, &next.to_stored()).await?;
        **guard = next;
        Ok(())
    }

    /// Open (or return) the room's in-progress session
    pub async fn open(&self, room_id: RoomId) -> HarvestResult<Opened> {
        let _serial = self.open_lock.lock().await;

        if let Some(existing) = self.active_session_id(room_id).await {
            let slot = self.slot(existing).await?;
            let state = slot.lock().await;
            if state.is_open() {
                debug!(room_id = %room_id, session_id = %existing, "Returning in-progress session");
                return Ok(Opened {
                    view: state.view(),
                    created: false,
                });
            }
        }

        let room = self
            .rooms
            .room(room_id)
            .await?
            .ok_or(HarvestError::RoomNotFound(room_id))?;
        if !room.cycle_active {
            return Err(HarvestError::RoomInactive(room_id));
        }

        let state = SessionState::open(&room, Utc::now());
        sessions::save_session(&self.pool, &state.to_stored()).await?;

        let session_id = state.id();
        let view = state.view();
        self.sessions
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(state)));
        self.active_rooms.write().await.insert(room_id, session_id);

        info!(
            session_id = %session_id,
            room_id = %room_id,
            expected = view.session.expected_plant_count,
            "Harvest session opened"
        );

        self.fanout.publish_lobby(HarvestEvent::SessionOpened {
            session_id,
            room_id,
            room_name: view.session.room_name.clone(),
            expected_plant_count: view.session.expected_plant_count,
            timestamp: Utc::now(),
        });

        Ok(Opened {
            view,
            created: true,
        })
    }

    /// Complete the session, computing its crew summary
    ///
    /// The room's cycle reset is best-effort and never undoes completion.
    pub async fn complete(
        &self,
        session_id: SessionId,
        inputs: CompletionInputs,
    ) -> HarvestResult<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;

        let mut next = state.clone();
        next.complete(inputs, Utc::now())?;
        self.commit(&mut state, next).await?;

        let room_id = state.record.room_id;
        {
            let mut active = self.active_rooms.write().await;
            if active.get(&room_id) == Some(&session_id) {
                active.remove(&room_id);
            }
        }

        let view = state.view();
        if let Some(summary) = &state.summary {
            info!(
                session_id = %session_id,
                plants = summary.ledger.total_plants,
                wet_grams = summary.ledger.total_wet_grams,
                "Harvest session completed"
            );
            let event = HarvestEvent::SessionCompleted {
                session_id,
                room_id,
                summary: summary.clone(),
                timestamp: Utc::now(),
            };
            self.fanout.publish(session_id, event.clone()).await;
            self.fanout.publish_lobby(event);
        }
        self.fanout.close(session_id).await;
        drop(state);
        self.sessions.write().await.remove(&session_id);

        if let Err(e) = self.rooms.reset_cycle(room_id).await {
            warn!(room_id = %room_id, "Cycle reset after harvest failed: {}", e);
        }

        Ok(view)
    }

    /// Join `role`; conflicts on an exclusive role are reported, not resolved
    pub async fn join(
        &self,
        session_id: SessionId,
        operator: &Operator,
        role: CrewRole,
    ) -> HarvestResult<Vec<CrewMembership>> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_open()?;

        let mut next = state.clone();
        if !next.roster.join(operator, role, Utc::now())? {
            return Ok(state.roster.active());
        }
        self.commit(&mut state, next).await?;

        info!(session_id = %session_id, operator_id = %operator.id, role = %role, "Crew joined");
        Ok(self.roster_changed(&state).await)
    }

    /// Take `role`, closing the current holder's membership
    pub async fn force_join(
        &self,
        session_id: SessionId,
        operator: &Operator,
        role: CrewRole,
    ) -> HarvestResult<Vec<CrewMembership>> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_open()?;

        let mut next = state.clone();
        let outcome = next.roster.force_join(operator, role, Utc::now());
        if !outcome.changed {
            return Ok(state.roster.active());
        }
        self.commit(&mut state, next).await?;

        match &outcome.displaced {
            Some(previous) => info!(
                session_id = %session_id,
                operator_id = %operator.id,
                displaced = %previous.id,
                role = %role,
                "Crew force-joined over current holder"
            ),
            None => info!(session_id = %session_id, operator_id = %operator.id, role = %role, "Crew force-joined"),
        }
        Ok(self.roster_changed(&state).await)
    }

    pub async fn leave(
        &self,
        session_id: SessionId,
        operator: &Operator,
    ) -> HarvestResult<Vec<CrewMembership>> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_open()?;

        let mut next = state.clone();
        if !next.roster.leave(operator.id, Utc::now()) {
            return Ok(state.roster.active());
        }
        self.commit(&mut state, next).await?;

        info!(session_id = %session_id, operator_id = %operator.id, "Crew left");
        Ok(self.roster_changed(&state).await)
    }

    async fn roster_changed(&self, state: &SessionState) -> Vec<CrewMembership> {
        let crew = state.roster.active();
        self.fanout
            .publish(
                state.id(),
                HarvestEvent::RosterChanged {
                    session_id: state.id(),
                    crew: crew.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        crew
    }

    /// Record a plant entered by the weighing operator
    pub async fn record(
        &self,
        session_id: SessionId,
        operator: &Operator,
        plant_number: i64,
        wet_weight_grams: i64,
    ) -> HarvestResult<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_ledger_writer(operator.id)?;

        self.insert_plant(
            &mut state,
            NewPlant {
                author: operator.clone(),
                plant_number,
                wet_weight_grams,
                buffered: false,
                scanned_at: None,
            },
        )
        .await
    }

    /// Record a device scan on behalf of the active weighing holder
    pub async fn record_scan(
        &self,
        session_id: SessionId,
        scan: ScanEntry,
    ) -> HarvestResult<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_open()?;
        let author = state
            .weighing_operator()
            .ok_or(HarvestError::WeighingVacant(session_id))?;

        self.insert_plant(
            &mut state,
            NewPlant {
                author,
                plant_number: scan.plant_number,
                wet_weight_grams: scan.wet_weight_grams,
                buffered: scan.buffered,
                scanned_at: scan.scanned_at,
            },
        )
        .await
    }

    async fn insert_plant(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
        plant: NewPlant,
    ) -> HarvestResult<SessionView> {
        let plant_number = u32::try_from(plant.plant_number)
            .ok()
            .filter(|n| *n >= 1)
            .ok_or(HarvestError::InvalidPlantNumber {
                plant_number: plant.plant_number,
            })?;
        let grams = u32::try_from(plant.wet_weight_grams)
            .ok()
            .filter(|g| *g > 0)
            .ok_or(HarvestError::InvalidWeight {
                grams: plant.wet_weight_grams,
            })?;
        if state.ledger.contains(plant_number) {
            return Err(HarvestError::DuplicatePlant { plant_number });
        }

        let room_id = state.record.room_id;
        let strain = match self.rooms.strain_for_plant(room_id, plant_number).await {
            Ok(strain) => strain,
            Err(e) => {
                warn!(room_id = %room_id, plant_number, "Strain lookup failed: {}", e);
                None
            }
        };

        let mut record = PlantRecord::new(
            plant_number,
            grams,
            plant.author.id,
            plant.author.name.clone(),
            strain,
        );
        record.buffered = plant.buffered;
        record.scanned_at = plant.scanned_at;

        let mut next = (**state).clone();
        next.ledger.insert(record)?;
        self.commit(state, next).await?;

        info!(
            session_id = %state.id(),
            plant_number,
            grams,
            buffered = plant.buffered,
            "Plant recorded"
        );
        Ok(self
            .ledger_changed(state, LedgerChange::Recorded { plant_number })
            .await)
    }

    /// Delete a plant record; absent numbers are not an error
    pub async fn remove(
        &self,
        session_id: SessionId,
        operator: &Operator,
        plant_number: u32,
    ) -> HarvestResult<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_ledger_writer(operator.id)?;

        if !state.ledger.contains(plant_number) {
            return Ok(state.view());
        }

        let mut next = state.clone();
        next.ledger.remove(plant_number);
        self.commit(&mut state, next).await?;

        info!(session_id = %session_id, plant_number, operator_id = %operator.id, "Plant removed");
        Ok(self
            .ledger_changed(&state, LedgerChange::Removed { plant_number })
            .await)
    }

    /// Set or clear a record's error note
    pub async fn annotate(
        &self,
        session_id: SessionId,
        operator: &Operator,
        plant_number: u32,
        error_note: Option<String>,
    ) -> HarvestResult<SessionView> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        state.ensure_ledger_writer(operator.id)?;

        let mut next = state.clone();
        next.ledger.annotate(plant_number, error_note)?;
        self.commit(&mut state, next).await?;

        debug!(session_id = %session_id, plant_number, "Plant annotated");
        Ok(self
            .ledger_changed(&state, LedgerChange::Annotated { plant_number })
            .await)
    }

    async fn ledger_changed(&self, state: &SessionState, change: LedgerChange) -> SessionView {
        let view = state.view();
        self.fanout
            .publish(
                state.id(),
                HarvestEvent::LedgerChanged {
                    session_id: state.id(),
                    change,
                    view: view.clone(),
                    timestamp: Utc::now(),
                },
            )
            .await;
        view
    }

    /// Current snapshot: header, ordered ledger, active crew
    pub async fn snapshot(&self, session_id: SessionId) -> HarvestResult<SessionView> {
        let slot = self.slot(session_id).await?;
        let state = slot.lock().await;
        Ok(state.view())
    }

    pub async fn active_session_count(&self) -> usize {
        self.active_rooms.read().await.len()
    }

    pub async fn active_session_id(&self, room_id: RoomId) -> Option<SessionId> {
        self.active_rooms.read().await.get(&room_id).copied()
    }

    pub async fn active_for_room(&self, room_id: RoomId) -> HarvestResult<Option<SessionView>> {
        match self.active_session_id(room_id).await {
            Some(session_id) => {
                let view = self.snapshot(session_id).await?;
                Ok((view.session.status == SessionStatus::InProgress).then_some(view))
            }
            None => Ok(None),
        }
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> HarvestResult<Vec<SessionRecord>> {
        Ok(sessions::list_sessions(&self.pool, filter).await?)
    }

    /// Stored crew summary; `None` until the session completes
    pub async fn summary(&self, session_id: SessionId) -> HarvestResult<Option<CrewSummary>> {
        let slot = self.slot(session_id).await?;
        let state = slot.lock().await;
        Ok(state.summary.clone())
    }
}
