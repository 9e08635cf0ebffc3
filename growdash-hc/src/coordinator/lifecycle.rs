//! Session state and its lifecycle
//!
//! `in_progress` -> `completed`, once. Every mutation checks
//! [`SessionState::ensure_open`] before anything else.

use super::{ledger::Ledger, roster::Roster};
use crate::aggregator;
use crate::db::sessions::StoredSession;
use crate::error::{HarvestError, HarvestResult};
use crate::rooms::RoomInfo;
use chrono::{DateTime, Utc};
use growdash_common::harvest::{
    CompletionInputs, CrewRole, CrewSummary, OperatorId, Progress, SessionRecord, SessionStatus,
    SessionView,
};
use uuid::Uuid;

/// In-memory state of one session, guarded by the session lock
#[derive(Debug, Clone)]
pub struct SessionState {
    pub record: SessionRecord,
    pub roster: Roster,
    pub ledger: Ledger,
    pub summary: Option<CrewSummary>,
}

impl SessionState {
    /// Fresh session for `room`, expected count copied from the room
    pub fn open(room: &RoomInfo, at: DateTime<Utc>) -> Self {
        Self {
            record: SessionRecord {
                id: Uuid::new_v4(),
                room_id: room.id,
                room_name: room.name.clone(),
                expected_plant_count: room.plant_count,
                status: SessionStatus::InProgress,
                started_at: at,
                completed_at: None,
            },
            roster: Roster::new(),
            ledger: Ledger::new(),
            summary: None,
        }
    }

    pub fn from_stored(stored: StoredSession) -> Self {
        Self {
            record: stored.record,
            roster: Roster::from_history(stored.memberships),
            ledger: Ledger::from_records(stored.plants),
            summary: stored.summary,
        }
    }

    pub fn to_stored(&self) -> StoredSession {
        StoredSession {
            record: self.record.clone(),
            memberships: self.roster.history().to_vec(),
            plants: self.ledger.records().to_vec(),
            summary: self.summary.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn is_open(&self) -> bool {
        self.record.status == SessionStatus::InProgress
    }

    pub fn ensure_open(&self) -> HarvestResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(HarvestError::SessionClosed(self.record.id))
        }
    }

    /// Ledger writes need an open session and the weighing role
    pub fn ensure_ledger_writer(&self, operator_id: OperatorId) -> HarvestResult<()> {
        self.ensure_open()?;
        match self.roster.role_of(operator_id) {
            Some(role) if role.can_write_ledger() => Ok(()),
            _ => Err(HarvestError::RoleNotHeld {
                operator: operator_id,
            }),
        }
    }

    pub fn view(&self) -> SessionView {
        let plants = self.ledger.ordered();
        let progress = Progress::from_plants(&plants, self.record.expected_plant_count);
        SessionView {
            session: self.record.clone(),
            plants,
            crew: self.roster.active(),
            progress,
            summary: self.summary.clone(),
        }
    }

    /// Terminal transition: closes the roster and computes the summary
    pub fn complete(&mut self, inputs: CompletionInputs, at: DateTime<Utc>) -> HarvestResult<()> {
        self.ensure_open()?;

        let at = at.max(self.record.started_at);
        self.roster.close_all(at);
        self.record.status = SessionStatus::Completed;
        self.record.completed_at = Some(at);
        self.summary = Some(aggregator::summarize(
            &self.record,
            self.roster.history(),
            self.ledger.records(),
            inputs,
            at,
        ));
        Ok(())
    }

    /// Active weighing holder, who scans are recorded for
    pub fn weighing_operator(&self) -> Option<growdash_common::harvest::Operator> {
        self.roster
            .weighing_holder()
            .filter(|m| m.role == CrewRole::Weighing)
            .map(|m| m.operator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use growdash_common::harvest::{Operator, PlantRecord};

    fn room() -> RoomInfo {
        RoomInfo {
            id: Uuid::new_v4(),
            name: "Flower 3".to_string(),
            plant_count: 50,
            cycle_active: true,
            primary_strain: None,
            strain_ranges: Vec::new(),
        }
    }

    #[test]
    fn test_open_copies_room_fields() {
        let room = room();
        let state = SessionState::open(&room, Utc::now());
        assert_eq!(state.record.room_id, room.id);
        assert_eq!(state.record.expected_plant_count, 50);
        assert!(state.is_open());
        assert!(state.view().crew.is_empty());
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut state = SessionState::open(&room(), Utc::now());
        let ana = Operator::new(Uuid::new_v4(), "Ana");
        state.roster.join(&ana, CrewRole::Weighing, Utc::now()).unwrap();
        state
            .ledger
            .insert(PlantRecord::new(1, 210, ana.id, "Ana".to_string(), None))
            .unwrap();

        state.complete(CompletionInputs::default(), Utc::now()).unwrap();
        assert_eq!(state.record.status, SessionStatus::Completed);
        assert!(state.roster.active().is_empty());
        assert_eq!(state.summary.as_ref().unwrap().ledger.total_plants, 1);

        let before = state.record.clone();
        assert!(matches!(
            state.complete(CompletionInputs::default(), Utc::now()),
            Err(HarvestError::SessionClosed(_))
        ));
        assert_eq!(state.record, before);
    }

    #[test]
    fn test_ledger_writer_checks_order() {
        let mut state = SessionState::open(&room(), Utc::now());
        let ana = Operator::new(Uuid::new_v4(), "Ana");
        state.roster.join(&ana, CrewRole::Cutting, Utc::now()).unwrap();

        assert!(matches!(
            state.ensure_ledger_writer(ana.id),
            Err(HarvestError::RoleNotHeld { .. })
        ));

        state.complete(CompletionInputs::default(), Utc::now()).unwrap();
        assert!(matches!(
            state.ensure_ledger_writer(ana.id),
            Err(HarvestError::SessionClosed(_))
        ));
    }

    #[test]
    fn test_stored_round_trip_preserves_history() {
        let mut state = SessionState::open(&room(), Utc::now());
        let ana = Operator::new(Uuid::new_v4(), "Ana");
        state.roster.join(&ana, CrewRole::Cutting, Utc::now()).unwrap();
        state.roster.join(&ana, CrewRole::Weighing, Utc::now()).unwrap();

        let restored = SessionState::from_stored(state.to_stored());
        assert_eq!(restored.roster.history().len(), 2);
        assert_eq!(restored.weighing_operator(), Some(ana));
    }
}
