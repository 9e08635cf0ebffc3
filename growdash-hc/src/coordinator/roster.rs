//! Crew role registry for one session
//!
//! Keeps the full membership history plus an index from operator to their
//! active membership, so "what role does this operator hold" is a lookup
//! rather than a scan.

use crate::error::{HarvestError, HarvestResult};
use chrono::{DateTime, Utc};
use growdash_common::harvest::{CrewMembership, CrewRole, Operator, OperatorId};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Roster {
    /// Every membership ever opened, in join order
    memberships: Vec<CrewMembership>,
    /// Operator -> index of their active membership
    active: HashMap<OperatorId, usize>,
    /// Active holder of the exclusive weighing role
    weighing: Option<OperatorId>,
}

/// Result of a force-join
#[derive(Debug, Clone, PartialEq)]
pub struct ForceJoin {
    pub changed: bool,
    /// Previous holder whose membership was closed
    pub displaced: Option<Operator>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the indexes from stored history
    pub fn from_history(memberships: Vec<CrewMembership>) -> Self {
        let mut roster = Self {
            memberships,
            active: HashMap::new(),
            weighing: None,
        };

        for idx in 0..roster.memberships.len() {
            let m = &roster.memberships[idx];
            if !m.is_active() {
                continue;
            }
            let (operator_id, role, joined_at) = (m.operator_id, m.role, m.joined_at);
            if let Some(previous) = roster.active.insert(operator_id, idx) {
                warn!(operator_id = %operator_id, "Stored roster had two active memberships; keeping the later one");
                roster.memberships[previous].left_at = Some(joined_at);
                if roster.weighing == Some(operator_id) {
                    roster.weighing = None;
                }
            }
            if role.is_exclusive() {
                roster.weighing = Some(operator_id);
            }
        }

        roster
    }

    pub fn role_of(&self, operator_id: OperatorId) -> Option<CrewRole> {
        self.active
            .get(&operator_id)
            .map(|&idx| self.memberships[idx].role)
    }

    pub fn holds(&self, operator_id: OperatorId, role: CrewRole) -> bool {
        self.role_of(operator_id) == Some(role)
    }

    pub fn weighing_holder(&self) -> Option<&CrewMembership> {
        self.weighing
            .and_then(|id| self.active.get(&id))
            .map(|&idx| &self.memberships[idx])
    }

    /// Active memberships in join order
    pub fn active(&self) -> Vec<CrewMembership> {
        self.memberships
            .iter()
            .filter(|m| m.is_active())
            .cloned()
            .collect()
    }

    pub fn history(&self) -> &[CrewMembership] {
        &self.memberships
    }

    /// Join `role`; returns false when the operator already holds it
    ///
    /// Holding a different role closes that membership first. An exclusive
    /// role held by someone else is a conflict the caller must resolve with
    /// [`Roster::force_join`].
    pub fn join(
        &mut self,
        operator: &Operator,
        role: CrewRole,
        at: DateTime<Utc>,
    ) -> HarvestResult<bool> {
        if self.holds(operator.id, role) {
            return Ok(false);
        }

        if role.is_exclusive() {
            if let Some(holder) = self.weighing_holder() {
                if holder.operator_id != operator.id {
                    return Err(HarvestError::RoleConflict {
                        current_holder: holder.operator(),
                    });
                }
            }
        }

        self.close(operator.id, at);
        self.open(operator, role, at);
        Ok(true)
    }

    /// Take `role`, closing any other operator's hold on it
    pub fn force_join(&mut self, operator: &Operator, role: CrewRole, at: DateTime<Utc>) -> ForceJoin {
        if self.holds(operator.id, role) {
            return ForceJoin {
                changed: false,
                displaced: None,
            };
        }

        let displaced = if role.is_exclusive() {
            match self.weighing_holder().map(|m| m.operator()) {
                Some(holder) if holder.id != operator.id => {
                    self.close(holder.id, at);
                    Some(holder)
                }
                _ => None,
            }
        } else {
            None
        };

        self.close(operator.id, at);
        self.open(operator, role, at);

        ForceJoin {
            changed: true,
            displaced,
        }
    }

    /// Close the operator's active membership; false if they had none
    pub fn leave(&mut self, operator_id: OperatorId, at: DateTime<Utc>) -> bool {
        self.close(operator_id, at)
    }

    /// Close every active membership (session completion)
    pub fn close_all(&mut self, at: DateTime<Utc>) {
        let operators: Vec<OperatorId> = self.active.keys().copied().collect();
        for operator_id in operators {
            self.close(operator_id, at);
        }
    }

    fn close(&mut self, operator_id: OperatorId, at: DateTime<Utc>) -> bool {
        let Some(idx) = self.active.remove(&operator_id) else {
            return false;
        };
        let membership = &mut self.memberships[idx];
        membership.left_at = Some(at.max(membership.joined_at));
        if self.weighing == Some(operator_id) {
            self.weighing = None;
        }
        true
    }

    fn open(&mut self, operator: &Operator, role: CrewRole, at: DateTime<Utc>) {
        self.memberships.push(CrewMembership::open(operator, role, at));
        self.active.insert(operator.id, self.memberships.len() - 1);
        if role.is_exclusive() {
            self.weighing = Some(operator.id);
        }
    }
}
