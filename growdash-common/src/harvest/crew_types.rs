//! Crew roles and memberships

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Work role held by an operator during a session
///
/// `Weighing` is the only role with write authority over the ledger and
/// the only one limited to a single active holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewRole {
    Cutting,
    Room,
    Carrying,
    Weighing,
    Hooks,
    Hanging,
    Observer,
}

impl CrewRole {
    pub const ALL: [CrewRole; 7] = [
        CrewRole::Cutting,
        CrewRole::Room,
        CrewRole::Carrying,
        CrewRole::Weighing,
        CrewRole::Hooks,
        CrewRole::Hanging,
        CrewRole::Observer,
    ];

    /// At most one active holder per session
    pub fn is_exclusive(&self) -> bool {
        matches!(self, CrewRole::Weighing)
    }

    /// May record, remove and annotate plant records
    pub fn can_write_ledger(&self) -> bool {
        matches!(self, CrewRole::Weighing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrewRole::Cutting => "cutting",
            CrewRole::Room => "room",
            CrewRole::Carrying => "carrying",
            CrewRole::Weighing => "weighing",
            CrewRole::Hooks => "hooks",
            CrewRole::Hanging => "hanging",
            CrewRole::Observer => "observer",
        }
    }
}

impl std::fmt::Display for CrewRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CrewRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrewRole::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown crew role: {}", s))
    }
}

/// Authenticated operator identity, trusted as given
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operator {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
}

impl Operator {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One stint of one operator in one role
///
/// Memberships are never edited in place: switching roles closes the
/// current membership and opens a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMembership {
    pub operator_id: Uuid,
    pub operator_name: String,
    pub role: CrewRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl CrewMembership {
    pub fn open(operator: &Operator, role: CrewRole, joined_at: DateTime<Utc>) -> Self {
        Self {
            operator_id: operator.id,
            operator_name: operator.name.clone(),
            role,
            joined_at,
            left_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }

    pub fn operator(&self) -> Operator {
        Operator::new(self.operator_id, self.operator_name.clone())
    }

    /// Milliseconds spent in the role; open memberships count up to `now`
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let end = self.left_at.unwrap_or(now);
        (end - self.joined_at).num_milliseconds().max(0)
    }
}
