//! Room/Cycle collaborator
//!
//! The coordinator reads a room's plant count and active-cycle flag at
//! open, looks up strains when recording, and signals a cycle reset at
//! completion. Room layout itself is owned elsewhere.

use async_trait::async_trait;
use growdash_common::harvest::RoomId;
use growdash_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Plant-number range planted with one strain (inclusive)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrainRange {
    pub strain: String,
    pub start: u32,
    pub end: u32,
}

impl StrainRange {
    pub fn contains(&self, plant_number: u32) -> bool {
        self.start <= plant_number && plant_number <= self.end
    }
}

/// What the coordinator needs to know about a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub plant_count: u32,
    pub cycle_active: bool,
    /// Strain for rooms without a range layout
    pub primary_strain: Option<String>,
    pub strain_ranges: Vec<StrainRange>,
}

impl RoomInfo {
    /// Strain planted at `plant_number`
    ///
    /// A matching range wins; a room with a single range uses it for every
    /// plant; a room without ranges falls back to its primary strain.
    pub fn strain_for(&self, plant_number: u32) -> Option<String> {
        if self.strain_ranges.is_empty() {
            return self.primary_strain.clone().filter(|s| !s.is_empty());
        }

        if let Some(range) = self.strain_ranges.iter().find(|r| r.contains(plant_number)) {
            return Some(range.strain.clone());
        }

        match self.strain_ranges.as_slice() {
            [only] => Some(only.strain.clone()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn room(&self, room_id: RoomId) -> Result<Option<RoomInfo>>;

    /// Clear the room's active-cycle flag after its harvest completes
    async fn reset_cycle(&self, room_id: RoomId) -> Result<()>;

    async fn strain_for_plant(&self, room_id: RoomId, plant_number: u32) -> Result<Option<String>> {
        Ok(self
            .room(room_id)
            .await?
            .and_then(|room| room.strain_for(plant_number)))
    }
}

/// Rooms read from the shared growdash database
#[derive(Clone)]
pub struct SqliteRoomDirectory {
    pool: SqlitePool,
}

impl SqliteRoomDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a room and its strain layout
    pub async fn upsert_room(&self, room: &RoomInfo) -> Result<()> {
        let room_id = room.id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, plant_count, cycle_active, primary_strain)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                plant_count = excluded.plant_count,
                cycle_active = excluded.cycle_active,
                primary_strain = excluded.primary_strain
            "#,
        )
        .bind(&room_id)
        .bind(&room.name)
        .bind(room.plant_count as i64)
        .bind(room.cycle_active)
        .bind(&room.primary_strain)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM room_strains WHERE room_id = ?")
            .bind(&room_id)
            .execute(&mut *tx)
            .await?;

        for (position, range) in room.strain_ranges.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO room_strains (room_id, position, strain, start_plant, end_plant)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&room_id)
            .bind(position as i64)
            .bind(&range.strain)
            .bind(range.start as i64)
            .bind(range.end as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(room_id = %room.id, "Room saved");
        Ok(())
    }
}

#[async_trait]
impl RoomDirectory for SqliteRoomDirectory {
    async fn room(&self, room_id: RoomId) -> Result<Option<RoomInfo>> {
        let id = room_id.to_string();

        let row = sqlx::query(
            "SELECT name, plant_count, cycle_active, primary_strain FROM rooms WHERE id = ?",
        )
        .bind(&id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let ranges = sqlx::query(
            r#"
            SELECT strain, start_plant, end_plant
            FROM room_strains
            WHERE room_id = ?
            ORDER BY position
            "#,
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await?;

        let strain_ranges = ranges
            .iter()
            .map(|r| {
                let start: i64 = r.get("start_plant");
                let end: i64 = r.get("end_plant");
                Ok(StrainRange {
                    strain: r.get("strain"),
                    start: u32::try_from(start)
                        .map_err(|_| Error::Internal(format!("Bad start_plant {}", start)))?,
                    end: u32::try_from(end)
                        .map_err(|_| Error::Internal(format!("Bad end_plant {}", end)))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let plant_count: i64 = row.get("plant_count");

        Ok(Some(RoomInfo {
            id: room_id,
            name: row.get("name"),
            plant_count: u32::try_from(plant_count).unwrap_or(0),
            cycle_active: row.get("cycle_active"),
            primary_strain: row.get("primary_strain"),
            strain_ranges,
        }))
    }

    async fn reset_cycle(&self, room_id: RoomId) -> Result<()> {
        let result = sqlx::query("UPDATE rooms SET cycle_active = 0 WHERE id = ?")
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("room {}", room_id)));
        }

        info!(room_id = %room_id, "Room cycle reset after harvest");
        Ok(())
    }
}

/// In-memory directory for tests and single-room deployments
#[derive(Clone, Default)]
pub struct StaticRoomDirectory {
    rooms: Arc<RwLock<HashMap<RoomId, RoomInfo>>>,
}

impl StaticRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, room: RoomInfo) {
        self.rooms.write().await.insert(room.id, room);
    }

    /// Convenience: an active room with `plant_count` plants of one strain
    pub async fn add_room(&self, name: &str, plant_count: u32, strain: Option<&str>) -> RoomId {
        let id = Uuid::new_v4();
        self.insert(RoomInfo {
            id,
            name: name.to_string(),
            plant_count,
            cycle_active: true,
            primary_strain: strain.map(str::to_string),
            strain_ranges: Vec::new(),
        })
        .await;
        id
    }
}

#[async_trait]
impl RoomDirectory for StaticRoomDirectory {
    async fn room(&self, room_id: RoomId) -> Result<Option<RoomInfo>> {
        Ok(self.rooms.read().await.get(&room_id).cloned())
    }

    async fn reset_cycle(&self, room_id: RoomId) -> Result<()> {
        match self.rooms.write().await.get_mut(&room_id) {
            Some(room) => {
                room.cycle_active = false;
                Ok(())
            }
            None => Err(Error::NotFound(format!("room {}", room_id))),
        }
    }
}
