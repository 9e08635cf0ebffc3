//! Harvest session persistence
//!
//! Sessions are written through after every committed mutation; crew,
//! plants and summary are JSON columns on the session row.

use chrono::{DateTime, SecondsFormat, Utc};
use growdash_common::harvest::{
    CrewMembership, CrewSummary, PlantRecord, RoomId, SessionId, SessionRecord, SessionStatus,
};
use growdash_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Everything stored for one session, membership history included
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub record: SessionRecord,
    pub memberships: Vec<CrewMembership>,
    pub plants: Vec<PlantRecord>,
    pub summary: Option<CrewSummary>,
}

/// Filter for session listing
#[derive(Debug, Clone)]
pub struct SessionFilter {
    pub room_id: Option<RoomId>,
    pub status: Option<SessionStatus>,
    pub limit: u32,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            room_id: None,
            status: None,
            limit: 20,
        }
    }
}

// Fixed-width so that TEXT ordering is chronological
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn parse_uuid(value: &str, column: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Insert or update a session row
pub async fn save_session(pool: &SqlitePool, session: &StoredSession) -> Result<()> {
    // Prepare all data before touching the pool
    let record = &session.record;
    let crew = serde_json::to_string(&session.memberships)?;
    let plants = serde_json::to_string(&session.plants)?;
    let summary = session
        .summary
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let started_at = timestamp(&record.started_at);
    let completed_at = record.completed_at.as_ref().map(timestamp);

    sqlx::query(
        r#"
        INSERT INTO harvest_sessions (
            id, room_id, room_name, expected_plant_count, status,
            started_at, completed_at, crew, plants, summary
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            completed_at = excluded.completed_at,
            crew = excluded.crew,
            plants = excluded.plants,
            summary = excluded.summary
        "#,
    )
    .bind(record.id.to_string())
    .bind(record.room_id.to_string())
    .bind(&record.room_name)
    .bind(record.expected_plant_count as i64)
    .bind(record.status.as_str())
    .bind(&started_at)
    .bind(&completed_at)
    .bind(&crew)
    .bind(&plants)
    .bind(&summary)
    .execute(pool)
    .await?;

    Ok(())
}

fn record_from_row(row: &SqliteRow) -> Result<SessionRecord> {
    let id: String = row.get("id");
    let room_id: String = row.get("room_id");
    let status: String = row.get("status");
    let expected: i64 = row.get("expected_plant_count");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(SessionRecord {
        id: parse_uuid(&id, "id")?,
        room_id: parse_uuid(&room_id, "room_id")?,
        room_name: row.get("room_name"),
        expected_plant_count: u32::try_from(expected)
            .map_err(|_| Error::Internal(format!("Bad expected_plant_count {}", expected)))?,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown session status {}", status)))?,
        started_at: parse_timestamp(&started_at, "started_at")?,
        completed_at: completed_at
            .map(|s| parse_timestamp(&s, "completed_at"))
            .transpose()?,
    })
}

fn stored_from_row(row: &SqliteRow) -> Result<StoredSession> {
    let crew: String = row.get("crew");
    let plants: String = row.get("plants");
    let summary: Option<String> = row.get("summary");

    Ok(StoredSession {
        record: record_from_row(row)?,
        memberships: serde_json::from_str(&crew)?,
        plants: serde_json::from_str(&plants)?,
        summary: summary.map(|s| serde_json::from_str(&s)).transpose()?,
    })
}

/// Load one session with its full history
pub async fn load_session(pool: &SqlitePool, session_id: SessionId) -> Result<Option<StoredSession>> {
    let row = sqlx::query("SELECT * FROM harvest_sessions WHERE id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(stored_from_row).transpose()
}

/// Every session still in progress, oldest first
pub async fn load_in_progress(pool: &SqlitePool) -> Result<Vec<StoredSession>> {
    let rows = sqlx::query(
        "SELECT * FROM harvest_sessions WHERE status = 'in_progress' ORDER BY started_at",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(stored_from_row).collect()
}

/// Session headers matching `filter`, newest first
pub async fn list_sessions(pool: &SqlitePool, filter: &SessionFilter) -> Result<Vec<SessionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, room_id, room_name, expected_plant_count, status, started_at, completed_at
        FROM harvest_sessions
        WHERE (?1 IS NULL OR room_id = ?1)
          AND (?2 IS NULL OR status = ?2)
        ORDER BY started_at DESC
        LIMIT ?3
        "#,
    )
    .bind(filter.room_id.map(|id| id.to_string()))
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.limit as i64)
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::Duration;
    use growdash_common::harvest::{CrewRole, Operator};
    use uuid::Uuid;

    fn session(room_id: RoomId, started_at: DateTime<Utc>) -> StoredSession {
        StoredSession {
            record: SessionRecord {
                id: Uuid::new_v4(),
                room_id,
                room_name: "Flower 1".to_string(),
                expected_plant_count: 50,
                status: SessionStatus::InProgress,
                started_at,
                completed_at: None,
            },
            memberships: Vec::new(),
            plants: Vec::new(),
            summary: None,
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let pool = init_memory_pool().await.unwrap();
        let mut stored = session(Uuid::new_v4(), Utc::now());
        let op = Operator::new(Uuid::new_v4(), "Ana");
        stored
            .memberships
            .push(CrewMembership::open(&op, CrewRole::Weighing, Utc::now()));
        stored
            .plants
            .push(PlantRecord::new(1, 210, op.id, op.name.clone(), Some("Gelato".to_string())));

        save_session(&pool, &stored).await.unwrap();
        let loaded = load_session(&pool, stored.record.id).await.unwrap().unwrap();

        assert_eq!(loaded.record, stored.record);
        assert_eq!(loaded.memberships, stored.memberships);
        assert_eq!(loaded.plants, stored.plants);
        assert!(loaded.summary.is_none());
    }

    #[tokio::test]
    async fn test_upsert_updates_status() {
        let pool = init_memory_pool().await.unwrap();
        let mut stored = session(Uuid::new_v4(), Utc::now());
        save_session(&pool, &stored).await.unwrap();

        stored.record.status = SessionStatus::Completed;
        stored.record.completed_at = Some(Utc::now());
        save_session(&pool, &stored).await.unwrap();

        assert!(load_in_progress(&pool).await.unwrap().is_empty());
        let loaded = load_session(&pool, stored.record.id).await.unwrap().unwrap();
        assert_eq!(loaded.record.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let pool = init_memory_pool().await.unwrap();
        let room = Uuid::new_v4();
        let now = Utc::now();

        let older = session(room, now - Duration::hours(2));
        let newer = session(room, now);
        let other_room = session(Uuid::new_v4(), now - Duration::hours(1));
        for s in [&older, &newer, &other_room] {
            save_session(&pool, s).await.unwrap();
        }

        let all = list_sessions(&pool, &SessionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, newer.record.id);

        let filtered = list_sessions(
            &pool,
            &SessionFilter {
                room_id: Some(room),
                limit: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, newer.record.id);

        let completed = list_sessions(
            &pool,
            &SessionFilter {
                status: Some(SessionStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(completed.is_empty());
    }
}
