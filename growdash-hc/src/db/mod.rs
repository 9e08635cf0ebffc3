//! Database access for growdash-hc
//!
//! Shared SQLite database in the root folder. The coordinator owns the
//! `harvest_sessions` table; `rooms` and `room_strains` back the default
//! room directory.

pub mod sessions;

use growdash_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with tables created
///
/// One connection only: every new `:memory:` connection is a fresh database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create growdash-hc tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            plant_count INTEGER NOT NULL DEFAULT 0,
            cycle_active INTEGER NOT NULL DEFAULT 0,
            primary_strain TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_strains (
            room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            strain TEXT NOT NULL,
            start_plant INTEGER NOT NULL,
            end_plant INTEGER NOT NULL,
            PRIMARY KEY (room_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // crew, plants and summary are JSON columns
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS harvest_sessions (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            room_name TEXT NOT NULL,
            expected_plant_count INTEGER NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            crew TEXT NOT NULL DEFAULT '[]',
            plants TEXT NOT NULL DEFAULT '[]',
            summary TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_harvest_sessions_room_status
        ON harvest_sessions (room_id, status)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (rooms, room_strains, harvest_sessions)");

    Ok(())
}
