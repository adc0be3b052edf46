//! Durable write-through store (spec.md §6): `strategies`, `hive_activities`,
//! `bot_runs` tables in SQLite, behind a small typed API with
//! `CREATE TABLE IF NOT EXISTS` on open and no migrations framework.

use crate::models::{ActivityRecord, StrategyConfig, StrategyStatus};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::info;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS strategies (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                config_json TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS hive_activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id TEXT NOT NULL,
                record_json TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS bot_runs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                heartbeat_json TEXT NOT NULL
            );",
        )?;
        info!("durable store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE strategies (
                id TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE, config_json TEXT NOT NULL,
                status TEXT NOT NULL, created_at TEXT NOT NULL
            );
            CREATE TABLE hive_activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT, strategy_id TEXT NOT NULL,
                record_json TEXT NOT NULL, timestamp TEXT NOT NULL
            );
            CREATE TABLE bot_runs (
                id TEXT PRIMARY KEY, name TEXT NOT NULL, status TEXT NOT NULL,
                last_seen TEXT NOT NULL, heartbeat_json TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn insert_strategy(&self, config: &StrategyConfig, status: StrategyStatus) -> rusqlite::Result<()> {
        let config_json = serde_json::to_string(config).expect("strategy config serializes");
        self.conn.lock().execute(
            "INSERT INTO strategies (id, name, config_json, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                config.id.to_string(),
                config.name,
                config_json,
                format!("{status:?}"),
                config.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_status(&self, id: uuid::Uuid, status: StrategyStatus) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "UPDATE strategies SET status = ?1 WHERE id = ?2",
            params![format!("{status:?}"), id.to_string()],
        )?;
        Ok(())
    }

    pub fn append_activity(&self, record: &ActivityRecord) -> rusqlite::Result<()> {
        let record_json = serde_json::to_string(record).expect("activity record serializes");
        self.conn.lock().execute(
            "INSERT INTO hive_activities (strategy_id, record_json, timestamp) VALUES (?1, ?2, ?3)",
            params![
                record.strategy_id.to_string(),
                record_json,
                record.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn name_exists(&self, name: &str) -> rusqlite::Result<bool> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT 1 FROM strategies WHERE name = ?1 LIMIT 1")?;
        Ok(stmt.exists(params![name])?)
    }

    /// Upserts a hosting bot's most recent heartbeat row (spec.md §6:
    /// `bot_runs(id, name, last_seen, status, …)`).
    pub fn upsert_bot_heartbeat(
        &self,
        id: &str,
        name: &str,
        status: &str,
        last_seen: chrono::DateTime<chrono::Utc>,
        heartbeat_json: &str,
    ) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO bot_runs (id, name, status, last_seen, heartbeat_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                last_seen = excluded.last_seen,
                heartbeat_json = excluded.heartbeat_json",
            params![id, name, status, last_seen.to_rfc3339(), heartbeat_json],
        )?;
        Ok(())
    }

    pub fn list_bot_runs(&self) -> rusqlite::Result<Vec<BotRunRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name, status, last_seen FROM bot_runs")?;
        let rows = stmt
            .query_map([], |row| {
                let last_seen: String = row.get(3)?;
                Ok(BotRunRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    status: row.get(2)?,
                    last_seen: chrono::DateTime::parse_from_rfc3339(&last_seen)
                        .map(|dt| dt.with_timezone(&chrono::Utc))
                        .unwrap_or_else(|_| chrono::Utc::now()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns whether a row existed and was removed.
    pub fn delete_bot_run(&self, id: &str) -> rusqlite::Result<bool> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM bot_runs WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

/// One row of `bot_runs`, as last written by a heartbeat.
#[derive(Debug, Clone)]
pub struct BotRunRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub last_seen: chrono::DateTime<chrono::Utc>,
}
