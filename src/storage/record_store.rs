use crate::models::MockRecord;
use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const RECORD_DB_FILE: &str = "mockwire_records.sqlite";

/// Additive schema steps; index `n` upgrades `user_version` n to n+1.
/// Existing steps must never be edited, only appended to.
const MIGRATIONS: &[&str] = &[
    "
    CREATE TABLE IF NOT EXISTS mock_records (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        status_code INTEGER NOT NULL,
        delay_ms INTEGER NOT NULL DEFAULT 0,
        body_json TEXT NOT NULL,
        enabled INTEGER NOT NULL DEFAULT 1
    );
    ",
    "
    ALTER TABLE mock_records ADD COLUMN created_at INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE mock_records ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0;
    CREATE INDEX IF NOT EXISTS idx_mock_records_name ON mock_records(name);
    ",
];

pub const SCHEMA_VERSION: u32 = MIGRATIONS.len() as u32;

/// Keyed collection of mock records backed by SQLite.
pub struct RecordStore {
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl RecordStore {
    pub fn new(base_path: &str) -> anyhow::Result<Self> {
        let dir = Path::new(base_path);
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating storage directory {:?}", dir))?;
        }
        let db_path = dir.join(RECORD_DB_FILE);
        let mut conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {:?}", db_path))?;
        migrate(&mut conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub async fn put(&self, mut record: MockRecord) -> anyhow::Result<MockRecord> {
        let now = Utc::now().timestamp_millis();
        if record.created_at == 0 {
            record.created_at = now;
        }
        record.updated_at = now;

        let db = Arc::clone(&self.db);
        let stored = record.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
            conn.execute(
                "INSERT OR REPLACE INTO mock_records
                   (id, name, status_code, delay_ms, body_json, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    stored.id,
                    stored.name,
                    stored.status_code as i64,
                    stored.delay_ms as i64,
                    stored.body_json,
                    stored.enabled,
                    stored.created_at,
                    stored.updated_at
                ],
            )
            .context("inserting mock record")
        })
        .await??;

        Ok(record)
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Option<MockRecord>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
            conn.query_row(
                "SELECT id, name, status_code, delay_ms, body_json, enabled, created_at, updated_at
                 FROM mock_records WHERE id = ?1",
                params![id],
                record_from_row,
            )
            .optional()
            .context("loading mock record")
        })
        .await?
    }

    /// All records ordered by name.
    pub async fn list(&self) -> anyhow::Result<Vec<MockRecord>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
            let mut stmt = conn.prepare(
                "SELECT id, name, status_code, delay_ms, body_json, enabled, created_at, updated_at
                 FROM mock_records ORDER BY name ASC, id ASC",
            )?;
            let rows = stmt.query_map([], record_from_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok::<_, anyhow::Error>(out)
        })
        .await?
    }

    pub async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let removed = tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
            conn.execute("DELETE FROM mock_records WHERE id = ?1", params![id])
                .context("deleting mock record")
        })
        .await??;
        Ok(removed > 0)
    }

    pub async fn count(&self) -> anyhow::Result<u64> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM mock_records", [], |row| row.get(0))?;
            Ok::<_, anyhow::Error>(count.max(0) as u64)
        })
        .await?
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MockRecord> {
    Ok(MockRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        status_code: row.get::<_, i64>(2)?.clamp(0, u16::MAX as i64) as u16,
        delay_ms: row.get::<_, i64>(3)?.clamp(0, u32::MAX as i64) as u32,
        body_json: row.get(4)?,
        enabled: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn migrate(conn: &mut Connection) -> anyhow::Result<()> {
    let current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("reading schema version")?;
    if current > SCHEMA_VERSION {
        tracing::warn!(
            "Record store schema v{} is newer than supported v{}; opening as-is",
            current,
            SCHEMA_VERSION
        );
        return Ok(());
    }

    for (version, step) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(step)
            .with_context(|| format!("applying record store migration v{}", version + 1))?;
        tx.pragma_update(None, "user_version", (version + 1) as u32)?;
        tx.commit()?;
        tracing::debug!("Record store migrated to schema v{}", version + 1);
    }
    Ok(())
}
