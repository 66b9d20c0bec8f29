use crate::models::RuleSet;
use anyhow::{anyhow, Context};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

pub const RULE_DB_FILE: &str = "mockwire_rules.sqlite";

/// Durable home of the rule set. Holds a single JSON row.
///
/// Calls are synchronous; the rule store runs them off the async runtime.
pub struct RuleSetStorage {
    conn: Mutex<Connection>,
}

impl RuleSetStorage {
    pub fn open(base_path: &str) -> anyhow::Result<Self> {
        let dir = Path::new(base_path);
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating storage directory {:?}", dir))?;
        }
        let db_path = dir.join(RULE_DB_FILE);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("opening database at {:?}", db_path))?;
        Self::with_connection(conn)
    }

    /// Non-durable storage, used by tests and throwaway runtimes.
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rule_set (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Last persisted rule set, or `None` on first run.
    pub fn load(&self) -> anyhow::Result<Option<RuleSet>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM rule_set WHERE id = 1", [], |row| row.get(0))
            .optional()
            .context("loading rule set")?;
        match data {
            Some(json) => {
                let rule_set = serde_json::from_str(&json).context("decoding stored rule set")?;
                Ok(Some(rule_set))
            }
            None => Ok(None),
        }
    }

    pub fn save(&self, rule_set: &RuleSet) -> anyhow::Result<()> {
        let payload = serde_json::to_string(rule_set)?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("db mutex poisoned: {}", e))?;
        conn.execute(
            "INSERT OR REPLACE INTO rule_set (id, data, updated_at) VALUES (1, ?1, ?2)",
            params![payload, Utc::now().timestamp_millis()],
        )
        .context("saving rule set")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchMode, Rule};

    #[test]
    fn first_run_has_nothing_stored() {
        let storage = RuleSetStorage::in_memory().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn saved_rule_set_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let mut rule_set = RuleSet::default();
        rule_set.global_enabled = false;
        rule_set
            .rules
            .push(Rule::mock("/api/users", MatchMode::Contains, "m1"));

        RuleSetStorage::open(path).unwrap().save(&rule_set).unwrap();
        let reopened = RuleSetStorage::open(path).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(rule_set));
    }
}
