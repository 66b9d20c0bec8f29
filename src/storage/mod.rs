//! Persistent storage for rule sets and mock records

mod record_store;
mod rule_set_store;

pub use record_store::{RecordStore, RECORD_DB_FILE, SCHEMA_VERSION};
pub use rule_set_store::{RuleSetStorage, RULE_DB_FILE};

use crate::models::MockRecord;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::{Arc, Mutex};

static STORE: Lazy<Mutex<Option<Arc<RecordStore>>>> = Lazy::new(|| Mutex::new(None));

/// Initialize the global record store. An open store is reused only when it
/// lives under the same `storage_path`.
pub fn init_record_store(storage_path: &str) -> anyhow::Result<Arc<RecordStore>> {
    let mut guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    if let Some(store) = guard.as_ref() {
        if store.db_path().parent() == Some(Path::new(storage_path)) {
            return Ok(Arc::clone(store));
        }
        tracing::debug!(
            "Replacing record store at {:?} with one under {}",
            store.db_path(),
            storage_path
        );
    }
    let store = Arc::new(RecordStore::new(storage_path)?);
    *guard = Some(Arc::clone(&store));
    Ok(store)
}

/// Forget the global record store. Returns false if none was open.
pub fn close_record_store() -> anyhow::Result<bool> {
    let mut guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    Ok(guard.take().is_some())
}

/// Reset the store for testing purposes. This allows tests to re-initialize
/// with a fresh storage path.
#[cfg(test)]
pub fn reset_store_for_tests(storage_path: &str) -> anyhow::Result<Arc<RecordStore>> {
    let mut guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    *guard = None;
    let store = Arc::new(RecordStore::new(storage_path)?);
    *guard = Some(Arc::clone(&store));
    Ok(store)
}

fn store() -> anyhow::Result<Arc<RecordStore>> {
    let guard = STORE
        .lock()
        .map_err(|e| anyhow::anyhow!("lock poisoned: {}", e))?;
    guard
        .clone()
        .ok_or_else(|| anyhow::anyhow!("record store not initialized"))
}

/// Insert or replace a mock record
pub async fn save_mock_record(record: MockRecord) -> anyhow::Result<MockRecord> {
    store()?.put(record).await
}

/// Get a single mock record by ID
pub async fn get_mock_record(id: &str) -> anyhow::Result<Option<MockRecord>> {
    store()?.get(id).await
}

/// List every stored mock record
pub async fn list_mock_records() -> anyhow::Result<Vec<MockRecord>> {
    store()?.list().await
}

/// Delete a mock record. Rules still pointing at it stop intercepting.
pub async fn delete_mock_record(id: &str) -> anyhow::Result<bool> {
    store()?.delete(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    #[serial]
    async fn global_helpers_use_initialized_store() {
        let dir = tempfile::tempdir().unwrap();
        reset_store_for_tests(dir.path().to_str().unwrap()).unwrap();

        let record = save_mock_record(MockRecord::new("greeting", 200, r#"{"hi":true}"#))
            .await
            .unwrap();
        assert_eq!(
            get_mock_record(&record.id).await.unwrap().map(|r| r.name),
            Some("greeting".to_string())
        );
        assert_eq!(list_mock_records().await.unwrap().len(), 1);
        assert!(delete_mock_record(&record.id).await.unwrap());
    }

    #[tokio::test]
    #[serial]
    async fn init_follows_storage_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let first_path = first.path().to_str().unwrap();
        let second_path = second.path().to_str().unwrap();

        let a = reset_store_for_tests(first_path).unwrap();
        let again = init_record_store(first_path).unwrap();
        assert!(Arc::ptr_eq(&a, &again));

        let b = init_record_store(second_path).unwrap();
        assert_eq!(b.db_path(), second.path().join(RECORD_DB_FILE));
        save_mock_record(MockRecord::new("second", 200, "{}"))
            .await
            .unwrap();
        assert_eq!(a.count().await.unwrap(), 0);
        assert_eq!(b.count().await.unwrap(), 1);

        assert!(close_record_store().unwrap());
        assert!(!close_record_store().unwrap());
        assert!(list_mock_records().await.is_err());
    }
}
