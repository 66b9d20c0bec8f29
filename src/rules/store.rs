//! Authoritative holder of the rule set.
//!
//! Single-writer: every mutation runs under the storage lock, is persisted,
//! and only then replaces the in-memory copy. Readers only ever see whole
//! snapshots. Regex patterns are compiled when a rule set is published.

use crate::models::{Rule, RuleSet};
use crate::rules::matcher::CompiledRuleSet;
use crate::storage::RuleSetStorage;
use std::sync::{Mutex, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("rule store has been shut down")]
pub struct RuleStoreClosed;

pub struct RuleStore {
    current: RwLock<CompiledRuleSet>,
    storage: Mutex<Option<RuleSetStorage>>,
}

impl RuleStore {
    /// Load the last persisted rule set, or start empty on first run.
    pub fn init(storage: RuleSetStorage) -> anyhow::Result<Self> {
        let rule_set = match storage.load()? {
            Some(rule_set) => rule_set,
            None => {
                tracing::info!("No stored rule set found; starting with defaults");
                RuleSet::default()
            }
        };
        tracing::info!(
            "Rule store ready ({} rules, global_enabled={})",
            rule_set.rules.len(),
            rule_set.global_enabled
        );
        Ok(Self {
            current: RwLock::new(CompiledRuleSet::compile(rule_set)),
            storage: Mutex::new(Some(storage)),
        })
    }

    /// Snapshot copy of the current rule set.
    pub fn rule_set(&self) -> RuleSet {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rule_set()
            .clone()
    }

    pub fn find_match(&self, url: &str) -> Option<Rule> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.find(url).cloned()
    }

    /// Number of regex rules compiled for the published rule set.
    pub fn compiled_regexes(&self) -> usize {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .compiled_regexes()
    }

    /// Apply `mutate` to a copy of the rule set, persist it, then publish it.
    ///
    /// If persisting fails the in-memory rule set is left untouched and the
    /// error is returned, so callers never observe an unpersisted state.
    pub fn apply_mutation<F, T>(&self, mutate: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut RuleSet) -> T,
    {
        let storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        let storage = storage.as_ref().ok_or(RuleStoreClosed)?;

        let mut next = self.rule_set();
        let output = mutate(&mut next);
        storage.save(&next)?;

        let compiled = CompiledRuleSet::compile(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = compiled;
        Ok(output)
    }

    /// Persist a final time and refuse further mutations.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        let mut storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(storage) = storage.take() {
            storage.save(&self.rule_set())?;
            tracing::info!("Rule store shut down");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.storage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchMode, RuleAction};

    fn store() -> RuleStore {
        RuleStore::init(RuleSetStorage::in_memory().unwrap()).unwrap()
    }

    #[test]
    fn starts_with_empty_enabled_rule_set() {
        let store = store();
        let rule_set = store.rule_set();
        assert!(rule_set.global_enabled);
        assert!(rule_set.rules.is_empty());
    }

    #[test]
    fn mutations_are_persisted_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let store = RuleStore::init(RuleSetStorage::open(path).unwrap()).unwrap();

        let rule = Rule::mock("/api/users", MatchMode::Contains, "m1");
        let id = rule.id.clone();
        store.apply_mutation(|set| set.upsert(rule)).unwrap();

        let reloaded = RuleSetStorage::open(path).unwrap().load().unwrap().unwrap();
        assert_eq!(reloaded.rules.len(), 1);
        assert_eq!(reloaded.rules[0].id, id);
    }

    #[test]
    fn find_match_uses_current_rules() {
        let store = store();
        assert!(store.find_match("/api/users").is_none());

        store
            .apply_mutation(|set| {
                set.upsert(Rule::new(
                    "/api/users",
                    MatchMode::Contains,
                    RuleAction::SynthesizeResponse,
                ))
            })
            .unwrap();
        assert!(store.find_match("/api/users/1").is_some());

        store.apply_mutation(|set| set.global_enabled = false).unwrap();
        assert!(store.find_match("/api/users/1").is_none());
    }

    #[test]
    fn regexes_are_compiled_on_publish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let store = RuleStore::init(RuleSetStorage::open(path).unwrap()).unwrap();
        assert_eq!(store.compiled_regexes(), 0);

        store
            .apply_mutation(|set| {
                set.upsert(Rule::mock(r"/users/\d+", MatchMode::Regex, "m1"));
                set.upsert(Rule::mock("/broken(", MatchMode::Regex, "m2"));
                set.upsert(Rule::mock("/plain", MatchMode::Contains, "m3"));
            })
            .unwrap();
        assert_eq!(store.compiled_regexes(), 1);
        assert!(store.find_match("https://x/USERS/42").is_some());
        assert!(store.find_match("https://x/broken(").is_none());
        drop(store);

        let reloaded = RuleStore::init(RuleSetStorage::open(path).unwrap()).unwrap();
        assert_eq!(reloaded.compiled_regexes(), 1);
        assert_eq!(
            reloaded.find_match("https://x/users/7").map(|r| r.active_mock_record_id),
            Some(Some("m1".to_string()))
        );
    }

    #[test]
    fn snapshots_are_independent_of_later_mutations() {
        let store = store();
        let before = store.rule_set();
        store
            .apply_mutation(|set| set.upsert(Rule::mock("/x", MatchMode::Exact, "m")))
            .unwrap();
        assert!(before.rules.is_empty());
        assert_eq!(store.rule_set().rules.len(), 1);
    }

    #[test]
    fn shutdown_rejects_further_mutations() {
        let store = store();
        store.shutdown().unwrap();
        assert!(store.is_closed());

        let err = store.apply_mutation(|set| set.global_enabled = false).unwrap_err();
        assert!(err.downcast_ref::<RuleStoreClosed>().is_some());
        assert!(store.rule_set().global_enabled);
    }
}
