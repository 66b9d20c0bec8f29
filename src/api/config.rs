//! Runtime configuration

use crate::page::DEFAULT_CHECK_TIMEOUT;
use std::path::PathBuf;
use std::time::Duration;

pub const STORAGE_PATH_ENV: &str = "MOCKWIRE_STORAGE_PATH";
pub const CHECK_TIMEOUT_ENV: &str = "MOCKWIRE_CHECK_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Directory holding the rule and record databases
    pub storage_path: PathBuf,
    /// How long the page waits for a bridge answer before using the network
    pub check_timeout: Duration,
    /// Install the tracing subscriber when the global runtime starts
    pub enable_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            enable_logging: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_storage_path(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `MOCKWIRE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = lookup(STORAGE_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            config.storage_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(CHECK_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.check_timeout = Duration::from_millis(ms),
                _ => tracing::warn!(
                    "Ignoring invalid {}={:?}; using {:?}",
                    CHECK_TIMEOUT_ENV,
                    raw,
                    config.check_timeout
                ),
            }
        }
        config
    }

    pub fn storage_path_str(&self) -> String {
        self.storage_path.to_string_lossy().to_string()
    }
}

pub fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("mockwire"))
        .unwrap_or_else(|| PathBuf::from("./mockwire_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_200ms_budget() {
        let config = RuntimeConfig::from_lookup(lookup(&[]));
        assert_eq!(config.check_timeout, Duration::from_millis(200));
        assert_eq!(config.storage_path, default_storage_path());
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (STORAGE_PATH_ENV, "/tmp/mockwire-test"),
            (CHECK_TIMEOUT_ENV, "350"),
        ]));
        assert_eq!(config.storage_path, PathBuf::from("/tmp/mockwire-test"));
        assert_eq!(config.check_timeout, Duration::from_millis(350));
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        for raw in ["abc", "0", "-5"] {
            let config = RuntimeConfig::from_lookup(lookup(&[(CHECK_TIMEOUT_ENV, raw)]));
            assert_eq!(config.check_timeout, DEFAULT_CHECK_TIMEOUT);
        }
    }
}
