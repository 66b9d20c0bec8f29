//! Process-wide entry points.
//!
//! Hosts that only need one runtime (the CLI, embedders) go through these
//! functions instead of holding a [`MockRuntime`] themselves.

use crate::api::config::RuntimeConfig;
use crate::api::runtime::MockRuntime;
use crate::models::{CheckResult, RuleSet};
use crate::page::{Page, Transport};
use crate::storage;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::Mutex;

static RUNTIME: Lazy<Mutex<Option<Arc<MockRuntime>>>> = Lazy::new(|| Mutex::new(None));

/// Initialize logging (call once at startup)
/// `storage_path` is used to store log files in release mode
#[allow(unused_variables)]
pub fn init_core(storage_path: Option<String>) -> Result<bool, String> {
    #[cfg(debug_assertions)]
    {
        let level = resolve_log_level();
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        let level = resolve_log_level();

        let log_dir = storage_path
            .as_ref()
            .map(|p| std::path::PathBuf::from(p).join("logs"))
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));

        std::fs::create_dir_all(&log_dir).map_err(|e| {
            format!(
                "Failed to create log directory {}: {}",
                log_dir.display(),
                e
            )
        })?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "mockwire");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // Logging lasts until process exit.
        std::mem::forget(guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("mockwire core initialized v{}", crate::VERSION);
    Ok(true)
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    parse_log_level(std::env::var("RUST_LOG").ok().as_deref())
}

fn parse_log_level(raw: Option<&str>) -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match raw.map(|v| v.trim().to_lowercase()) {
        Some(val) => match val.as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        },
        None => LevelFilter::INFO,
    }
}

/// Start the global runtime. Returns false if one is already running.
pub async fn start_runtime(config: RuntimeConfig) -> anyhow::Result<bool> {
    let mut guard = RUNTIME.lock().await;
    if guard.is_some() {
        tracing::debug!("Runtime already running; ignoring start request");
        return Ok(false);
    }
    if config.enable_logging {
        init_core(Some(config.storage_path_str())).map_err(anyhow::Error::msg)?;
    }
    let records = storage::init_record_store(&config.storage_path_str())?;
    let runtime = MockRuntime::start_with_records(config, records).await?;
    *guard = Some(Arc::new(runtime));
    Ok(true)
}

/// Stop the global runtime. Returns false if none was running.
pub async fn stop_runtime() -> anyhow::Result<bool> {
    let runtime = RUNTIME.lock().await.take();
    match runtime {
        Some(runtime) => {
            runtime.shutdown().await?;
            storage::close_record_store()?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub async fn is_running() -> bool {
    RUNTIME.lock().await.is_some()
}

async fn runtime() -> anyhow::Result<Arc<MockRuntime>> {
    RUNTIME
        .lock()
        .await
        .clone()
        .ok_or_else(|| anyhow::anyhow!("mock runtime not started"))
}

pub async fn get_config() -> anyhow::Result<RuleSet> {
    Ok(runtime().await?.background().get_config().await?)
}

pub async fn update_config(rule_set: RuleSet) -> anyhow::Result<()> {
    Ok(runtime().await?.background().update_config(rule_set).await?)
}

pub async fn toggle_global(enabled: bool) -> anyhow::Result<()> {
    Ok(runtime().await?.background().toggle_global(enabled).await?)
}

/// The decision the background context makes for `url`, with the record
/// attached when the match resolves to an active mock.
pub async fn check_api_match(url: &str) -> anyhow::Result<CheckResult> {
    Ok(runtime().await?.bridge().resolve(url).await)
}

/// Open a page wired to the global runtime.
pub async fn open_page(transport: Arc<dyn Transport>) -> anyhow::Result<Page> {
    Ok(runtime().await?.open_page(transport))
}
