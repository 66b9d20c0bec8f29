//! Wires the three contexts together.

use crate::api::config::RuntimeConfig;
use crate::background::{BackgroundHandle, BackgroundService};
use crate::bridge::{page_link, MediatingBridge};
use crate::page::{CorrelationClient, Page, Transport};
use crate::rules::RuleStore;
use crate::storage::{RecordStore, RuleSetStorage};
use anyhow::Context;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

pub struct MockRuntime {
    config: RuntimeConfig,
    background: BackgroundHandle,
    bridge: Arc<MediatingBridge>,
    records: Arc<RecordStore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MockRuntime {
    /// Load persisted state and start the background context.
    pub async fn start(config: RuntimeConfig) -> anyhow::Result<Self> {
        let storage_path = config.storage_path_str();
        let records = tokio::task::spawn_blocking(move || {
            RecordStore::new(&storage_path).context("opening record store")
        })
        .await??;
        Self::start_with_records(config, Arc::new(records)).await
    }

    /// Start over an already opened record store, such as the global one.
    pub async fn start_with_records(
        config: RuntimeConfig,
        records: Arc<RecordStore>,
    ) -> anyhow::Result<Self> {
        let storage_path = config.storage_path_str();
        let rule_store = {
            let storage_path = storage_path.clone();
            tokio::task::spawn_blocking(move || {
                RuleSetStorage::open(&storage_path)
                    .and_then(RuleStore::init)
                    .context("initializing rule store")
            })
            .await??
        };

        let (background, background_task) = BackgroundService::spawn(rule_store);
        let bridge = Arc::new(MediatingBridge::new(
            background.clone(),
            Arc::clone(&records),
        ));

        tracing::info!(
            "Mock runtime started (storage={}, check_timeout={:?})",
            storage_path,
            config.check_timeout
        );
        Ok(Self {
            config,
            background,
            bridge,
            records,
            tasks: Mutex::new(vec![background_task]),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Messaging handle to the background context.
    pub fn background(&self) -> &BackgroundHandle {
        &self.background
    }

    pub fn bridge(&self) -> &Arc<MediatingBridge> {
        &self.bridge
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    /// Create a monitored page over `transport` with the interceptor
    /// installed and its own bridge link.
    pub fn open_page(&self, transport: Arc<dyn Transport>) -> Page {
        let (link, endpoint) = page_link();
        let bridge_task = Arc::clone(&self.bridge).spawn(endpoint);
        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            // Bridge loops end once their page is dropped.
            tasks.retain(|task| !task.is_finished());
            tasks.push(bridge_task);
        }

        let page = Page::new(transport);
        page.install_interceptor(CorrelationClient::connect(link, self.config.check_timeout));
        page
    }

    /// Persist and stop the background context, then stop bridge loops.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if let Err(err) = self.background.shutdown().await {
            tracing::debug!("Background already stopped: {}", err);
        }
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        tracing::info!("Mock runtime stopped");
        Ok(())
    }

    #[cfg(test)]
    fn tracked_tasks(&self) -> Vec<bool> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(JoinHandle::is_finished)
            .collect()
    }
}
