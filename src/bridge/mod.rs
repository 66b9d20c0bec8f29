//! Mediating bridge
//!
//! Sits between the page context and the background context. It can talk to
//! the background over messages and read the record store, neither of which
//! the page can do itself. Every failure here degrades to "do not intercept".

mod link;

pub use link::{page_link, BridgeEndpoint, PageLink};

use crate::background::{BackgroundError, BackgroundHandle};
use crate::models::{CheckResult, EnvelopeKind, InterceptEnvelope, MockRecord};
use crate::storage::RecordStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Background(#[from] BackgroundError),
    #[error("mock record {0} not found")]
    RecordNotFound(String),
    #[error("mock record {0} is disabled")]
    RecordDisabled(String),
    #[error("record store lookup failed: {0}")]
    Store(String),
}

pub struct MediatingBridge {
    background: BackgroundHandle,
    records: Arc<RecordStore>,
}

impl MediatingBridge {
    pub fn new(background: BackgroundHandle, records: Arc<RecordStore>) -> Self {
        Self {
            background,
            records,
        }
    }

    /// Ask the background context whether `url` should be intercepted.
    pub async fn on_check(&self, url: &str) -> Result<CheckResult, BridgeError> {
        Ok(self.background.check_api_match(url).await?)
    }

    /// Keyed lookup in the record store.
    pub async fn fetch_record(&self, record_id: &str) -> Result<MockRecord, BridgeError> {
        let record = self
            .records
            .get(record_id)
            .await
            .map_err(|err| BridgeError::Store(format!("{:#}", err)))?
            .ok_or_else(|| BridgeError::RecordNotFound(record_id.to_string()))?;
        if !record.enabled {
            return Err(BridgeError::RecordDisabled(record_id.to_string()));
        }
        Ok(record)
    }

    /// Full decision for one URL: match, then attach the record if needed.
    pub async fn resolve(&self, url: &str) -> CheckResult {
        let mut result = match self.on_check(url).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("Check for {} failed, passing through: {}", url, err);
                return CheckResult::pass_through();
            }
        };
        if !result.should_intercept {
            return result;
        }

        if let Some(record_id) = result.mock_record_id.clone() {
            match self.fetch_record(&record_id).await {
                Ok(record) => result.record = Some(record),
                Err(err) => {
                    tracing::warn!("Not intercepting {}: {}", url, err);
                    return CheckResult::pass_through();
                }
            }
        }
        result
    }

    /// Serve check frames from the page until the page side hangs up.
    ///
    /// Each check runs in its own task, so responses may come back in any
    /// order; the page matches them up by request id.
    pub fn spawn(self: Arc<Self>, endpoint: BridgeEndpoint) -> JoinHandle<()> {
        tokio::spawn(self.run(endpoint))
    }

    async fn run(self: Arc<Self>, endpoint: BridgeEndpoint) {
        let BridgeEndpoint {
            mut from_page,
            to_page,
        } = endpoint;

        while let Some(frame) = from_page.recv().await {
            let envelope = match InterceptEnvelope::decode(&frame) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::debug!("Ignoring undecodable frame from page: {}", err);
                    continue;
                }
            };
            if envelope.kind != EnvelopeKind::Check {
                continue;
            }

            let bridge = Arc::clone(&self);
            let to_page = to_page.clone();
            tokio::spawn(async move {
                let result = bridge.resolve(&envelope.url).await;
                let response =
                    InterceptEnvelope::check_response(envelope.request_id, envelope.url, result);
                match response.encode() {
                    Ok(frame) => {
                        if to_page.send(frame).is_err() {
                            tracing::debug!(
                                "Page link closed before response {} was delivered",
                                response.request_id
                            );
                        }
                    }
                    Err(err) => tracing::warn!("Failed to encode check response: {}", err),
                }
            });
        }
        tracing::debug!("Page link closed; bridge loop exiting");
    }
}
