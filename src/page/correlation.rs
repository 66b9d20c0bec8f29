//! Request-id correlation over the page link.
//!
//! Every check gets a fresh id and a pending slot. The slot is resolved by
//! the first matching response or dropped when the deadline passes; either
//! way it is removed exactly once, and late responses find nothing to
//! resolve.

use crate::bridge::PageLink;
use crate::models::{CheckResult, EnvelopeKind, InterceptEnvelope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Default wait for a bridge answer before falling back to the network.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(200);

pub struct CorrelationClient {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<CheckResult>>>,
    outbound: mpsc::UnboundedSender<String>,
    budget: Duration,
}

/// Removes its pending entry when dropped, covering timeout, send failure
/// and caller cancellation alike.
struct PendingSlot<'a> {
    client: &'a CorrelationClient,
    request_id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.client.forget(self.request_id);
    }
}

impl CorrelationClient {
    /// Wire a client to the page end of a link and start listening for responses.
    pub fn connect(link: PageLink, budget: Duration) -> Arc<Self> {
        let PageLink {
            to_bridge,
            mut from_bridge,
        } = link;
        let client = Arc::new(Self {
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            outbound: to_bridge,
            budget,
        });

        let weak: Weak<Self> = Arc::downgrade(&client);
        tokio::spawn(async move {
            while let Some(frame) = from_bridge.recv().await {
                let Some(client) = weak.upgrade() else {
                    break;
                };
                client.on_frame(&frame);
            }
        });
        client
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of checks still waiting for an answer.
    pub fn pending_count(&self) -> usize {
        self.pending_map().len()
    }

    /// Check `url` within the configured budget.
    pub async fn check(&self, url: &str) -> CheckResult {
        self.check_until(url, Instant::now() + self.budget).await
    }

    /// Check `url`, giving up at `deadline`.
    ///
    /// Never fails: anything other than a timely answer is "do not intercept".
    pub async fn check_until(&self, url: &str, deadline: Instant) -> CheckResult {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending_map().insert(request_id, tx);
        let _slot = PendingSlot {
            client: self,
            request_id,
        };

        let frame = match InterceptEnvelope::check(request_id, url).encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!("Failed to encode check {} for {}: {}", request_id, url, err);
                return CheckResult::pass_through();
            }
        };
        if self.outbound.send(frame).is_err() {
            tracing::warn!("Bridge unavailable; passing {} through", url);
            return CheckResult::pass_through();
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => CheckResult::pass_through(),
            Err(_) => {
                tracing::debug!(
                    "Check {} for {} timed out after {:?}; passing through",
                    request_id,
                    url,
                    self.budget
                );
                CheckResult::pass_through()
            }
        }
    }

    fn on_frame(&self, frame: &str) {
        let envelope = match InterceptEnvelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!("Ignoring undecodable frame from bridge: {}", err);
                return;
            }
        };
        if envelope.kind != EnvelopeKind::CheckResponse {
            return;
        }
        let request_id = envelope.request_id;
        if !self.resolve(request_id, envelope.into_result()) {
            tracing::trace!("Dropping late response for check {}", request_id);
        }
    }

    /// Hand `result` to the waiter for `request_id`. Returns false if nobody
    /// is waiting any more.
    pub fn resolve(&self, request_id: u64, result: CheckResult) -> bool {
        let waiter = self.pending_map().remove(&request_id);
        match waiter {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    fn forget(&self, request_id: u64) {
        self.pending_map().remove(&request_id);
    }

    fn pending_map(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<CheckResult>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
