//! Privileged background context.
//!
//! Owns the [`RuleStore`] and serves every configuration and matching
//! request over a message channel. Nothing outside this task touches the
//! rule set directly.

use crate::models::{CheckResult, MatchMode, Rule, RuleAction, RuleSet};
use crate::rules::{is_valid_pattern, RuleStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const MAILBOX_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("background context is not running")]
    Unavailable,
    #[error("failed to persist rule set: {0}")]
    Persist(String),
}

type Reply<T> = oneshot::Sender<Result<T, BackgroundError>>;

/// Message actions accepted by the background context.
pub enum BackgroundMessage {
    GetConfig {
        reply: oneshot::Sender<RuleSet>,
    },
    UpdateConfig {
        rule_set: RuleSet,
        reply: Reply<()>,
    },
    ToggleGlobal {
        enabled: bool,
        reply: Reply<()>,
    },
    CheckApiMatch {
        url: String,
        reply: oneshot::Sender<CheckResult>,
    },
    UpsertRule {
        rule: Rule,
        reply: Reply<()>,
    },
    RemoveRule {
        id: String,
        reply: Reply<bool>,
    },
    SetRuleEnabled {
        id: String,
        enabled: bool,
        reply: Reply<bool>,
    },
    SetActiveRecord {
        id: String,
        record_id: Option<String>,
        reply: Reply<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Turn the winning rule (if any) into the answer sent back to the page.
pub fn check_result_for(rule: Option<&Rule>) -> CheckResult {
    let Some(rule) = rule else {
        return CheckResult::pass_through();
    };
    match rule.action {
        RuleAction::Redirect => match rule.redirect_target.as_deref() {
            Some(target) if !target.trim().is_empty() => CheckResult {
                should_intercept: true,
                redirect_target: Some(target.to_string()),
                delay_ms: rule.delay_ms,
                ..Default::default()
            },
            _ => CheckResult::pass_through(),
        },
        RuleAction::SynthesizeResponse => match rule.active_mock_record_id.as_deref() {
            Some(record_id) if !record_id.is_empty() => CheckResult {
                should_intercept: true,
                mock_record_id: Some(record_id.to_string()),
                fallback_status: Some(rule.status_code),
                ..Default::default()
            },
            _ => CheckResult::pass_through(),
        },
    }
}

pub struct BackgroundService {
    store: Arc<RuleStore>,
    inbox: mpsc::Receiver<BackgroundMessage>,
}

impl BackgroundService {
    /// Start the background task and return a handle for talking to it.
    pub fn spawn(store: RuleStore) -> (BackgroundHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let service = BackgroundService {
            store: Arc::new(store),
            inbox: rx,
        };
        let task = tokio::spawn(service.run());
        (BackgroundHandle { tx }, task)
    }

    async fn run(mut self) {
        while let Some(message) = self.inbox.recv().await {
            if let BackgroundMessage::Shutdown { reply } = message {
                self.shutdown().await;
                let _ = reply.send(());
                return;
            }
            self.handle(message).await;
        }
        self.shutdown().await;
    }

    async fn shutdown(&self) {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("Failed to persist rule set on shutdown: {:#}", err),
            Err(err) => tracing::error!("Rule store shutdown task failed: {}", err),
        }
    }

    async fn handle(&self, message: BackgroundMessage) {
        match message {
            BackgroundMessage::GetConfig { reply } => {
                let _ = reply.send(self.store.rule_set());
            }
            BackgroundMessage::CheckApiMatch { url, reply } => {
                let rule = self.store.find_match(&url);
                let result = check_result_for(rule.as_ref());
                tracing::debug!(
                    "checkApiMatch {} -> intercept={} rule={:?}",
                    url,
                    result.should_intercept,
                    rule.as_ref().map(|r| r.id.as_str())
                );
                let _ = reply.send(result);
            }
            BackgroundMessage::UpdateConfig { rule_set, reply } => {
                let result = self.mutate(move |set| *set = rule_set).await;
                let _ = reply.send(result);
            }
            BackgroundMessage::ToggleGlobal { enabled, reply } => {
                tracing::info!("Global interception {}", if enabled { "enabled" } else { "disabled" });
                let result = self.mutate(move |set| set.global_enabled = enabled).await;
                let _ = reply.send(result);
            }
            BackgroundMessage::UpsertRule { rule, reply } => {
                if rule.match_mode == MatchMode::Regex && !is_valid_pattern(&rule.pattern) {
                    tracing::warn!(
                        "Rule {} has an invalid regex {:?} and will never match",
                        rule.id,
                        rule.pattern
                    );
                }
                let result = self.mutate(move |set| set.upsert(rule)).await;
                let _ = reply.send(result);
            }
            BackgroundMessage::RemoveRule { id, reply } => {
                let result = self.mutate(move |set| set.remove(&id)).await;
                let _ = reply.send(result);
            }
            BackgroundMessage::SetRuleEnabled { id, enabled, reply } => {
                let result = self
                    .mutate(move |set| match set.rule_mut(&id) {
                        Some(rule) => {
                            rule.enabled = enabled;
                            true
                        }
                        None => false,
                    })
                    .await;
                let _ = reply.send(result);
            }
            BackgroundMessage::SetActiveRecord {
                id,
                record_id,
                reply,
            } => {
                let result = self
                    .mutate(move |set| match set.rule_mut(&id) {
                        Some(rule) => {
                            rule.active_mock_record_id = record_id;
                            true
                        }
                        None => false,
                    })
                    .await;
                let _ = reply.send(result);
            }
            BackgroundMessage::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    /// Persist-then-ack: the reply is only produced after the write lands.
    async fn mutate<F, T>(&self, mutate: F) -> Result<T, BackgroundError>
    where
        F: FnOnce(&mut RuleSet) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.apply_mutation(mutate)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => {
                tracing::error!("Rule set mutation failed: {:#}", err);
                Err(BackgroundError::Persist(format!("{:#}", err)))
            }
            Err(err) => Err(BackgroundError::Persist(err.to_string())),
        }
    }
}

/// Cloneable sender side of the background context.
#[derive(Clone)]
pub struct BackgroundHandle {
    tx: mpsc::Sender<BackgroundMessage>,
}

impl BackgroundHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> BackgroundMessage,
    ) -> Result<T, BackgroundError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| BackgroundError::Unavailable)?;
        rx.await.map_err(|_| BackgroundError::Unavailable)
    }

    pub async fn get_config(&self) -> Result<RuleSet, BackgroundError> {
        self.request(|reply| BackgroundMessage::GetConfig { reply })
            .await
    }

    pub async fn update_config(&self, rule_set: RuleSet) -> Result<(), BackgroundError> {
        self.request(|reply| BackgroundMessage::UpdateConfig { rule_set, reply })
            .await?
    }

    pub async fn toggle_global(&self, enabled: bool) -> Result<(), BackgroundError> {
        self.request(|reply| BackgroundMessage::ToggleGlobal { enabled, reply })
            .await?
    }

    pub async fn check_api_match(&self, url: &str) -> Result<CheckResult, BackgroundError> {
        let url = url.to_string();
        self.request(|reply| BackgroundMessage::CheckApiMatch { url, reply })
            .await
    }

    pub async fn upsert_rule(&self, rule: Rule) -> Result<(), BackgroundError> {
        self.request(|reply| BackgroundMessage::UpsertRule { rule, reply })
            .await?
    }

    pub async fn remove_rule(&self, id: &str) -> Result<bool, BackgroundError> {
        let id = id.to_string();
        self.request(|reply| BackgroundMessage::RemoveRule { id, reply })
            .await?
    }

    pub async fn set_rule_enabled(&self, id: &str, enabled: bool) -> Result<bool, BackgroundError> {
        let id = id.to_string();
        self.request(|reply| BackgroundMessage::SetRuleEnabled { id, enabled, reply })
            .await?
    }

    pub async fn set_active_record(
        &self,
        id: &str,
        record_id: Option<String>,
    ) -> Result<bool, BackgroundError> {
        let id = id.to_string();
        self.request(|reply| BackgroundMessage::SetActiveRecord {
            id,
            record_id,
            reply,
        })
        .await?
    }

    /// Stop the background task after a final persist.
    pub async fn shutdown(&self) -> Result<(), BackgroundError> {
        self.request(|reply| BackgroundMessage::Shutdown { reply })
            .await
    }
}
