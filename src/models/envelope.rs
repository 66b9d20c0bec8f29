//! Messages exchanged between the page context and the mediating bridge.

use crate::models::MockRecord;
use serde::{Deserialize, Serialize};

/// Frame sent across the page link. Serialized as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptEnvelope {
    pub request_id: u64,
    pub url: String,
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<CheckResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    Check,
    CheckResponse,
}

impl InterceptEnvelope {
    pub fn check(request_id: u64, url: impl Into<String>) -> Self {
        Self {
            request_id,
            url: url.into(),
            kind: EnvelopeKind::Check,
            payload: None,
        }
    }

    pub fn check_response(request_id: u64, url: impl Into<String>, result: CheckResult) -> Self {
        Self {
            request_id,
            url: url.into(),
            kind: EnvelopeKind::CheckResponse,
            payload: Some(result),
        }
    }

    /// Response payload, treating a response without one as "do not intercept".
    pub fn into_result(self) -> CheckResult {
        self.payload.unwrap_or_default()
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// Answer to "should this request be intercepted?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub should_intercept: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_target: Option<String>,
    /// Delay applied before a redirected request is forwarded.
    #[serde(default)]
    pub delay_ms: u32,
    /// Status used when the record carries none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_status: Option<u16>,
    /// Filled in by the bridge after the record lookup succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<MockRecord>,
}

impl CheckResult {
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn decision(&self) -> InterceptDecision {
        if !self.should_intercept {
            return InterceptDecision::PassThrough;
        }
        if let Some(record) = &self.record {
            let mut record = record.clone();
            if record.status_code == 0 {
                record.status_code = self.fallback_status.unwrap_or(200);
            }
            return InterceptDecision::Mock(record);
        }
        if let Some(target) = &self.redirect_target {
            return InterceptDecision::Redirect {
                target: target.clone(),
                delay_ms: self.delay_ms,
            };
        }
        InterceptDecision::PassThrough
    }
}

/// What the page-context interceptor does with one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum InterceptDecision {
    PassThrough,
    Redirect { target: String, delay_ms: u32 },
    Mock(MockRecord),
}
