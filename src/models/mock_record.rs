//! Canned responses stored in the record store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A reusable canned response, addressable by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRecord {
    pub id: String,
    pub name: String,
    pub status_code: u16,
    #[serde(default)]
    pub delay_ms: u32,
    /// Raw JSON text, parsed only when a response is synthesized.
    pub body_json: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Milliseconds since epoch
    #[serde(default)]
    pub created_at: i64,
    /// Milliseconds since epoch
    #[serde(default)]
    pub updated_at: i64,
}

fn default_enabled() -> bool {
    true
}

impl MockRecord {
    pub fn new(name: impl Into<String>, status_code: u16, body_json: impl Into<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status_code,
            delay_ms: 0,
            body_json: body_json.into(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_delay(mut self, delay_ms: u32) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}
