//! Response synthesizer
//!
//! Builds responses for intercepted calls from a [`MockRecord`] so callers
//! see status, status text, headers and body just as a network response
//! would carry them.

use crate::models::{HttpResponse, MockRecord};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const MOCK_RECORD_HEADER: &str = "x-mock-record";
pub const INVALID_JSON_ERROR: &str = "Invalid JSON in mock response";

const STATUS_PHRASES: &[(u16, &str)] = &[
    (200, "OK"),
    (201, "Created"),
    (202, "Accepted"),
    (204, "No Content"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (304, "Not Modified"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (408, "Request Timeout"),
    (409, "Conflict"),
    (422, "Unprocessable Entity"),
    (429, "Too Many Requests"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
];

/// Status phrase for `code`; unknown codes get the phrase for 200.
pub fn status_text(code: u16) -> &'static str {
    STATUS_PHRASES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, phrase)| *phrase)
        .unwrap_or("OK")
}

/// Parse the record body, substituting a diagnostic payload on failure.
pub fn parse_body(record: &MockRecord) -> serde_json::Value {
    match serde_json::from_str(&record.body_json) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("Mock record {} has malformed JSON: {}", record.id, err);
            json!({
                "error": INVALID_JSON_ERROR,
                "detail": err.to_string(),
                "recordId": record.id,
            })
        }
    }
}

/// Build the response immediately, without the record's delay.
pub fn build_response(record: &MockRecord, url: &str) -> HttpResponse {
    let body = parse_body(record);
    let mut headers = HashMap::new();
    headers.insert(CONTENT_TYPE.as_str().to_string(), JSON_CONTENT_TYPE.to_string());
    headers.insert(MOCK_RECORD_HEADER.to_string(), record.id.clone());

    HttpResponse {
        status: record.status_code,
        status_text: status_text(record.status_code).to_string(),
        headers,
        body: Bytes::from(body.to_string()),
        url: url.to_string(),
        synthetic: true,
    }
}

/// Wait out the record's delay, then build the response.
pub async fn synthesize(record: &MockRecord, url: &str) -> HttpResponse {
    if record.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(record.delay_ms as u64)).await;
    }
    build_response(record, url)
}
