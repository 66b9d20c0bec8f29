//! Event-style request primitive.
//!
//! `open` records the method and URL, `send` runs the request through the
//! page's transport chain, then the response properties are assigned and
//! events fire in the order page code expects: every ready-state change
//! first, then `Load` (or `Error`), then `LoadEnd`.

use crate::models::{HttpMethod, HttpResponse, OutboundRequest};
use crate::page::Page;
use bytes::Bytes;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    ReadyStateChange,
    Load,
    Error,
    LoadEnd,
}

#[derive(Debug, Error, PartialEq)]
pub enum EventRequestError {
    #[error("request must be opened before it is sent")]
    NotOpened,
    #[error("request has already been sent")]
    AlreadySent,
}

/// Response-bearing properties visible to listeners.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub ready_state: ReadyState,
    pub status: u16,
    pub status_text: String,
    pub response_text: String,
    pub response_url: String,
    pub response_headers: HashMap<String, String>,
    /// Set when the request failed at the network level.
    pub error: Option<String>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            ready_state: ReadyState::Unsent,
            status: 0,
            status_text: String::new(),
            response_text: String::new(),
            response_url: String::new(),
            response_headers: HashMap::new(),
            error: None,
        }
    }
}

type Listener = Box<dyn FnMut(RequestEvent, &RequestState) + Send>;

pub struct EventRequest {
    page: Page,
    method: HttpMethod,
    url: Option<String>,
    headers: HashMap<String, String>,
    sent: bool,
    state: RequestState,
    on_ready_state_change: Option<Listener>,
    on_load: Option<Listener>,
    listeners: Vec<(RequestEvent, Listener)>,
}

impl EventRequest {
    pub(crate) fn new(page: Page) -> Self {
        Self {
            page,
            method: HttpMethod::Get,
            url: None,
            headers: HashMap::new(),
            sent: false,
            state: RequestState::default(),
            on_ready_state_change: None,
            on_load: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.ready_state
    }

    pub fn status(&self) -> u16 {
        self.state.status
    }

    pub fn status_text(&self) -> &str {
        &self.state.status_text
    }

    pub fn response_text(&self) -> &str {
        &self.state.response_text
    }

    pub fn response_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.state.response_text)
    }

    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.state
            .response_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_on_ready_state_change<F>(&mut self, callback: F)
    where
        F: FnMut(RequestEvent, &RequestState) + Send + 'static,
    {
        self.on_ready_state_change = Some(Box::new(callback));
    }

    pub fn set_on_load<F>(&mut self, callback: F)
    where
        F: FnMut(RequestEvent, &RequestState) + Send + 'static,
    {
        self.on_load = Some(Box::new(callback));
    }

    pub fn add_event_listener<F>(&mut self, event: RequestEvent, callback: F)
    where
        F: FnMut(RequestEvent, &RequestState) + Send + 'static,
    {
        self.listeners.push((event, Box::new(callback)));
    }

    pub fn open(&mut self, method: &str, url: impl Into<String>) {
        self.method = HttpMethod::from_str_lossy(method);
        self.url = Some(url.into());
        self.headers.clear();
        self.sent = false;
        self.state = RequestState::default();
        self.change_state(ReadyState::Opened);
    }

    pub fn set_request_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    /// Run the request to completion. Always ends in `ReadyState::Done`
    /// with either `Load` or `Error` fired, never left hanging.
    pub async fn send(&mut self, body: Option<Bytes>) -> Result<(), EventRequestError> {
        let url = self.url.clone().ok_or(EventRequestError::NotOpened)?;
        if self.sent {
            return Err(EventRequestError::AlreadySent);
        }
        self.sent = true;

        let mut request = OutboundRequest::new(self.method.clone(), url);
        request.headers = self.headers.clone();
        request.body = body;

        match self.page.chain().execute(request).await {
            Ok(response) => self.complete(response),
            Err(err) => self.fail(err.to_string()),
        }
        Ok(())
    }

    fn complete(&mut self, response: HttpResponse) {
        self.state.status = response.status;
        self.state.status_text = response.status_text.clone();
        self.state.response_headers = response.headers.clone();
        self.state.response_url = response.url.clone();
        self.change_state(ReadyState::HeadersReceived);
        self.change_state(ReadyState::Loading);
        self.state.response_text = response.text();
        self.change_state(ReadyState::Done);
        self.fire(RequestEvent::Load);
        self.fire(RequestEvent::LoadEnd);
    }

    fn fail(&mut self, error: String) {
        tracing::debug!("Event request failed: {}", error);
        self.state.status = 0;
        self.state.status_text.clear();
        self.state.error = Some(error);
        self.change_state(ReadyState::Done);
        self.fire(RequestEvent::Error);
        self.fire(RequestEvent::LoadEnd);
    }

    fn change_state(&mut self, ready_state: ReadyState) {
        self.state.ready_state = ready_state;
        self.fire(RequestEvent::ReadyStateChange);
    }

    fn fire(&mut self, event: RequestEvent) {
        let state = &self.state;
        let handler = match event {
            RequestEvent::ReadyStateChange => self.on_ready_state_change.as_mut(),
            RequestEvent::Load => self.on_load.as_mut(),
            _ => None,
        };
        if let Some(handler) = handler {
            handler(event, state);
        }
        for (kind, listener) in self.listeners.iter_mut() {
            if *kind == event {
                listener(event, state);
            }
        }
    }
}
