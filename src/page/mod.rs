//! Page context
//!
//! The monitored page and its two request primitives: [`Page::fetch`]
//! (promise style) and [`EventRequest`] (event style). Both route through the
//! page's [`TransportChain`], so installing the interceptor once covers both.

pub mod correlation;
pub mod event_request;
pub mod interceptor;
pub mod transport;

pub use correlation::{CorrelationClient, DEFAULT_CHECK_TIMEOUT};
pub use event_request::{EventRequest, EventRequestError, ReadyState, RequestEvent, RequestState};
pub use interceptor::{MockInterceptor, MOCK_INTERCEPTOR_NAME};
pub use transport::{
    Interceptor, Next, ReqwestTransport, Transport, TransportChain, TransportError,
    TransportResult,
};

use crate::models::{RequestInit, UrlSource};
use once_cell::sync::OnceCell;
use std::sync::{Arc, PoisonError, RwLock};

struct PageInner {
    chain: RwLock<Arc<TransportChain>>,
    correlation: OnceCell<Arc<CorrelationClient>>,
}

#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(PageInner {
                chain: RwLock::new(Arc::new(TransportChain::new(transport))),
                correlation: OnceCell::new(),
            }),
        }
    }

    /// Install the mock interceptor. Returns false (and changes nothing) if
    /// one is already installed on this page.
    pub fn install_interceptor(&self, client: Arc<CorrelationClient>) -> bool {
        if self.inner.correlation.set(Arc::clone(&client)).is_err() {
            tracing::debug!("Interceptor already installed on this page; skipping");
            return false;
        }
        let mut chain = self
            .inner
            .chain
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = chain.with_interceptor(Arc::new(MockInterceptor::new(client)));
        *chain = Arc::new(next);
        tracing::debug!("Interceptor installed");
        true
    }

    pub fn is_intercepted(&self) -> bool {
        self.inner.correlation.get().is_some()
    }

    /// Current chain; in-flight calls keep the chain they started with.
    pub fn chain(&self) -> Arc<TransportChain> {
        let chain = self
            .inner
            .chain
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*chain)
    }

    /// Promise-style request.
    pub async fn fetch(&self, source: impl Into<UrlSource>, init: RequestInit) -> TransportResult {
        let request = source.into().into_request(init);
        self.chain().execute(request).await
    }

    /// New event-style request bound to this page.
    pub fn event_request(&self) -> EventRequest {
        EventRequest::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{page_link, BridgeEndpoint};
    use crate::models::{
        CheckResult, HttpMethod, HttpResponse, InterceptEnvelope, MockRecord, OutboundRequest,
    };
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Stand-in for the real network that counts calls.
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
        methods: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Transport for CountingTransport {
        fn send(&self, request: OutboundRequest) -> BoxFuture<'_, TransportResult> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.urls.lock().unwrap().push(request.url.clone());
                self.methods.lock().unwrap().push(request.method.to_string());
                if self.fail {
                    return Err(TransportError::Network("connection refused".into()));
                }
                Ok(HttpResponse {
                    status: 200,
                    status_text: "OK".into(),
                    headers: Default::default(),
                    body: Bytes::from_static(b"{\"source\":\"network\"}"),
                    url: request.url,
                    synthetic: false,
                })
            })
        }
    }

    fn answering_bridge(mut endpoint: BridgeEndpoint, result: CheckResult) {
        tokio::spawn(async move {
            while let Some(frame) = endpoint.from_page.recv().await {
                let envelope = InterceptEnvelope::decode(&frame).unwrap();
                let response =
                    InterceptEnvelope::check_response(envelope.request_id, envelope.url, result.clone());
                let _ = endpoint.to_page.send(response.encode().unwrap());
            }
        });
    }

    fn mock_result(record: MockRecord) -> CheckResult {
        CheckResult {
            should_intercept: true,
            mock_record_id: Some(record.id.clone()),
            record: Some(record),
            ..Default::default()
        }
    }

    fn page_with(transport: Arc<CountingTransport>, result: Option<CheckResult>) -> Page {
        let (link, endpoint) = page_link();
        match result {
            Some(result) => answering_bridge(endpoint, result),
            // Keep the bridge end open but never answer.
            None => {
                tokio::spawn(async move {
                    let mut endpoint = endpoint;
                    while endpoint.from_page.recv().await.is_some() {}
                });
            }
        }
        let page = Page::new(transport);
        page.install_interceptor(CorrelationClient::connect(link, DEFAULT_CHECK_TIMEOUT));
        page
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_is_answered_locally_when_mocked() {
        let transport = Arc::new(CountingTransport::default());
        let record = MockRecord::new("missing", 404, r#"{"error":"not found"}"#);
        let page = page_with(Arc::clone(&transport), Some(mock_result(record)));

        let response = page
            .fetch("/api/users/7", RequestInit::default())
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(response.json().unwrap()["error"], "not found");
        assert!(response.synthetic);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn mocked_fetch_waits_for_record_delay() {
        let transport = Arc::new(CountingTransport::default());
        let record = MockRecord::new("slow", 200, "{}").with_delay(750);
        let page = page_with(Arc::clone(&transport), Some(mock_result(record)));

        let started = tokio::time::Instant::now();
        page.fetch("/api/slow", RequestInit::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn pass_through_calls_real_transport_once() {
        let transport = Arc::new(CountingTransport::default());
        let page = page_with(Arc::clone(&transport), Some(CheckResult::pass_through()));

        let response = page
            .fetch("/api/orders", RequestInit::default())
            .await
            .unwrap();
        assert!(!response.synthetic);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pass_through_keeps_uncommon_methods() {
        let transport = Arc::new(CountingTransport::default());
        let page = page_with(Arc::clone(&transport), Some(CheckResult::pass_through()));

        let init = RequestInit {
            method: Some(HttpMethod::from_str_lossy("PROPFIND")),
            ..Default::default()
        };
        page.fetch("/dav/folder", init).await.unwrap();

        let mut request = page.event_request();
        request.open("TRACE", "/api/echo");
        request.send(None).await.unwrap();

        assert_eq!(
            transport.methods.lock().unwrap().as_slice(),
            ["PROPFIND".to_string(), "TRACE".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_bridge_falls_back_to_network_exactly_once() {
        let transport = Arc::new(CountingTransport::default());
        let page = page_with(Arc::clone(&transport), None);

        let started = tokio::time::Instant::now();
        let response = page
            .fetch("/api/users", RequestInit::default())
            .await
            .unwrap();
        assert!(started.elapsed() >= DEFAULT_CHECK_TIMEOUT);
        assert_eq!(response.text(), "{\"source\":\"network\"}");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_rewrites_url_before_network() {
        let transport = Arc::new(CountingTransport::default());
        let result = CheckResult {
            should_intercept: true,
            redirect_target: Some("http://localhost/mock/users".into()),
            delay_ms: 100,
            ..Default::default()
        };
        let page = page_with(Arc::clone(&transport), Some(result));

        let started = tokio::time::Instant::now();
        let response = page
            .fetch(
                OutboundRequest::new(HttpMethod::Get, "/api/users?page=2"),
                RequestInit::default(),
            )
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(response.url, "http://localhost/mock/users");
        assert_eq!(
            transport.urls.lock().unwrap().as_slice(),
            ["http://localhost/mock/users".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_surface_unchanged() {
        let transport = Arc::new(CountingTransport {
            fail: true,
            ..Default::default()
        });
        let page = page_with(Arc::clone(&transport), Some(CheckResult::pass_through()));

        let err = page
            .fetch("/api/down", RequestInit::default())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Network("connection refused".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn installing_twice_wraps_once() {
        let transport = Arc::new(CountingTransport::default());
        let (link, endpoint) = page_link();
        let record = MockRecord::new("users", 200, r#"{"ok":true}"#);
        answering_bridge(endpoint, mock_result(record));
        let client = CorrelationClient::connect(link, DEFAULT_CHECK_TIMEOUT);

        let page = Page::new(transport);
        assert!(page.install_interceptor(Arc::clone(&client)));
        assert!(!page.install_interceptor(Arc::clone(&client)));
        assert_eq!(page.chain().interceptor_names(), vec![MOCK_INTERCEPTOR_NAME]);

        let done_events = Arc::new(AtomicUsize::new(0));
        let load_events = Arc::new(AtomicUsize::new(0));
        let mut request = page.event_request();
        {
            let done_events = Arc::clone(&done_events);
            request.set_on_ready_state_change(move |_, state| {
                if state.ready_state == ReadyState::Done {
                    done_events.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        {
            let load_events = Arc::clone(&load_events);
            request.add_event_listener(RequestEvent::Load, move |_, _| {
                load_events.fetch_add(1, Ordering::SeqCst);
            });
        }
        request.open("GET", "/api/users");
        request.send(None).await.unwrap();

        assert_eq!(done_events.load(Ordering::SeqCst), 1);
        assert_eq!(load_events.load(Ordering::SeqCst), 1);
        assert_eq!(request.response_json().unwrap()["ok"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn event_request_fires_state_changes_before_load() {
        let transport = Arc::new(CountingTransport::default());
        let record = MockRecord::new("created", 201, r#"{"id":5}"#);
        let page = page_with(Arc::clone(&transport), Some(mock_result(record)));

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut request = page.event_request();
        for event in [
            RequestEvent::ReadyStateChange,
            RequestEvent::Load,
            RequestEvent::Error,
            RequestEvent::LoadEnd,
        ] {
            let log = Arc::clone(&log);
            request.add_event_listener(event, move |event, state| {
                log.lock().unwrap().push((event, state.ready_state));
            });
        }

        request.open("POST", "/api/items");
        request.set_request_header("content-type", "application/json");
        request
            .send(Some(Bytes::from_static(b"{\"name\":\"x\"}")))
            .await
            .unwrap();

        assert_eq!(request.status(), 201);
        assert_eq!(request.status_text(), "Created");
        assert_eq!(request.response_header("content-type"), Some("application/json"));
        assert_eq!(
            log.lock().unwrap().as_slice(),
            [
                (RequestEvent::ReadyStateChange, ReadyState::Opened),
                (RequestEvent::ReadyStateChange, ReadyState::HeadersReceived),
                (RequestEvent::ReadyStateChange, ReadyState::Loading),
                (RequestEvent::ReadyStateChange, ReadyState::Done),
                (RequestEvent::Load, ReadyState::Done),
                (RequestEvent::LoadEnd, ReadyState::Done),
            ]
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn event_request_network_failure_fires_error_not_hang() {
        let transport = Arc::new(CountingTransport {
            fail: true,
            ..Default::default()
        });
        let page = page_with(Arc::clone(&transport), None);

        let errors = Arc::new(AtomicUsize::new(0));
        let mut request = page.event_request();
        {
            let errors = Arc::clone(&errors);
            request.add_event_listener(RequestEvent::Error, move |_, _| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }
        request.open("GET", "/api/users");
        request.send(None).await.unwrap();

        assert_eq!(request.ready_state(), ReadyState::Done);
        assert_eq!(request.status(), 0);
        assert!(request.state().error.is_some());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_requires_open() {
        let page = Page::new(Arc::new(CountingTransport::default()));
        let mut request = page.event_request();
        assert_eq!(request.send(None).await, Err(EventRequestError::NotOpened));

        request.open("GET", "/x");
        request.send(None).await.unwrap();
        assert_eq!(request.send(None).await, Err(EventRequestError::AlreadySent));
    }

    #[tokio::test]
    async fn uninstalled_page_goes_straight_to_network() {
        let transport = Arc::new(CountingTransport::default());
        let page = Page::new(Arc::clone(&transport) as Arc<dyn Transport>);
        assert!(!page.is_intercepted());
        page.fetch("/x", RequestInit::default()).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
