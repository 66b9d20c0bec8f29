//! The page-context interceptor.

use crate::models::{InterceptDecision, OutboundRequest};
use crate::page::correlation::CorrelationClient;
use crate::page::transport::{Interceptor, Next, TransportResult};
use crate::synthesizer;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

pub const MOCK_INTERCEPTOR_NAME: &str = "mockwire";

/// Diverts each request through a bridge check before it may reach the network.
pub struct MockInterceptor {
    client: Arc<CorrelationClient>,
}

impl MockInterceptor {
    pub fn new(client: Arc<CorrelationClient>) -> Self {
        Self { client }
    }

    async fn decide(&self, url: &str) -> InterceptDecision {
        match AssertUnwindSafe(self.client.check(url)).catch_unwind().await {
            Ok(result) => result.decision(),
            Err(_) => {
                tracing::warn!("Interception check for {} panicked; passing through", url);
                InterceptDecision::PassThrough
            }
        }
    }
}

impl Interceptor for MockInterceptor {
    fn name(&self) -> &str {
        MOCK_INTERCEPTOR_NAME
    }

    fn intercept<'a>(
        &'a self,
        mut request: OutboundRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, TransportResult> {
        Box::pin(async move {
            match self.decide(&request.url).await {
                InterceptDecision::PassThrough => next.run(request).await,
                InterceptDecision::Redirect { target, delay_ms } => {
                    tracing::debug!("Redirecting {} -> {}", request.url, target);
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                    }
                    request.url = target;
                    next.run(request).await
                }
                InterceptDecision::Mock(record) => {
                    tracing::debug!(
                        "Answering {} {} from mock record {}",
                        request.method,
                        request.url,
                        record.id
                    );
                    Ok(synthesizer::synthesize(&record, &request.url).await)
                }
            }
        })
    }
}
