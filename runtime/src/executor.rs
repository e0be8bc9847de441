//! Request executor.
//!
//! Turns a resolved request into one transport exchange running on its own
//! tokio task. The executor owns the liveness table of in-flight requests:
//! a [`RequestId`] is live from [`RequestExecutor::execute`] until it is
//! either [completed](RequestExecutor::complete) or
//! [cancelled](RequestExecutor::cancel), whichever comes first.

use crate::lock;
use crate::metrics::DispatchMetrics;
use crate::session::{SessionStore, TokenSet};
use api_dispatch_core::envelope::Envelope;
use api_dispatch_core::environment::DomainResolver;
use api_dispatch_core::id::{IdAllocator, RequestId};
use api_dispatch_core::method::HttpMethod;
use api_dispatch_core::multipart::{MultipartForm, ProgressFn};
use api_dispatch_core::params::{ParameterEncoding, Parameters};
use api_dispatch_core::transport::{
    Headers, Transport, TransportError, TransportRequest, TransportResponse, UploadRequest,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// Raw result of one exchange: the decoded envelope or the transport failure.
pub type ExchangeResult = Result<Envelope, TransportError>;

/// Receiving side of a started exchange.
#[derive(Debug)]
pub struct PendingExchange {
    id: RequestId,
    receiver: oneshot::Receiver<ExchangeResult>,
}

impl PendingExchange {
    /// Handle of the exchange.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the exchange to finish.
    ///
    /// Returns `None` when the exchange was cancelled before it produced a
    /// result.
    pub async fn wait(self) -> Option<ExchangeResult> {
        self.receiver.await.ok()
    }
}

/// Issues requests through the transport and applies the session round-trip.
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    domain: Arc<dyn DomainResolver>,
    ids: IdAllocator,
    live: Arc<Mutex<HashMap<RequestId, AbortHandle>>>,
    timeout: Duration,
    max_logged_body_bytes: usize,
}

impl RequestExecutor {
    /// Create an executor.
    ///
    /// An exchange still running after `timeout` is dropped and fails with
    /// `TransportError::Timeout`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        domain: Arc<dyn DomainResolver>,
        timeout: Duration,
        max_logged_body_bytes: usize,
    ) -> Self {
        Self {
            transport,
            session,
            domain,
            ids: IdAllocator::new(),
            live: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            max_logged_body_bytes,
        }
    }

    /// Per-exchange timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Session store used for the cookie round-trip.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Start a request.
    ///
    /// The handle is live when this returns, so a cancel issued right after
    /// always finds it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn execute(
        &self,
        route: &str,
        method: HttpMethod,
        parameters: Option<Parameters>,
        encoding: ParameterEncoding,
        headers: Headers,
    ) -> PendingExchange {
        let url = join_url(&self.domain.base_domain(), route);
        let (replayed, headers) = self.replay(&url, headers);

        let request = TransportRequest {
            url: url.clone(),
            method,
            headers,
            parameters,
            encoding,
        };
        let trace = Trace {
            method: method.as_str(),
            url,
            headers: request.headers.clone(),
            parameters: request
                .parameters
                .as_ref()
                .map(|p| serde_json::Value::Object(p.clone()).to_string()),
            replayed,
            max_body: self.max_logged_body_bytes,
        };

        let exchange = self.transport.send(request);
        self.spawn(trace, exchange)
    }

    /// Start a multipart upload.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn execute_upload(
        &self,
        route: &str,
        headers: Headers,
        form: MultipartForm,
        progress: Option<ProgressFn>,
    ) -> PendingExchange {
        let url = join_url(&self.domain.base_domain(), route);
        let (replayed, headers) = self.replay(&url, headers);

        let trace = Trace {
            method: HttpMethod::Post.as_str(),
            url: url.clone(),
            headers: headers.clone(),
            parameters: Some(format!(
                "multipart: {} ({}, {} bytes) + {} fields",
                form.file.file_name,
                form.file.mime_type,
                form.file_len(),
                form.fields.len()
            )),
            replayed,
            max_body: self.max_logged_body_bytes,
        };

        let exchange = self.transport.upload(UploadRequest {
            url,
            headers,
            form,
            progress,
        });
        self.spawn(trace, exchange)
    }

    /// Mark `id` as completed and release it.
    ///
    /// Returns `false` when `id` was cancelled (or already completed); the
    /// caller must then discard its result.
    pub fn complete(&self, id: RequestId) -> bool {
        let mut live = lock(&self.live);
        let was_live = live.remove(&id).is_some();
        DispatchMetrics::record_in_flight(live.len());
        was_live
    }

    /// Cancel `id`, aborting its transport exchange.
    ///
    /// Returns `false` when `id` is unknown or already finished. Cancelling
    /// twice is a no-op.
    pub fn cancel(&self, id: RequestId) -> bool {
        let removed = {
            let mut live = lock(&self.live);
            let removed = live.remove(&id);
            DispatchMetrics::record_in_flight(live.len());
            removed
        };

        match removed {
            Some(task) => {
                task.abort();
                DispatchMetrics::record_cancelled();
                tracing::debug!(request = %id, "Request cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every live request. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<RequestId> = lock(&self.live).keys().copied().collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    /// Whether `id` is still in flight.
    #[must_use]
    pub fn is_live(&self, id: RequestId) -> bool {
        lock(&self.live).contains_key(&id)
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.live).len()
    }

    fn replay(&self, url: &str, mut headers: Headers) -> (TokenSet, Headers) {
        let replayed = self.session.tokens();
        SessionStore::replay(&replayed, url, &mut headers);
        (replayed, headers)
    }

    fn spawn(
        &self,
        trace: Trace,
        exchange: BoxFuture<'static, Result<TransportResponse, TransportError>>,
    ) -> PendingExchange {
        let id = self.ids.next_request();
        let (sender, receiver) = oneshot::channel();
        let session = Arc::clone(&self.session);
        let timeout = self.timeout;

        let mut live = lock(&self.live);
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, exchange)
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::Timeout(format!(
                        "no response within {}s",
                        timeout.as_secs_f64()
                    )))
                });
            DispatchMetrics::record_exchange(started.elapsed());

            let result = match result {
                Ok(response) => {
                    trace.response(id, &response);
                    let captured = SessionStore::capture(&trace.replayed, &response, &trace.url);
                    session.persist(captured);
                    Ok(Envelope::decode(&response.body))
                }
                Err(error) => {
                    tracing::warn!(
                        request = %id,
                        method = trace.method,
                        url = %trace.url,
                        error = %error,
                        "Transport failure"
                    );
                    Err(error)
                }
            };

            // Receiver is gone when the caller stopped waiting.
            let _ = sender.send(result);
        });
        live.insert(id, task.abort_handle());
        DispatchMetrics::record_in_flight(live.len());
        drop(live);

        PendingExchange { id, receiver }
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_domain", &self.domain.base_domain())
            .field("in_flight", &self.in_flight())
            .field("timeout", &self.timeout)
            .field("max_logged_body_bytes", &self.max_logged_body_bytes)
            .finish_non_exhaustive()
    }
}

struct Trace {
    method: &'static str,
    url: String,
    headers: Headers,
    parameters: Option<String>,
    replayed: TokenSet,
    max_body: usize,
}

impl Trace {
    fn response(&self, id: RequestId, response: &TransportResponse) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let request_body = response
            .request_body
            .as_deref()
            .or(self.parameters.as_deref())
            .map(|body| preview(body.as_bytes(), self.max_body))
            .unwrap_or_default();

        tracing::debug!(
            request = %id,
            method = self.method,
            url = %self.url,
            status = response.status,
            headers = ?self.headers,
            request_body = %request_body,
            response = %preview(&response.body, self.max_body),
            "Request completed"
        );
    }
}

/// Render `bytes` as lossy UTF-8, truncated to at most `max` bytes.
fn preview(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max {
        return text.into_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &text[..end], bytes.len())
}

/// Concatenate the base domain and a relative route.
fn join_url(base: &str, route: &str) -> String {
    if base.ends_with('/') && route.starts_with('/') {
        format!("{base}{}", &route[1..])
    } else {
        format!("{base}{route}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_drops_duplicate_slash() {
        assert_eq!(join_url("https://api.example.com/", "/v1/banner"), "https://api.example.com/v1/banner");
        assert_eq!(join_url("https://api.example.com", "/v1/banner"), "https://api.example.com/v1/banner");
        assert_eq!(join_url("https://api.example.com/", "v1"), "https://api.example.com/v1");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview(b"short", 16), "short");
        let text = "héllo".as_bytes();
        assert_eq!(preview(text, 2), "h... (6 bytes)");
    }

    #[test]
    fn preview_is_lossy() {
        assert_eq!(preview(&[0x66, 0xff, 0x6f], 16), "f\u{fffd}o");
    }
}
