//! Scripted transport for dispatch tests
//!
//! [`MockTransport`] answers requests from a queue of scripted results and
//! records everything it was asked to send:
//! - responses are consumed in order; an empty queue answers with a
//!   connection failure
//! - a closed gate holds every exchange until [`MockTransport::open_gate`],
//!   which lets tests cancel a request that is provably still in flight
//! - exchanges dropped before finishing are counted as aborted

#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use api_dispatch_core::multipart::{MultipartForm, UploadProgress};
use api_dispatch_core::transport::{
    Headers, Transport, TransportError, TransportRequest, TransportResponse, UploadRequest,
};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Build a response carrying the `{status, data, msg, code}` envelope.
///
/// # Example
///
/// ```
/// use api_dispatch_testing::envelope_response;
/// use serde_json::json;
///
/// let response = envelope_response(true, json!([1, 2, 3]), "ok", "200");
/// assert_eq!(response.status, 200);
/// ```
#[must_use]
pub fn envelope_response(status: bool, data: Value, msg: &str, code: &str) -> TransportResponse {
    TransportResponse::ok(
        json!({ "status": status, "data": data, "msg": msg, "code": code }).to_string(),
    )
}

/// A multipart upload as the transport received it.
#[derive(Clone, Debug)]
pub struct RecordedUpload {
    /// Target URL
    pub url: String,
    /// Headers, including replayed cookies
    pub headers: Headers,
    /// Form body
    pub form: MultipartForm,
}

#[derive(Debug, Default)]
struct State {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    delay: Mutex<Option<Duration>>,
    completed: AtomicUsize,
    aborted: AtomicUsize,
}

/// Scripted in-memory transport.
///
/// Clones share the script and the recordings.
#[derive(Clone, Debug)]
pub struct MockTransport {
    state: Arc<State>,
    gate: Arc<watch::Sender<bool>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport with an empty script and an open gate.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(State::default()),
            gate: Arc::new(gate),
        }
    }

    /// Create a transport whose gate starts closed.
    #[must_use]
    pub fn gated() -> Self {
        let transport = Self::new();
        transport.close_gate();
        transport
    }

    /// Queue a response.
    pub fn respond(&self, response: TransportResponse) -> &Self {
        lock(&self.state.script).push_back(Ok(response));
        self
    }

    /// Queue an envelope response (see [`envelope_response`]).
    pub fn respond_envelope(&self, status: bool, data: Value, msg: &str, code: &str) -> &Self {
        self.respond(envelope_response(status, data, msg, code))
    }

    /// Queue a transport failure.
    pub fn fail(&self, error: TransportError) -> &Self {
        lock(&self.state.script).push_back(Err(error));
        self
    }

    /// Delay every exchange by `delay` after the gate opens.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.state.delay) = Some(delay);
    }

    /// Hold new and pending exchanges until the gate opens.
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// Release held exchanges.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        lock(&self.state.requests).clone()
    }

    /// Uploads received so far, in order.
    #[must_use]
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        lock(&self.state.uploads).clone()
    }

    /// Number of requests and uploads received.
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.state.requests).len() + lock(&self.state.uploads).len()
    }

    /// Number of exchanges that ran to completion.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::SeqCst)
    }

    /// Number of exchanges dropped before completion.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.state.aborted.load(Ordering::SeqCst)
    }

    fn exchange(
        &self,
        on_progress: Option<Box<dyn Fn() + Send>>,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let result = lock(&self.state.script)
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connection("no scripted response".to_string())));
        let delay = *lock(&self.state.delay);
        let mut gate = self.gate.subscribe();
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let mut guard = AbortGuard {
                state: Arc::clone(&state),
                finished: false,
            };
            // The sender lives as long as the transport; a dropped sender
            // means the test is over.
            let _ = gate.wait_for(|open| *open).await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(report) = on_progress {
                report();
            }
            guard.finished = true;
            state.completed.fetch_add(1, Ordering::SeqCst);
            result
        })
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        lock(&self.state.requests).push(request);
        self.exchange(None)
    }

    fn upload(
        &self,
        request: UploadRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>> {
        let total = request.form.file_len();
        let progress = request.progress.clone();
        lock(&self.state.uploads).push(RecordedUpload {
            url: request.url,
            headers: request.headers,
            form: request.form,
        });

        let report = progress.map(|progress| {
            Box::new(move || {
                progress.report(UploadProgress {
                    bytes_sent: total / 2,
                    total_bytes: total,
                });
                progress.report(UploadProgress {
                    bytes_sent: total,
                    total_bytes: total,
                });
            }) as Box<dyn Fn() + Send>
        });
        self.exchange(report)
    }
}

struct AbortGuard {
    state: Arc<State>,
    finished: bool,
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.state.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_dispatch_core::method::HttpMethod;
    use api_dispatch_core::params::ParameterEncoding;

    fn request() -> TransportRequest {
        TransportRequest {
            url: "https://api.example.com/x".to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            parameters: None,
            encoding: ParameterEncoding::Url,
        }
    }

    #[tokio::test]
    async fn answers_in_script_order() {
        let transport = MockTransport::new();
        transport
            .respond_envelope(true, json!(1), "first", "1")
            .fail(TransportError::Timeout("slow".to_string()));

        let first = transport.send(request()).await;
        let second = transport.send(request()).await;
        let third = transport.send(request()).await;

        assert!(first.is_ok());
        assert_eq!(second, Err(TransportError::Timeout("slow".to_string())));
        assert!(matches!(third, Err(TransportError::Connection(_))));
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.completed(), 3);
    }

    #[tokio::test]
    async fn dropped_exchange_counts_as_aborted() {
        let transport = MockTransport::gated();
        transport.respond_envelope(true, Value::Null, "", "");

        let exchange = transport.send(request());
        let polled = tokio::time::timeout(Duration::from_millis(20), exchange).await;

        assert!(polled.is_err());
        assert_eq!(transport.aborted(), 1);
        assert_eq!(transport.completed(), 0);
    }
}
