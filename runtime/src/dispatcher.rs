//! Dispatch core.
//!
//! A [`Dispatcher`] is the shared service built once by the application: it
//! owns the request executor, the session store, the in-flight registry and
//! the notifier. Each call site creates an [`Api`] from it. The `Api` is the
//! owner of its requests: dropping it cancels everything it still has in
//! flight.
//!
//! One request produces exactly one outcome, delivered either through the
//! bound [`ResponseHandler`] ([`Api::request`]) or as the single item of a
//! lazy stream ([`Api::request_stream`], [`Api::upload`]). Both modes share
//! the same classification path.
//!
//! # Example
//!
//! ```no_run
//! use api_dispatch_core::{ApiResponse, HttpMethod, RequestSpec, ResponseHandler, StaticDomain};
//! # use api_dispatch_core::{Transport, TransportRequest, TransportResponse, TransportError, UploadRequest};
//! # use futures::future::BoxFuture;
//! use api_dispatch_runtime::Dispatcher;
//! use std::sync::Arc;
//!
//! # struct Http;
//! # impl Transport for Http {
//! #     fn send(&self, _: TransportRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>> { unimplemented!() }
//! #     fn upload(&self, _: UploadRequest) -> BoxFuture<'static, Result<TransportResponse, TransportError>> { unimplemented!() }
//! # }
//! struct Banner;
//!
//! impl ResponseHandler for Banner {
//!     fn on_success(&self, response: &ApiResponse) {
//!         println!("banner: {:?}", response.data);
//!     }
//! }
//!
//! # async fn example() {
//! let dispatcher = Dispatcher::builder(Arc::new(Http), Arc::new(StaticDomain::new("https://api.example.com")))
//!     .build();
//!
//! let api = dispatcher
//!     .api()
//!     .with_descriptor(RequestSpec::new("/api/banner").with_method(HttpMethod::Get))
//!     .with_handler(Banner);
//!
//! let handle = api.request(None);
//! # }
//! ```

use crate::config::DispatchConfig;
use crate::error::DispatchError;
use crate::executor::{ExchangeResult, PendingExchange, RequestExecutor};
use crate::metrics::{DispatchMetrics, OutcomeKind};
use crate::registry::InFlightRegistry;
use crate::session::SessionStore;
use crate::storage::MemoryStore;
use api_dispatch_core::descriptor::{Descriptor, RequestSpec, ResponseHandler};
use api_dispatch_core::environment::{DomainResolver, KeyValueStore, NoopNotifier, Notifier};
use api_dispatch_core::id::{IdAllocator, OwnerId, RequestId};
use api_dispatch_core::multipart::{MultipartForm, ProgressFn, UploadPayload};
use api_dispatch_core::outcome::{classify, ApiResponse, RequestError};
use api_dispatch_core::params::Parameters;
use api_dispatch_core::transport::{Headers, Transport};
use async_stream::stream;
use futures::stream::BoxStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lazy single-value stream of a dispatched request.
///
/// Yields exactly one item (`Ok` on success, `Err` on failure) and then
/// ends. A cancelled request ends without yielding.
pub type ResponseStream = BoxStream<'static, Result<ApiResponse, RequestError>>;

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    transport: Arc<dyn Transport>,
    domain: Arc<dyn DomainResolver>,
    storage: Option<Arc<dyn KeyValueStore>>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
}

impl DispatcherBuilder {
    /// Builder: Set durable storage for the session tokens
    ///
    /// Defaults to an in-memory store.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Builder: Set the status notifier
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Builder: Set configuration
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the dispatcher, loading the persisted session tokens.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let session = Arc::new(SessionStore::new(storage, self.config.session_key.clone()));
        tracing::info!(
            base_domain = %self.domain.base_domain(),
            session_key = %self.config.session_key,
            tokens = session.tokens().len(),
            "Dispatcher ready"
        );

        let executor = RequestExecutor::new(
            self.transport,
            session,
            self.domain,
            self.config.request_timeout(),
            self.config.max_logged_body_bytes,
        );

        Dispatcher {
            inner: Arc::new(Inner {
                executor,
                registry: InFlightRegistry::new(),
                notifier: self.notifier,
                config: self.config,
                owners: IdAllocator::new(),
            }),
        }
    }
}

/// Shared dispatch service.
///
/// Cloning is cheap; clones share the executor, session and registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Start building a dispatcher around a transport and a domain resolver.
    #[must_use]
    pub fn builder(
        transport: Arc<dyn Transport>,
        domain: Arc<dyn DomainResolver>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            transport,
            domain,
            storage: None,
            notifier: Arc::new(NoopNotifier),
            config: DispatchConfig::default(),
        }
    }

    /// Create a new owner with no descriptor and no handler bound.
    #[must_use]
    pub fn api(&self) -> Api {
        let owner = self.inner.owners.next_owner();
        tracing::trace!(owner = %owner, "Api created");
        Api {
            owner,
            dispatcher: self.clone(),
            descriptor: None,
            handler: None,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Upload payload carrying the configured default part metadata.
    #[must_use]
    pub fn upload_payload(&self, data: Vec<u8>) -> UploadPayload {
        UploadPayload::new(data)
            .with_field_name(self.inner.config.upload_field_name.clone())
            .with_file_name(self.inner.config.upload_file_name.clone())
            .with_mime_type(self.inner.config.upload_mime_type.clone())
    }

    /// Cancel every request in flight, across all owners.
    pub fn cancel_all(&self) -> usize {
        self.inner.executor.cancel_all()
    }

    /// Number of requests in flight, across all owners.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.executor.in_flight()
    }

    /// Session store shared by all requests.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        self.inner.executor.session()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("executor", &self.inner.executor)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

struct Inner {
    executor: RequestExecutor,
    registry: InFlightRegistry,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
    owners: IdAllocator,
}

impl Inner {
    fn start(&self, owner: OwnerId, spec: &RequestSpec, parameters: Option<Parameters>) -> PendingExchange {
        let parameters = parameters.or_else(|| spec.parameters.clone());
        let pending = self.executor.execute(
            &spec.route,
            spec.method,
            parameters,
            spec.encoding,
            header_list(spec),
        );
        self.registry.register(owner, pending.id());
        pending
    }

    fn start_upload(
        &self,
        owner: OwnerId,
        spec: &RequestSpec,
        form: MultipartForm,
        progress: Option<ProgressFn>,
    ) -> PendingExchange {
        let pending = self
            .executor
            .execute_upload(&spec.route, header_list(spec), form, progress);
        self.registry.register(owner, pending.id());
        pending
    }

    /// Wait for `pending` and release its handle.
    ///
    /// Returns `None` when the request was cancelled, including a cancel that
    /// raced a response already received.
    async fn finish(&self, owner: OwnerId, pending: PendingExchange) -> Option<ExchangeResult> {
        let id = pending.id();
        let result = pending.wait().await;
        self.registry.release(owner, id);
        if !self.executor.complete(id) {
            tracing::debug!(request = %id, "Discarding completion of cancelled request");
            return None;
        }
        result
    }

    /// Classify a finished exchange and apply the notification rules.
    ///
    /// `on_code` runs before the outcome is returned, and only when a body
    /// was received.
    fn classify(
        &self,
        result: ExchangeResult,
        show_message: bool,
        on_code: impl FnOnce(&str),
    ) -> Result<ApiResponse, RequestError> {
        let envelope = match result {
            Ok(envelope) => envelope,
            Err(error) => {
                DispatchMetrics::record_outcome(OutcomeKind::SystemError);
                return Err(RequestError::system(error.to_string()));
            }
        };

        on_code(&envelope.code);

        let outcome = classify(envelope);
        match &outcome {
            Ok(response) => {
                DispatchMetrics::record_outcome(OutcomeKind::Success);
                if show_message && !response.message.is_empty() {
                    self.notifier.show_success(&response.message);
                }
            }
            Err(error) => {
                DispatchMetrics::record_outcome(OutcomeKind::Failed);
                self.notifier.show_error(error.message());
            }
        }
        outcome
    }

    fn intercepted(&self, spec: &RequestSpec) -> RequestError {
        DispatchMetrics::record_intercepted();
        tracing::debug!(route = %spec.route, "Request intercepted");
        RequestError::failed(
            self.config.cancelled_message.clone(),
            self.config.cancelled_code.clone(),
        )
    }

    fn cancel_owner(&self, owner: OwnerId) -> usize {
        self.registry
            .take(owner)
            .into_iter()
            .filter(|id| self.executor.cancel(*id))
            .count()
    }
}

fn header_list(spec: &RequestSpec) -> Headers {
    spec.headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Cancels a stream's request when the stream is dropped before finishing.
///
/// Once the request completed the id is no longer live and the cancel is a
/// no-op.
struct CancelOnDrop {
    inner: Arc<Inner>,
    owner: OwnerId,
    id: RequestId,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.inner.registry.release(self.owner, self.id);
        self.inner.executor.cancel(self.id);
    }
}

/// Cancellation epoch of an owner, captured by a lazy stream at creation.
///
/// [`Api::cancel_all`] and `Drop` advance the epoch; a stream whose epoch is
/// stale sends nothing and ends without yielding.
struct OwnerEpoch {
    current: Arc<AtomicU64>,
    captured: u64,
}

impl OwnerEpoch {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.captured
    }
}

/// One logical request site (an owner of in-flight requests).
///
/// Dropping the `Api` cancels all of its in-flight requests, including
/// streams that were created but not yet polled.
pub struct Api {
    owner: OwnerId,
    dispatcher: Dispatcher,
    descriptor: Option<Arc<dyn Descriptor>>,
    handler: Option<Arc<dyn ResponseHandler>>,
    epoch: Arc<AtomicU64>,
}

impl Api {
    /// Owner id of this api.
    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Builder: Bind a descriptor
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: impl Descriptor + 'static) -> Self {
        self.set_descriptor(descriptor);
        self
    }

    /// Builder: Bind a response handler
    #[must_use]
    pub fn with_handler(mut self, handler: impl ResponseHandler + 'static) -> Self {
        self.set_handler(handler);
        self
    }

    /// Bind (or replace) the descriptor.
    pub fn set_descriptor(&mut self, descriptor: impl Descriptor + 'static) {
        self.descriptor = Some(Arc::new(descriptor));
    }

    /// Bind (or replace) the response handler.
    pub fn set_handler(&mut self, handler: impl ResponseHandler + 'static) {
        self.handler = Some(Arc::new(handler));
    }

    /// Bind a shared response handler.
    pub fn set_shared_handler(&mut self, handler: Arc<dyn ResponseHandler>) {
        self.handler = Some(handler);
    }

    /// Dispatch in callback mode.
    ///
    /// `parameters` overrides the descriptor's parameters when given. Returns
    /// the handle of the started request, or `None` when the interception
    /// predicate suppressed it. The outcome is delivered to the bound handler
    /// from a background task.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` when no descriptor or no handler is bound; no
    /// request is sent.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn request(&self, parameters: Option<Parameters>) -> Result<Option<RequestId>, DispatchError> {
        let descriptor = self.descriptor()?;
        let Some(handler) = self.handler.clone() else {
            tracing::error!(owner = %self.owner, "Dispatch aborted: no response handler bound");
            return Err(DispatchError::MissingHandler);
        };

        let spec = descriptor.describe();
        if !spec.should_request() {
            let _ = self.inner().intercepted(&spec);
            return Ok(None);
        }

        let inner = Arc::clone(self.inner());
        let owner = self.owner;
        let pending = inner.start(owner, &spec, parameters);
        let id = pending.id();
        let show_message = spec.show_message;

        tokio::spawn(async move {
            let Some(result) = inner.finish(owner, pending).await else {
                return;
            };
            match inner.classify(result, show_message, |code| handler.on_code(code)) {
                Ok(response) => handler.on_success(&response),
                Err(error) => handler.on_failure(&error),
            }
        });

        Ok(Some(id))
    }

    /// Dispatch in stream mode.
    ///
    /// Nothing is sent until the stream is first polled. An intercepted
    /// request yields the cancellation sentinel as its error without
    /// contacting the transport. The bound handler, if any, receives only the
    /// `on_code` side channel.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MissingDescriptor` when no descriptor is bound.
    pub fn request_stream(&self, parameters: Option<Parameters>) -> Result<ResponseStream, DispatchError> {
        let spec = self.descriptor()?.describe();
        let inner = Arc::clone(self.inner());
        let owner = self.owner;
        let handler = self.handler.clone();
        let intercepted = (!spec.should_request()).then(|| inner.intercepted(&spec));
        let epoch = self.epoch();

        Ok(Box::pin(stream! {
            if let Some(error) = intercepted {
                yield Err(error);
                return;
            }
            if !epoch.is_current() {
                tracing::debug!(owner = %owner, route = %spec.route, "Owner cancelled before stream was polled");
                return;
            }

            let pending = inner.start(owner, &spec, parameters);
            let _guard = CancelOnDrop { inner: Arc::clone(&inner), owner, id: pending.id() };
            if !epoch.is_current() {
                return;
            }
            if let Some(result) = inner.finish(owner, pending).await {
                yield inner.classify(result, spec.show_message, |code| {
                    if let Some(handler) = &handler {
                        handler.on_code(code);
                    }
                });
            }
        }))
    }

    /// Upload a binary payload as a multipart form.
    ///
    /// Route, headers, interception and message display come from the bound
    /// descriptor. The form is built when the stream is first polled; an
    /// invalid payload yields a `SystemError` without contacting the
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::MissingDescriptor` when no descriptor is bound.
    pub fn upload(
        &self,
        payload: UploadPayload,
        progress: Option<ProgressFn>,
    ) -> Result<ResponseStream, DispatchError> {
        let spec = self.descriptor()?.describe();
        let inner = Arc::clone(self.inner());
        let owner = self.owner;
        let handler = self.handler.clone();
        let intercepted = (!spec.should_request()).then(|| inner.intercepted(&spec));
        let epoch = self.epoch();

        Ok(Box::pin(stream! {
            if let Some(error) = intercepted {
                yield Err(error);
                return;
            }
            if !epoch.is_current() {
                tracing::debug!(owner = %owner, route = %spec.route, "Owner cancelled before upload was polled");
                return;
            }

            let form = match MultipartForm::build(payload) {
                Ok(form) => form,
                Err(error) => {
                    tracing::warn!(route = %spec.route, error = %error, "Upload encoding failed");
                    DispatchMetrics::record_outcome(OutcomeKind::SystemError);
                    yield Err(RequestError::system(format!("file encoding failed: {error}")));
                    return;
                }
            };

            let pending = inner.start_upload(owner, &spec, form, progress);
            let _guard = CancelOnDrop { inner: Arc::clone(&inner), owner, id: pending.id() };
            if !epoch.is_current() {
                return;
            }
            if let Some(result) = inner.finish(owner, pending).await {
                yield inner.classify(result, spec.show_message, |code| {
                    if let Some(handler) = &handler {
                        handler.on_code(code);
                    }
                });
            }
        }))
    }

    /// Cancel one request of this owner.
    ///
    /// Returns `false` when `id` is unknown, belongs to another owner, or
    /// already completed; cancelling twice is a no-op.
    pub fn cancel(&self, id: RequestId) -> bool {
        let inner = self.inner();
        if !inner.registry.release(self.owner, id) {
            return false;
        }
        inner.executor.cancel(id)
    }

    /// Cancel every in-flight request of this owner. Returns how many were
    /// cancelled.
    ///
    /// Streams created earlier that were not polled yet end without sending.
    pub fn cancel_all(&self) -> usize {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let cancelled = self.inner().cancel_owner(self.owner);
        if cancelled > 0 {
            tracing::debug!(owner = %self.owner, cancelled, "Owner requests cancelled");
        }
        cancelled
    }

    /// Handles this owner currently has in flight.
    #[must_use]
    pub fn in_flight(&self) -> Vec<RequestId> {
        self.inner().registry.handles(self.owner)
    }

    fn inner(&self) -> &Arc<Inner> {
        &self.dispatcher.inner
    }

    fn epoch(&self) -> OwnerEpoch {
        OwnerEpoch {
            current: Arc::clone(&self.epoch),
            captured: self.epoch.load(Ordering::Acquire),
        }
    }

    fn descriptor(&self) -> Result<&Arc<dyn Descriptor>, DispatchError> {
        self.descriptor.as_ref().ok_or_else(|| {
            tracing::error!(owner = %self.owner, "Dispatch aborted: no request descriptor bound");
            DispatchError::MissingDescriptor
        })
    }
}

impl Drop for Api {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("owner", &self.owner)
            .field("descriptor", &self.descriptor.is_some())
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
