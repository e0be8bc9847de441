//! # API Dispatch Testing
//!
//! Testing utilities and helpers for the API dispatch layer.
//!
//! This crate provides:
//! - [`MockTransport`]: scripted transport that records requests and can hold
//!   exchanges in flight
//! - [`RecordingNotifier`] and [`RecordingHandler`]: capture what the
//!   dispatcher reported
//! - [`init_tracing`]: test-friendly `tracing` output
//!
//! ## Example
//!
//! ```ignore
//! use api_dispatch_testing::{MockTransport, RecordingHandler};
//!
//! #[tokio::test]
//! async fn banner_loads() {
//!     let transport = MockTransport::new();
//!     transport.respond_envelope(true, json!([1, 2, 3]), "ok", "200");
//!
//!     let handler = RecordingHandler::new();
//!     let api = dispatcher(&transport).api()
//!         .with_descriptor(RequestSpec::new("/api/banner"))
//!         .with_handler(handler.clone());
//!
//!     api.request(None).unwrap();
//!     let events = handler.wait_for_outcomes(1).await;
//! }
//! ```

pub mod transport_mocks;

/// Recording implementations of the notifier and callback traits.
pub mod mocks {
    use api_dispatch_core::descriptor::ResponseHandler;
    use api_dispatch_core::environment::Notifier;
    use api_dispatch_core::outcome::{ApiResponse, RequestError};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use tokio::sync::Notify;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A status message shown through the notifier.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Notice {
        /// `show_success`
        Success(String),
        /// `show_error`
        Error(String),
    }

    /// Notifier that records every message.
    ///
    /// # Example
    ///
    /// ```
    /// use api_dispatch_testing::mocks::{Notice, RecordingNotifier};
    /// use api_dispatch_core::environment::Notifier;
    ///
    /// let notifier = RecordingNotifier::new();
    /// notifier.show_error("denied");
    /// assert_eq!(notifier.notices(), vec![Notice::Error("denied".to_string())]);
    /// ```
    #[derive(Clone, Debug, Default)]
    pub struct RecordingNotifier {
        notices: Arc<Mutex<Vec<Notice>>>,
    }

    impl RecordingNotifier {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Messages shown so far, in order
        #[must_use]
        pub fn notices(&self) -> Vec<Notice> {
            lock(&self.notices).clone()
        }

        /// Whether any success message was shown
        #[must_use]
        pub fn any_success(&self) -> bool {
            lock(&self.notices)
                .iter()
                .any(|notice| matches!(notice, Notice::Success(_)))
        }
    }

    impl Notifier for RecordingNotifier {
        fn show_success(&self, message: &str) {
            lock(&self.notices).push(Notice::Success(message.to_string()));
        }

        fn show_error(&self, message: &str) {
            lock(&self.notices).push(Notice::Error(message.to_string()));
        }
    }

    /// A callback received by [`RecordingHandler`].
    #[derive(Clone, Debug, PartialEq)]
    pub enum HandlerEvent {
        /// `on_code`
        Code(String),
        /// `on_success`
        Success(ApiResponse),
        /// `on_failure`
        Failure(RequestError),
    }

    impl HandlerEvent {
        const fn is_outcome(&self) -> bool {
            !matches!(self, Self::Code(_))
        }
    }

    /// Response handler that records every callback in order.
    #[derive(Clone, Debug, Default)]
    pub struct RecordingHandler {
        events: Arc<Mutex<Vec<HandlerEvent>>>,
        notify: Arc<Notify>,
    }

    impl RecordingHandler {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Callbacks received so far, in order
        #[must_use]
        pub fn events(&self) -> Vec<HandlerEvent> {
            lock(&self.events).clone()
        }

        /// Number of terminal callbacks (`on_success` / `on_failure`)
        #[must_use]
        pub fn outcomes(&self) -> usize {
            lock(&self.events).iter().filter(|event| event.is_outcome()).count()
        }

        /// Wait until at least `count` terminal callbacks were received, then
        /// return every recorded event.
        pub async fn wait_for_outcomes(&self, count: usize) -> Vec<HandlerEvent> {
            loop {
                let notified = self.notify.notified();
                if self.outcomes() >= count {
                    return self.events();
                }
                notified.await;
            }
        }

        fn push(&self, event: HandlerEvent) {
            lock(&self.events).push(event);
            self.notify.notify_waiters();
        }
    }

    impl ResponseHandler for RecordingHandler {
        fn on_success(&self, response: &ApiResponse) {
            self.push(HandlerEvent::Success(response.clone()));
        }

        fn on_failure(&self, error: &RequestError) {
            self.push(HandlerEvent::Failure(error.clone()));
        }

        fn on_code(&self, code: &str) {
            self.push(HandlerEvent::Code(code.to_string()));
        }
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{HandlerEvent, Notice, RecordingHandler, RecordingNotifier};
pub use transport_mocks::{envelope_response, MockTransport, RecordedUpload};
