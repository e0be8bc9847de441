//! # API Dispatch Runtime
//!
//! Runtime implementation of the API dispatch layer.
//!
//! This crate provides the [`Dispatcher`] service that turns request
//! descriptors into transport exchanges, round-trips session cookies,
//! classifies the response envelope, and delivers one outcome per call.
//!
//! ## Core Components
//!
//! - **Dispatcher / Api**: Shared service and per-call-site owner; callback
//!   and lazy stream completion from one classification path
//! - **Request Executor**: Runs each exchange on its own task and tracks
//!   liveness for cancellation
//! - **Session Store**: Persists, replays and captures session tokens
//! - **In-Flight Registry**: Groups request handles by owner for bulk
//!   cancellation
//!
//! ## Example
//!
//! ```ignore
//! use api_dispatch_runtime::{Dispatcher, config::DispatchConfig, storage::FileStore};
//!
//! let dispatcher = Dispatcher::builder(transport, domain)
//!     .storage(Arc::new(FileStore::open("./state")?))
//!     .config(DispatchConfig::from_env()?)
//!     .build();
//!
//! let api = dispatcher.api().with_descriptor(spec).with_handler(handler);
//! api.request(None)?;
//!
//! // Stream mode: nothing is sent until polled
//! let response = api.request_stream(None)?.next().await;
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Configuration loading
pub mod config;

/// Dispatch core: `Dispatcher`, `Api` and the completion adapters
pub mod dispatcher;

/// Error types for the dispatch runtime
pub mod error;

/// Request executor and liveness table
pub mod executor;

/// Prometheus metrics for observability
pub mod metrics;

/// Tracing-backed notifier
pub mod notify;

/// In-flight registry
pub mod registry;

/// Session token persistence
pub mod session;

/// Key/value storage backends
pub mod storage;

pub use config::DispatchConfig;
pub use dispatcher::{Api, Dispatcher, DispatcherBuilder, ResponseStream};
pub use error::{ConfigError, DispatchError};
pub use executor::{ExchangeResult, PendingExchange, RequestExecutor};
pub use notify::LogNotifier;
pub use registry::InFlightRegistry;
pub use session::{SessionStore, SessionToken, TokenSet};
pub use storage::{FileStore, MemoryStore};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Every critical section in this crate leaves the guarded collection in a
/// consistent state, so a poisoned lock carries no torn data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
