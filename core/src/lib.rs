//! # API Dispatch Core
//!
//! Core types and collaborator traits for the API dispatch layer.
//!
//! Call sites describe requests declaratively; the runtime crate turns those
//! descriptions into HTTP exchanges, decodes the backend's response envelope,
//! and delivers one classified outcome per call.
//!
//! ## Core Concepts
//!
//! - **Descriptor**: per-call policy (method, route, parameters, headers,
//!   message display, interception predicate)
//! - **Envelope**: `{status, data, msg, code}` wrapper decoded from every body
//! - **Outcome**: `Success` | `Failed` | `SystemError`, exactly one per call
//! - **Handle**: `RequestId` of an in-flight request, used for cancellation
//! - **Environment**: transport, storage, notifier and domain collaborators
//!   injected as traits
//!
//! ## Example
//!
//! ```
//! use api_dispatch_core::{classify, Envelope, HttpMethod, RequestSpec};
//!
//! let spec = RequestSpec::new("/api/banner").with_method(HttpMethod::Get);
//! assert!(spec.should_request());
//!
//! let envelope = Envelope::decode(br#"{"status":true,"data":[1,2,3],"msg":"ok","code":"200"}"#);
//! let response = classify(envelope).map_err(|e| e.to_string())?;
//! assert_eq!(response.code, "200");
//! # Ok::<(), String>(())
//! ```

pub mod descriptor;
pub mod envelope;
pub mod environment;
pub mod id;
pub mod method;
pub mod multipart;
pub mod outcome;
pub mod params;
pub mod transport;

// Re-export main types for convenience
pub use descriptor::{Descriptor, Interceptor, RequestSpec, ResponseHandler};
pub use envelope::Envelope;
pub use environment::{
    DomainResolver, KeyValueStore, NoopNotifier, Notifier, ServerDomains, ServerEnvironment,
    StaticDomain, StorageError,
};
pub use id::{IdAllocator, OwnerId, RequestId};
pub use method::HttpMethod;
pub use multipart::{EncodingError, MultipartForm, ProgressFn, UploadPayload, UploadProgress};
pub use outcome::{classify, ApiResponse, Outcome, RequestError};
pub use params::{ParameterEncoding, Parameters};
pub use transport::{
    Headers, Transport, TransportError, TransportRequest, TransportResponse, UploadRequest,
};
