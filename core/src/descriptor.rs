//! Request descriptors and the callback protocol.
//!
//! A call site describes its request declaratively with a [`RequestSpec`]
//! (returned fresh from a [`Descriptor`] on every dispatch) and receives
//! results through a [`ResponseHandler`].

use crate::method::HttpMethod;
use crate::outcome::{ApiResponse, RequestError};
use crate::params::{ParameterEncoding, Parameters};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pre-flight predicate; returning `false` suppresses the request.
pub type Interceptor = Arc<dyn Fn(&RequestSpec) -> bool + Send + Sync>;

/// Per-call request policy.
///
/// # Default Values
///
/// - `method`: `POST`
/// - `parameters`: none
/// - `headers`: none
/// - `encoding`: URL encoding
/// - `show_message`: `true`
/// - `should_request`: none (always request)
///
/// # Examples
///
/// ```
/// use api_dispatch_core::descriptor::RequestSpec;
/// use api_dispatch_core::method::HttpMethod;
///
/// let spec = RequestSpec::new("/api/banner")
///     .with_method(HttpMethod::Get)
///     .with_header("X-Client", "ios")
///     .with_show_message(false);
///
/// assert_eq!(spec.route, "/api/banner");
/// assert!(spec.should_request());
/// ```
#[derive(Clone)]
pub struct RequestSpec {
    /// HTTP method
    pub method: HttpMethod,
    /// Path appended to the base domain
    pub route: String,
    /// Parameters, if any
    pub parameters: Option<Parameters>,
    /// Extra request headers
    pub headers: BTreeMap<String, String>,
    /// Parameter encoding
    pub encoding: ParameterEncoding,
    /// Whether a non-empty success message is shown to the user
    pub show_message: bool,
    /// Optional interception predicate
    pub should_request: Option<Interceptor>,
}

impl RequestSpec {
    /// Create a spec for `route` with default policy.
    #[must_use]
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::default(),
            route: route.into(),
            parameters: None,
            headers: BTreeMap::new(),
            encoding: ParameterEncoding::default(),
            show_message: true,
            should_request: None,
        }
    }

    /// Builder: Set method
    #[must_use]
    pub const fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Builder: Set parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Builder: Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Builder: Set parameter encoding
    #[must_use]
    pub const fn with_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Builder: Set whether success messages are shown
    #[must_use]
    pub const fn with_show_message(mut self, show_message: bool) -> Self {
        self.show_message = show_message;
        self
    }

    /// Builder: Set the interception predicate
    #[must_use]
    pub fn with_interceptor<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Self) -> bool + Send + Sync + 'static,
    {
        self.should_request = Some(Arc::new(predicate));
        self
    }

    /// Evaluate the interception predicate.
    #[must_use]
    pub fn should_request(&self) -> bool {
        self.should_request
            .as_ref()
            .is_none_or(|predicate| predicate(self))
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("method", &self.method)
            .field("route", &self.route)
            .field("parameters", &self.parameters)
            .field("headers", &self.headers)
            .field("encoding", &self.encoding)
            .field("show_message", &self.show_message)
            .field("should_request", &self.should_request.is_some())
            .finish()
    }
}

/// Source of the request policy for a call site.
///
/// `describe` is evaluated once per dispatch; the returned spec is not
/// mutated for the duration of the call.
pub trait Descriptor: Send + Sync {
    /// Describe the next request.
    fn describe(&self) -> RequestSpec;
}

impl Descriptor for RequestSpec {
    fn describe(&self) -> RequestSpec {
        self.clone()
    }
}

impl<F> Descriptor for F
where
    F: Fn() -> RequestSpec + Send + Sync,
{
    fn describe(&self) -> RequestSpec {
        self()
    }
}

/// Callback protocol of a call site.
pub trait ResponseHandler: Send + Sync {
    /// Called once with the payload of a successful request.
    fn on_success(&self, response: &ApiResponse);

    /// Called once with the failure of a request.
    fn on_failure(&self, _error: &RequestError) {}

    /// Side channel: called with the envelope business code of every decoded
    /// response, before the terminal callback.
    fn on_code(&self, _code: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn defaults_are_explicit() {
        let spec = RequestSpec::new("/x");
        assert_eq!(spec.method, HttpMethod::Post);
        assert!(spec.parameters.is_none());
        assert!(spec.headers.is_empty());
        assert!(spec.show_message);
        assert!(spec.should_request());
    }

    #[test]
    fn interceptor_sees_the_spec() {
        let spec = RequestSpec::new("/locked").with_interceptor(|spec| spec.route != "/locked");
        assert!(!spec.should_request());
    }

    #[test]
    fn closure_descriptor_is_evaluated_per_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let descriptor = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            RequestSpec::new(format!("/page/{n}"))
        };

        assert_eq!(descriptor.describe().route, "/page/0");
        assert_eq!(descriptor.describe().route, "/page/1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
