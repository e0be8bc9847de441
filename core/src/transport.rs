//! HTTP transport collaborator.
//!
//! The dispatch layer does not speak HTTP itself. It hands fully resolved
//! requests to a [`Transport`] and receives raw responses back. Dropping the
//! returned future aborts the exchange, which is how cancellation reaches the
//! transport.

use crate::method::HttpMethod;
use crate::multipart::{MultipartForm, ProgressFn};
use crate::params::{ParameterEncoding, Parameters};
use futures::future::BoxFuture;
use thiserror::Error;

/// Header list, in insertion order. Names may repeat.
pub type Headers = Vec<(String, String)>;

/// A fully resolved request.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// Absolute URL (base domain + route)
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Request headers, including replayed session cookies
    pub headers: Headers,
    /// Parameters to encode
    pub parameters: Option<Parameters>,
    /// Parameter encoding
    pub encoding: ParameterEncoding,
}

impl TransportRequest {
    /// First value of header `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A resolved multipart upload.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Absolute URL (base domain + route)
    pub url: String,
    /// Request headers, including replayed session cookies
    pub headers: Headers,
    /// Validated multipart body
    pub form: MultipartForm,
    /// Optional progress side channel
    pub progress: Option<ProgressFn>,
}

/// Raw response of a completed exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Raw body
    pub body: Vec<u8>,
    /// Encoded request body as sent, for tracing
    pub request_body: Option<String>,
}

impl TransportResponse {
    /// Create a `200 OK` response with the given body.
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
            request_body: None,
        }
    }

    /// Builder: Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// All values of header `name` (case-insensitive).
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport-level failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established or was reset
    #[error("connection failed: {0}")]
    Connection(String),

    /// The exchange exceeded its deadline
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The request could not be encoded before sending
    #[error("request encoding failed: {0}")]
    Encoding(String),

    /// The response could not be read
    #[error("response read failed: {0}")]
    Body(String),
}

/// HTTP transport.
///
/// Implementations must be cancel-safe: dropping a returned future aborts the
/// underlying exchange.
pub trait Transport: Send + Sync {
    /// Send a request and return its raw response.
    fn send(
        &self,
        request: TransportRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;

    /// Send a multipart upload and return its raw response.
    fn upload(
        &self,
        request: UploadRequest,
    ) -> BoxFuture<'static, Result<TransportResponse, TransportError>>;
}

fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let response = TransportResponse::ok("{}")
            .with_header("Set-Cookie", "a=1")
            .with_header("set-cookie", "b=2");
        let values: Vec<_> = response.header_values("SET-COOKIE").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn request_header_lookup() {
        let request = TransportRequest {
            url: "https://api.example.com/x".to_string(),
            method: HttpMethod::Get,
            headers: vec![("Cookie".to_string(), "sid=1".to_string())],
            parameters: None,
            encoding: ParameterEncoding::Url,
        };
        assert_eq!(request.header("cookie"), Some("sid=1"));
        assert_eq!(request.header("accept"), None);
    }
}
