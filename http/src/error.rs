//! Error types for the reqwest transport

use api_dispatch_core::transport::TransportError;
use thiserror::Error;

/// Errors that can occur when constructing the transport
#[derive(Debug, Error)]
pub enum HttpError {
    /// The underlying HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Map a reqwest failure onto the transport error taxonomy.
pub(crate) fn transport_error(error: &reqwest::Error) -> TransportError {
    let message = error.to_string();
    if error.is_timeout() {
        TransportError::Timeout(message)
    } else if error.is_builder() {
        TransportError::Encoding(message)
    } else if error.is_body() || error.is_decode() {
        TransportError::Body(message)
    } else {
        TransportError::Connection(message)
    }
}
