//! Classified results of a dispatched request.

use crate::envelope::Envelope;
use serde_json::Value;
use thiserror::Error;

/// Code reported for errors that carry no business code.
pub const SYSTEM_ERROR_CODE: &str = "0";

/// Payload of a successful request (`status == true`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApiResponse {
    /// Envelope payload
    pub data: Option<Value>,
    /// Envelope message
    pub message: String,
    /// Envelope business code
    pub code: String,
}

/// Failure of a dispatched request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    /// The backend answered with `status == false` (or the request was
    /// intercepted before it was sent)
    #[error("request failed ({code}): {message}")]
    Failed {
        /// Envelope message
        message: String,
        /// Envelope business code
        code: String,
    },

    /// Transport-level failure: connection, timeout, framing, or a request
    /// body that could not be encoded
    #[error("system error: {message}")]
    SystemError {
        /// Underlying error text
        message: String,
    },
}

impl RequestError {
    /// Create a business failure.
    #[must_use]
    pub fn failed(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create a transport-level failure.
    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::SystemError {
            message: message.into(),
        }
    }

    /// Message carried by the error.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message, .. } | Self::SystemError { message } => message,
        }
    }

    /// Business code; `"0"` for system errors.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Failed { code, .. } => code,
            Self::SystemError { .. } => SYSTEM_ERROR_CODE,
        }
    }
}

/// Classify a decoded envelope into a success or a business failure.
///
/// # Errors
///
/// Returns `RequestError::Failed` carrying the envelope message and code when
/// `status` is `false`.
pub fn classify(envelope: Envelope) -> Result<ApiResponse, RequestError> {
    if envelope.status {
        Ok(ApiResponse {
            data: envelope.data,
            message: envelope.message,
            code: envelope.code,
        })
    } else {
        Err(RequestError::Failed {
            message: envelope.message,
            code: envelope.code,
        })
    }
}

/// Terminal result of one dispatched request; exactly one per call.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Envelope status was `true`
    Success(ApiResponse),
    /// Envelope status was `false`, or the request was intercepted
    Failed {
        /// Envelope message
        message: String,
        /// Envelope business code
        code: String,
    },
    /// Transport-level failure
    SystemError {
        /// Underlying error text
        message: String,
    },
}

impl Outcome {
    /// Whether this is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert back into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the failure variants as `RequestError`.
    pub fn into_result(self) -> Result<ApiResponse, RequestError> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Failed { message, code } => Err(RequestError::Failed { message, code }),
            Self::SystemError { message } => Err(RequestError::SystemError { message }),
        }
    }
}

impl From<Result<ApiResponse, RequestError>> for Outcome {
    fn from(result: Result<ApiResponse, RequestError>) -> Self {
        match result {
            Ok(response) => Self::Success(response),
            Err(RequestError::Failed { message, code }) => Self::Failed { message, code },
            Err(RequestError::SystemError { message }) => Self::SystemError { message },
        }
    }
}
