//! Error types for the dispatch runtime

use thiserror::Error;

/// Errors that abort a dispatch before any exchange starts.
///
/// These are configuration errors of the call site: they are logged, no
/// request is sent, and no outcome is delivered.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// No descriptor is bound to the api
    #[error("no request descriptor bound to this api")]
    MissingDescriptor,

    /// Callback mode was used without a response handler
    #[error("no response handler bound to this api")]
    MissingHandler,
}

/// Errors loading or validating configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {message}")]
    Read {
        /// File path
        path: String,
        /// Underlying error text
        message: String,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// An environment override could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },

    /// Validation failed
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
