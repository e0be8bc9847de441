//! Environment module - collaborator traits
//!
//! All external dependencies of the dispatch layer other than the transport
//! are abstracted behind these traits and injected at construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error from durable storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("storage error for key {key:?}: {message}")]
pub struct StorageError {
    /// Key being accessed
    pub key: String,
    /// Underlying error text
    pub message: String,
}

/// Durable key/value storage.
///
/// Writes are last-write-wins; no transactions.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be written.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;
}

/// Status display.
pub trait Notifier: Send + Sync {
    /// Show a success message.
    fn show_success(&self, message: &str);

    /// Show an error message.
    fn show_error(&self, message: &str);
}

/// Notifier that shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn show_success(&self, _message: &str) {}

    fn show_error(&self, _message: &str) {}
}

/// Resolves the base domain that relative routes are appended to.
pub trait DomainResolver: Send + Sync {
    /// Base domain for API routes, e.g. `https://api.example.com`.
    fn base_domain(&self) -> String;

    /// Base domain for image routes.
    fn image_domain(&self) -> String {
        self.base_domain()
    }
}

/// A fixed base domain.
///
/// # Examples
///
/// ```
/// use api_dispatch_core::environment::{DomainResolver, StaticDomain};
///
/// let domain = StaticDomain::new("https://api.example.com");
/// assert_eq!(domain.base_domain(), "https://api.example.com");
/// assert_eq!(domain.image_domain(), "https://api.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticDomain(String);

impl StaticDomain {
    /// Create a fixed domain.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self(domain.into())
    }
}

impl DomainResolver for StaticDomain {
    fn base_domain(&self) -> String {
        self.0.clone()
    }
}

/// Which server set a build talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerEnvironment {
    /// Development servers
    #[default]
    Development,
    /// Distribution (production) servers
    Distribution,
}

impl fmt::Display for ServerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Distribution => write!(f, "distribution"),
        }
    }
}

/// Development and distribution domains, selected by environment.
///
/// # Examples
///
/// ```
/// use api_dispatch_core::environment::{DomainResolver, ServerDomains, ServerEnvironment};
///
/// let domains = ServerDomains {
///     environment: ServerEnvironment::Distribution,
///     develop: "https://dev.example.com".to_string(),
///     develop_image: "https://img.dev.example.com".to_string(),
///     distribution: "https://api.example.com".to_string(),
///     distribution_image: "https://img.example.com".to_string(),
/// };
///
/// assert_eq!(domains.base_domain(), "https://api.example.com");
/// assert_eq!(domains.image_domain(), "https://img.example.com");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDomains {
    /// Selected environment
    #[serde(default)]
    pub environment: ServerEnvironment,
    /// Development API domain
    pub develop: String,
    /// Development image domain
    #[serde(default)]
    pub develop_image: String,
    /// Distribution API domain
    pub distribution: String,
    /// Distribution image domain
    #[serde(default)]
    pub distribution_image: String,
}

impl DomainResolver for ServerDomains {
    fn base_domain(&self) -> String {
        match self.environment {
            ServerEnvironment::Development => self.develop.clone(),
            ServerEnvironment::Distribution => self.distribution.clone(),
        }
    }

    fn image_domain(&self) -> String {
        let image = match self.environment {
            ServerEnvironment::Development => &self.develop_image,
            ServerEnvironment::Distribution => &self.distribution_image,
        };
        if image.is_empty() {
            self.base_domain()
        } else {
            image.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;

    #[test]
    fn image_domain_falls_back_to_base() {
        let domains = ServerDomains {
            develop: "http://localhost:8080".to_string(),
            ..ServerDomains::default()
        };
        assert_eq!(domains.base_domain(), "http://localhost:8080");
        assert_eq!(domains.image_domain(), "http://localhost:8080");
    }

    #[test]
    fn server_domains_from_json() {
        let domains: ServerDomains = serde_json::from_str(
            r#"{"environment":"distribution","develop":"d","distribution":"p"}"#,
        )
        .expect("valid domains");
        assert_eq!(domains.base_domain(), "p");
    }
}
