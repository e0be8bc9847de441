//! HTTP request methods.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `HttpMethod` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid HTTP method: {0}")]
pub struct ParseMethodError(String);

/// HTTP request method.
///
/// A closed set; `Post` is the default for descriptors that do not pick one.
///
/// # Examples
///
/// ```
/// use api_dispatch_core::method::HttpMethod;
///
/// assert_eq!(HttpMethod::default(), HttpMethod::Post);
/// assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
/// assert_eq!(HttpMethod::Patch.as_str(), "PATCH");
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `OPTIONS`
    Options,
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `POST`
    #[default]
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `TRACE`
    Trace,
    /// `CONNECT`
    Connect,
}

impl HttpMethod {
    /// Every method, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Options,
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Trace,
        Self::Connect,
    ];

    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }

    /// Whether URL-encoded parameters go into the query string rather than
    /// a form body.
    #[must_use]
    pub const fn encodes_in_query(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseMethodError(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;

    #[test]
    fn parses_every_wire_name() {
        for method in HttpMethod::ALL {
            assert_eq!(method.as_str().parse::<HttpMethod>(), Ok(method));
        }
    }

    #[test]
    fn rejects_unknown_method() {
        assert!("FETCH".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn query_encoding_methods() {
        assert!(HttpMethod::Get.encodes_in_query());
        assert!(HttpMethod::Delete.encodes_in_query());
        assert!(!HttpMethod::Post.encodes_in_query());
        assert!(!HttpMethod::Patch.encodes_in_query());
    }
}
