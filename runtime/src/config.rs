//! Configuration for the dispatch runtime
//!
//! Values come from defaults, an optional TOML file, and `API_DISPATCH_*`
//! environment variables, in that order of precedence (later wins).
//!
//! # Example
//!
//! ```no_run
//! use api_dispatch_runtime::config::DispatchConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Reads API_DISPATCH_CONFIG (TOML path) and API_DISPATCH_* overrides
//! let config = DispatchConfig::from_env()?;
//!
//! println!("Session key: {}", config.session_key);
//! println!("Timeout: {:?}", config.request_timeout());
//! # Ok(())
//! # }
//! ```

use crate::error::ConfigError;
use api_dispatch_core::multipart::{DEFAULT_FIELD_NAME, DEFAULT_FILE_NAME, DEFAULT_MIME_TYPE};
use api_dispatch_core::outcome::SYSTEM_ERROR_CODE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming a TOML configuration file.
pub const CONFIG_PATH_VAR: &str = "API_DISPATCH_CONFIG";

/// Storage key the session token set is persisted under.
pub const DEFAULT_SESSION_KEY: &str = "cookieStorage";

/// Dispatch runtime configuration.
///
/// # Default Values
///
/// - `session_key`: `"cookieStorage"`
/// - `request_timeout_secs`: 30
/// - `max_logged_body_bytes`: 4096
/// - `cancelled_message`: `"request cancelled"`
/// - `cancelled_code`: `"0"`
/// - `upload_field_name`: `"upload"`
/// - `upload_file_name`: `"file.jpg"`
/// - `upload_mime_type`: `"image/jpg"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Storage key for the session token set
    pub session_key: String,
    /// Transport timeout in seconds
    pub request_timeout_secs: u64,
    /// Bodies longer than this are truncated in request traces
    pub max_logged_body_bytes: usize,
    /// Message of the interception sentinel
    pub cancelled_message: String,
    /// Code of the interception sentinel
    pub cancelled_code: String,
    /// Default form field name for uploads
    pub upload_field_name: String,
    /// Default file name for uploads
    pub upload_file_name: String,
    /// Default MIME type for uploads
    pub upload_mime_type: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            session_key: DEFAULT_SESSION_KEY.to_string(),
            request_timeout_secs: 30,
            max_logged_body_bytes: 4096,
            cancelled_message: "request cancelled".to_string(),
            cancelled_code: SYSTEM_ERROR_CODE.to_string(),
            upload_field_name: DEFAULT_FIELD_NAME.to_string(),
            upload_file_name: DEFAULT_FILE_NAME.to_string(),
            upload_mime_type: DEFAULT_MIME_TYPE.to_string(),
        }
    }
}

impl DispatchConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be read or parsed, an override
    /// cannot be parsed, or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve environment variables.
    ///
    /// # Errors
    ///
    /// Same as [`DispatchConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(value) = lookup("API_DISPATCH_SESSION_KEY") {
            config.session_key = value;
        }
        if let Some(value) = lookup("API_DISPATCH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("API_DISPATCH_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("API_DISPATCH_MAX_LOGGED_BODY_BYTES") {
            config.max_logged_body_bytes =
                parse_var("API_DISPATCH_MAX_LOGGED_BODY_BYTES", &value)?;
        }
        for (key, field) in [
            ("API_DISPATCH_CANCELLED_MESSAGE", &mut config.cancelled_message),
            ("API_DISPATCH_CANCELLED_CODE", &mut config.cancelled_code),
            ("API_DISPATCH_UPLOAD_FIELD_NAME", &mut config.upload_field_name),
            ("API_DISPATCH_UPLOAD_FILE_NAME", &mut config.upload_file_name),
            ("API_DISPATCH_UPLOAD_MIME_TYPE", &mut config.upload_mime_type),
        ] {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid TOML or validation fails.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "session_key must not be empty".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.upload_field_name.is_empty() || self.upload_file_name.is_empty() {
            return Err(ConfigError::Validation(
                "upload field and file names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Transport timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = DispatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session_key, "cookieStorage");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = DispatchConfig::from_lookup(lookup(&[
            ("API_DISPATCH_SESSION_KEY", "jar"),
            ("API_DISPATCH_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .expect("valid overrides");
        assert_eq!(config.session_key, "jar");
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn env_overrides_sentinel_and_upload_defaults() {
        let config = DispatchConfig::from_lookup(lookup(&[
            ("API_DISPATCH_CANCELLED_MESSAGE", "skipped"),
            ("API_DISPATCH_CANCELLED_CODE", "-1"),
            ("API_DISPATCH_UPLOAD_FIELD_NAME", "avatar"),
            ("API_DISPATCH_UPLOAD_FILE_NAME", "avatar.png"),
            ("API_DISPATCH_UPLOAD_MIME_TYPE", "image/png"),
        ]))
        .expect("valid overrides");
        assert_eq!(config.cancelled_message, "skipped");
        assert_eq!(config.cancelled_code, "-1");
        assert_eq!(config.upload_field_name, "avatar");
        assert_eq!(config.upload_file_name, "avatar.png");
        assert_eq!(config.upload_mime_type, "image/png");
        assert_eq!(config.session_key, DEFAULT_SESSION_KEY);
    }

    #[test]
    fn empty_upload_name_from_env_fails_validation() {
        let result =
            DispatchConfig::from_lookup(lookup(&[("API_DISPATCH_UPLOAD_FIELD_NAME", "")]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn bad_number_is_rejected() {
        let result = DispatchConfig::from_lookup(lookup(&[(
            "API_DISPATCH_REQUEST_TIMEOUT_SECS",
            "soon",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn zero_timeout_fails_validation() {
        let result = DispatchConfig::from_toml_str("request_timeout_secs = 0");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn toml_file_then_env() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "session_key = \"from-file\"\nmax_logged_body_bytes = 16")
            .expect("write config");
        let path = file.path().display().to_string();

        let config = DispatchConfig::from_lookup(lookup(&[
            (CONFIG_PATH_VAR, path.as_str()),
            ("API_DISPATCH_MAX_LOGGED_BODY_BYTES", "32"),
        ]))
        .expect("valid config");

        assert_eq!(config.session_key, "from-file");
        assert_eq!(config.max_logged_body_bytes, 32);
        assert_eq!(config.cancelled_message, "request cancelled");
    }
}
