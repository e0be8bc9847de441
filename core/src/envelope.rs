//! Response envelope and its tolerant decoder.
//!
//! Every response body of the backend is wrapped in an envelope:
//!
//! ```json
//! { "status": true, "data": [1, 2, 3], "msg": "ok", "code": "200" }
//! ```
//!
//! All fields are optional on the wire. Decoding never fails: a missing or
//! wrongly-typed field falls back to its default (`false`, no data, `""`, `""`)
//! and a body that is not a JSON object decodes to the default envelope.

use serde_json::Value;

/// Wire key of the success flag.
pub const STATUS_KEY: &str = "status";
/// Wire key of the payload.
pub const DATA_KEY: &str = "data";
/// Wire key of the human-readable message.
pub const MESSAGE_KEY: &str = "msg";
/// Wire key of the business code.
pub const CODE_KEY: &str = "code";

/// Decoded response envelope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Business-level success flag
    pub status: bool,
    /// Payload, absent when missing or `null`
    pub data: Option<Value>,
    /// Message for display
    pub message: String,
    /// Business code, meaningful independently of `status`
    pub code: String,
}

impl Envelope {
    /// Decode a raw response body.
    ///
    /// # Examples
    ///
    /// ```
    /// use api_dispatch_core::envelope::Envelope;
    ///
    /// let envelope = Envelope::decode(br#"{"status":true,"data":[1,2,3],"msg":"ok","code":"200"}"#);
    /// assert!(envelope.status);
    /// assert_eq!(envelope.message, "ok");
    /// assert_eq!(envelope.code, "200");
    ///
    /// let garbage = Envelope::decode(b"<html>bad gateway</html>");
    /// assert_eq!(garbage, Envelope::default());
    /// ```
    #[must_use]
    pub fn decode(body: &[u8]) -> Self {
        serde_json::from_slice::<Value>(body)
            .map(|value| Self::from_value(&value))
            .unwrap_or_default()
    }

    /// Build an envelope from an already-parsed JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };

        Self {
            status: object.get(STATUS_KEY).and_then(Value::as_bool).unwrap_or(false),
            data: object.get(DATA_KEY).filter(|data| !data.is_null()).cloned(),
            message: text(MESSAGE_KEY),
            code: text(CODE_KEY),
        }
    }
}
