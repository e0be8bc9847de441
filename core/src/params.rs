//! Request parameters and their encodings.
//!
//! Parameters are a structured map of string keys to JSON values, so a call
//! site can send strings, numbers, booleans, nested maps, lists and nulls
//! without losing type information before the transport encodes them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request parameters: string keys mapped to structured values.
pub type Parameters = serde_json::Map<String, Value>;

/// How parameters are placed on the outgoing request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterEncoding {
    /// URL encoding: query string for `GET`/`HEAD`/`DELETE`, form body otherwise.
    #[default]
    Url,
    /// JSON request body.
    Json,
}

/// Flatten parameters into URL-encodable key/value pairs.
///
/// Nested maps use `key[sub]` and lists use `key[]`, recursively. Keys are
/// emitted in map order.
///
/// # Examples
///
/// ```
/// use api_dispatch_core::params::{url_pairs, Parameters};
/// use serde_json::json;
///
/// let params: Parameters = json!({"page": 2, "filter": {"tag": "new"}})
///     .as_object()
///     .cloned()
///     .unwrap_or_default();
///
/// assert_eq!(
///     url_pairs(&params),
///     vec![
///         ("filter[tag]".to_string(), "new".to_string()),
///         ("page".to_string(), "2".to_string()),
///     ]
/// );
/// ```
#[must_use]
pub fn url_pairs(parameters: &Parameters) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(parameters.len());
    for (key, value) in parameters {
        flatten_into(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten_into(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (sub, nested) in map {
                flatten_into(format!("{key}[{sub}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(format!("{key}[]"), item, pairs);
            }
        }
        scalar => pairs.push((key, scalar_text(scalar))),
    }
}

/// Render a value as a plain string.
///
/// Strings are returned without quotes, numbers and booleans via their display
/// form, null as the empty string, and lists/maps as compact JSON.
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn flattens_lists_with_brackets() {
        let pairs = url_pairs(&params(json!({"ids": [1, 2]})));
        assert_eq!(
            pairs,
            vec![
                ("ids[]".to_string(), "1".to_string()),
                ("ids[]".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn renders_scalars() {
        let pairs = url_pairs(&params(json!({"a": true, "b": null, "c": "x"})));
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "true".to_string()),
                ("b".to_string(), String::new()),
                ("c".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn nested_maps_inside_lists() {
        let pairs = url_pairs(&params(json!({"rows": [{"id": 9}]})));
        assert_eq!(pairs, vec![("rows[][id]".to_string(), "9".to_string())]);
    }

    #[test]
    fn scalar_text_keeps_structures_as_json() {
        assert_eq!(scalar_text(&json!([1, "a"])), r#"[1,"a"]"#);
        assert_eq!(scalar_text(&json!(1.5)), "1.5");
    }
}
