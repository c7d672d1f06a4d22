//! JSON decoding and extraction utilities for provider API responses.
//!
//! Bodies are decoded with [`decode`], which reports malformed input as a
//! Parser error. The `extract_*` helpers walk nested values with dot paths
//! where numeric segments index into arrays.
//!
//! # Examples
//!
//! ```rust
//! use hondana::net::json;
//! use serde_json::json;
//!
//! let data = json!({
//!     "data": {
//!         "attributes": {
//!             "title": {"en": "One Piece"},
//!             "altTitles": [{"ja": "ワンピース"}]
//!         }
//!     }
//! });
//!
//! assert_eq!(json::extract_str(&data, "data.attributes.title.en"), Some("One Piece"));
//! assert_eq!(json::extract_str(&data, "data.attributes.altTitles.0.ja"), Some("ワンピース"));
//! assert!(json::extract_path(&data, "data.missing").is_none());
//! ```

use crate::error::{Error, Result};
use crate::extract::{self, Path};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decodes a response body into `T`.
///
/// Syntax errors and missing required fields both surface as Parser errors
/// carrying the line and column reported by serde.
pub fn decode<T>(body: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|e| {
        let (line, column) = (e.line(), e.column());
        Error::from(e)
            .with_context("line", line)
            .with_context("column", column)
    })
}

/// Converts an already decoded value into `T`.
pub fn from_value<T>(value: Value) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(value).map_err(Into::into)
}

/// The value at a dot-separated path, or `None` if any step is missing.
pub fn extract_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    extract::walk(json, &Path::parse(path)).ok()
}

/// The value at `path`, deserialized into `T`.
pub fn extract_as<T>(json: &Value, path: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let value = extract::walk(json, &Path::parse(path))?;
    from_value(value.clone())
}

/// The array at `path`; empty when the path is missing or not an array.
pub fn extract_array<'a>(json: &'a Value, path: &str) -> &'a [Value] {
    extract_path(json, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// The string at `path`, with surrounding whitespace removed.
pub fn extract_str<'a>(json: &'a Value, path: &str) -> Option<&'a str> {
    extract_path(json, path)
        .and_then(Value::as_str)
        .map(str::trim)
}

/// A number at `path`, accepting numeric strings such as `"12.5"`.
pub fn extract_f64(json: &Value, path: &str) -> Option<f64> {
    match extract_path(json, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Category, Sentinel};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Envelope {
        total: u32,
        #[allow(dead_code)]
        data: Vec<Value>,
    }

    #[test]
    fn test_decode_reports_parser_errors() {
        let err = decode::<Envelope>(b"{\"total\": 3,").unwrap_err();
        assert_eq!(err.category(), Category::Parser);
        assert!(err.is(Sentinel::Parse));
        assert!(err.context().contains_key("line"));

        let err = decode::<Envelope>(b"{\"data\": []}").unwrap_err();
        assert_eq!(err.category(), Category::Parser);

        let ok = decode::<Envelope>(b"{\"total\": 3, \"data\": []}").unwrap();
        assert_eq!(ok.total, 3);
    }

    #[test]
    fn test_extract_helpers() {
        let data = json!({
            "result": "ok",
            "items": [{"chapter": "12.5"}, {"chapter": 7}],
        });
        assert_eq!(extract_array(&data, "items").len(), 2);
        assert!(extract_array(&data, "result").is_empty());
        assert_eq!(extract_f64(&data, "items.0.chapter"), Some(12.5));
        assert_eq!(extract_f64(&data, "items.1.chapter"), Some(7.0));
        assert_eq!(extract_str(&data, "result"), Some("ok"));
        assert!(extract_as::<u32>(&data, "items.5.chapter").is_err());
    }
}
