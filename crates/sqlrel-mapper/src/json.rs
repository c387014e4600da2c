//! Decoding of aggregated HasMany columns.
//!
//! A HasMany column holds the JSON array built by the aggregation subquery.
//! Drivers hand it over as text, raw bytes, or an already decoded document.
//! NULL (or the text `null`) means "no collection"; `[]` means "an empty one".

use sqlrel_core::error::{Error, Result};
use sqlrel_core::value::Value;

/// Decode the HasMany cell named `column`.
///
/// Returns `None` for an absent cell, SQL NULL, an empty string or JSON
/// `null`; otherwise the array elements in order.
pub fn decode_has_many(column: &str, cell: Option<&Value>) -> Result<Option<Vec<serde_json::Value>>> {
    match cell {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(text)) => decode_bytes(column, text.as_bytes()),
        Some(Value::Bytes(bytes)) => decode_bytes(column, bytes),
        Some(Value::Json(json)) => decode_json(column, json),
        Some(other) => Err(Error::decode(
            column,
            format!("expected a JSON array, got a {} value", other.type_name()),
            None,
        )),
    }
}

/// Interpret an already decoded JSON value as a HasMany collection.
///
/// A string is decoded once more, for drivers that double-encode JSON.
pub fn decode_json(column: &str, json: &serde_json::Value) -> Result<Option<Vec<serde_json::Value>>> {
    match json {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(items) => Ok(Some(items.clone())),
        serde_json::Value::String(text) => decode_bytes(column, text.as_bytes()),
        other => Err(Error::decode(
            column,
            format!("expected a JSON array, got {other}"),
            None,
        )),
    }
}

fn decode_bytes(column: &str, bytes: &[u8]) -> Result<Option<Vec<serde_json::Value>>> {
    let trimmed = bytes.trim_ascii();
    if trimmed.is_empty() || trimmed == b"null" {
        return Ok(None);
    }
    let parsed: serde_json::Value = serde_json::from_slice(trimmed)
        .map_err(|e| Error::decode(column, "malformed JSON", Some(e)))?;
    match parsed {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(items) => Ok(Some(items)),
        other => Err(Error::decode(
            column,
            format!("expected a JSON array, got {other}"),
            None,
        )),
    }
}

/// Returns `true` if every scalar member of a JSON object is null or zero.
///
/// Nested objects and arrays belong to deeper relations (a nested HasMany
/// always reports `[]`), so they do not count.
pub fn json_own_null(object: &serde_json::Map<String, serde_json::Value>) -> bool {
    object
        .values()
        .filter(|v| !v.is_object() && !v.is_array())
        .all(|v| Value::from_json(v).is_zero())
}
