//! Payload-shape normalization.
//!
//! The source API wraps its rows inconsistently: under `records`, under
//! `data`, or not at all. Precedence is `records`, then `data`, then a bare
//! list. A wrapper key only counts when it holds an array.

use govdata_shared::{GovDataError, RawRecord, Result};
use serde_json::Value;
use tracing::warn;

/// Pull the record list out of a decoded response body.
///
/// Returns a [`GovDataError::Shape`] if the payload matches no known
/// convention. List entries that are not JSON objects are skipped.
pub fn records_from_payload(payload: Value) -> Result<Vec<RawRecord>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            let keys: Vec<String> = obj.keys().cloned().collect();
            match obj.remove("records") {
                Some(Value::Array(items)) => items,
                _ => match obj.remove("data") {
                    Some(Value::Array(items)) => items,
                    _ => return Err(GovDataError::shape(format!("object keys={keys:?}"))),
                },
            }
        }
        other => {
            return Err(GovDataError::shape(format!(
                "top-level {} value",
                json_type(&other)
            )));
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => records.push(map),
            other => {
                warn!(index, found = json_type(&other), "skipping non-object entry in record list");
            }
        }
    }
    Ok(records)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
