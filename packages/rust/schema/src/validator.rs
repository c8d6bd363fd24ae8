//! Per-record schema enforcement.
//!
//! Records are checked independently and in input order. A record that fails
//! any rule is dropped and logged with its index; the rest of the batch
//! carries on.

use std::collections::BTreeMap;

use govdata_shared::{FieldValue, RawRecord, SchemeKind, ValidatedRecord};
use serde_json::Value;
use tracing::{debug, warn};

use crate::registry::{FieldType, STATE_CODE_MAX_LEN, SchemeSchema, YEAR_RANGE, schema_for};

/// Why a single record was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("missing required field '{0}'")]
    Missing(&'static str),

    #[error("required field '{0}' is empty")]
    Empty(&'static str),

    #[error("'{field}' is {len} characters long, max {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("year {0} out of realistic range")]
    YearOutOfRange(i64),

    #[error("'{field}' cannot be read as {expected}: {value}")]
    Coercion {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Validate a batch of raw records against `kind`'s schema.
///
/// Survivors keep their relative order.
pub fn validate(kind: SchemeKind, records: &[RawRecord]) -> Vec<ValidatedRecord> {
    let schema = schema_for(kind);
    let mut valid = Vec::with_capacity(records.len());

    for (index, raw) in records.iter().enumerate() {
        match validate_record(schema, raw) {
            Ok(record) => valid.push(record),
            Err(reason) => {
                warn!(%kind, index, %reason, "record failed validation, dropping");
            }
        }
    }

    debug!(
        %kind,
        received = records.len(),
        accepted = valid.len(),
        dropped = records.len() - valid.len(),
        "validation finished"
    );

    valid
}

/// Check one record against a schema and coerce it to typed fields.
pub fn validate_record(
    schema: &SchemeSchema,
    raw: &RawRecord,
) -> Result<ValidatedRecord, Rejection> {
    let state_code = required_text(raw, "state_code")?;
    let len = state_code.chars().count();
    if len > STATE_CODE_MAX_LEN {
        return Err(Rejection::TooLong {
            field: "state_code",
            len,
            max: STATE_CODE_MAX_LEN,
        });
    }

    let state_name = required_text(raw, "state_name")?;

    let year = match raw.get("year") {
        None | Some(Value::Null) => return Err(Rejection::Missing("year")),
        Some(value) => coerce_integer("year", value)?.ok_or(Rejection::Missing("year"))?,
    };
    if !YEAR_RANGE.contains(&year) {
        return Err(Rejection::YearOutOfRange(year));
    }

    let mut fields = BTreeMap::new();
    for spec in schema.fields {
        let Some(value) = raw.get(spec.name) else {
            continue;
        };
        let coerced = match spec.ty {
            FieldType::Integer => coerce_integer(spec.name, value)?.map(FieldValue::Int),
            FieldType::Float => coerce_float(spec.name, value)?.map(FieldValue::Float),
        };
        if let Some(v) = coerced {
            fields.insert(spec.name, v);
        }
    }

    Ok(ValidatedRecord {
        kind: schema.kind,
        state_code,
        state_name,
        // YEAR_RANGE keeps this well inside i32.
        year: year as i32,
        fields,
    })
}

/// Required text field. Numbers are read as their decimal text (`27` → `"27"`).
fn required_text(raw: &RawRecord, field: &'static str) -> Result<String, Rejection> {
    let text = match raw.get(field) {
        None | Some(Value::Null) => return Err(Rejection::Missing(field)),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => return Err(coercion(field, "text", other)),
    };
    if text.is_empty() {
        Err(Rejection::Empty(field))
    } else {
        Ok(text)
    }
}

/// Integer coercion. `Ok(None)` means the value is explicitly absent.
fn coerce_integer(field: &'static str, value: &Value) -> Result<Option<i64>, Rejection> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                n.as_f64()
                    .and_then(integral)
                    .map(Some)
                    .ok_or_else(|| coercion(field, "int", value))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .map(Some)
                .ok_or_else(|| coercion(field, "int", value))
        }
        other => Err(coercion(field, "int", other)),
    }
}

/// Float coercion. `Ok(None)` means the value is explicitly absent.
fn coerce_float(field: &'static str, value: &Value) -> Result<Option<f64>, Rejection> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| coercion(field, "float", value)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| coercion(field, "float", value))
        }
        other => Err(coercion(field, "float", other)),
    }
}

fn integral(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64).then_some(v as i64)
}

fn coercion(field: &'static str, expected: &'static str, value: &Value) -> Rejection {
    Rejection::Coercion {
        field,
        expected,
        value: value.to_string(),
    }
}
