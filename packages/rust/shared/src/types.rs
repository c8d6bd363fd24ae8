//! Core domain types for scheme records as they move through the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GovDataError;

// ---------------------------------------------------------------------------
// SchemeKind
// ---------------------------------------------------------------------------

/// The closed catalog of public-sector schemes this system ingests.
///
/// The kind selects the validation contract, the transform, and the storage
/// table for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    /// Housing (PMAY).
    Pmay,
    /// Employment guarantee (MNREGA).
    Mnrega,
    /// Startup support (Startup India).
    StartupIndia,
    /// Household electrification (Saubhagya).
    Saubhagya,
}

impl SchemeKind {
    /// Every kind, in catalog order.
    pub const ALL: [SchemeKind; 4] = [
        SchemeKind::Pmay,
        SchemeKind::Mnrega,
        SchemeKind::StartupIndia,
        SchemeKind::Saubhagya,
    ];

    /// Stable key used in config files, mapping files, and table names.
    pub fn key(self) -> &'static str {
        match self {
            Self::Pmay => "pmay",
            Self::Mnrega => "mnrega",
            Self::StartupIndia => "startup_india",
            Self::Saubhagya => "saubhagya",
        }
    }

    /// Human-readable scheme category.
    pub fn category(self) -> &'static str {
        match self {
            Self::Pmay => "housing",
            Self::Mnrega => "employment-guarantee",
            Self::StartupIndia => "startup-support",
            Self::Saubhagya => "electrification",
        }
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SchemeKind {
    type Err = GovDataError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == needle)
            .ok_or_else(|| {
                GovDataError::parse(format!(
                    "unknown scheme '{s}' (expected one of: pmay, mnrega, startup_india, saubhagya)"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A typed numeric field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
}

impl FieldValue {
    /// Widen to `f64` for arithmetic.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An untyped record as received from the source API.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A raw record that satisfied its kind's schema and was coerced to typed fields.
///
/// Optional fields that were absent in the source are missing from `fields`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedRecord {
    pub kind: SchemeKind,
    pub state_code: String,
    pub state_name: String,
    pub year: i32,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl ValidatedRecord {
    /// Look up an optional field.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).copied()
    }
}

/// A validated record plus derived metrics.
///
/// A derived metric whose inputs were missing or whose denominator was zero
/// is absent from `derived`, never stored as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedRecord {
    pub kind: SchemeKind,
    pub state_code: String,
    pub state_name: String,
    pub year: i32,
    #[serde(flatten)]
    pub fields: BTreeMap<&'static str, FieldValue>,
    #[serde(flatten)]
    pub derived: BTreeMap<&'static str, f64>,
}

impl TransformedRecord {
    /// Look up a schema field or derived metric by column name.
    pub fn value(&self, column: &str) -> Option<FieldValue> {
        self.fields
            .get(column)
            .copied()
            .or_else(|| self.derived.get(column).map(|v| FieldValue::Float(*v)))
    }
}

// ---------------------------------------------------------------------------
// Pipeline run result
// ---------------------------------------------------------------------------

/// Final status of a single scheme pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every stage ran and the load (if any) committed.
    Completed,
    /// A stage degraded to empty (fetch failure, rollback, task failure).
    Degraded,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = GovDataError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "degraded" => Ok(Self::Degraded),
            other => Err(GovDataError::parse(format!("unknown run status '{other}'"))),
        }
    }
}

/// Summary handed back to whoever triggered a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    /// Scheme the run was for.
    pub kind: SchemeKind,
    /// Rows committed by the loader.
    pub ingested: usize,
    /// Raw records returned by the extractor.
    pub extracted: usize,
    /// Records that survived validation.
    pub validated: usize,
    /// Whether any stage degraded.
    pub status: RunStatus,
    /// Run-history identifier, when bookkeeping succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl PipelineRunResult {
    /// A run that produced nothing, e.g. because its task failed outright.
    pub fn degraded(kind: SchemeKind) -> Self {
        Self {
            kind,
            ingested: 0,
            extracted: 0,
            validated: 0,
            status: RunStatus::Degraded,
            run_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_kind_roundtrip() {
        for kind in SchemeKind::ALL {
            let parsed: SchemeKind = kind.to_string().parse().expect("parse kind");
            assert_eq!(parsed, kind);
        }
        assert_eq!(" PMAY ".parse::<SchemeKind>().unwrap(), SchemeKind::Pmay);
    }

    #[test]
    fn scheme_kind_rejects_unknown() {
        let err = "swachh_bharat".parse::<SchemeKind>().unwrap_err();
        assert!(err.to_string().contains("unknown scheme"));
    }

    #[test]
    fn scheme_kind_serializes_as_key() {
        let json = serde_json::to_string(&SchemeKind::StartupIndia).unwrap();
        assert_eq!(json, "\"startup_india\"");

        let mut map = BTreeMap::new();
        map.insert(SchemeKind::Mnrega, 0usize);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"mnrega":0}"#);
    }

    #[test]
    fn transformed_record_flattens_metrics() {
        let record = TransformedRecord {
            kind: SchemeKind::Pmay,
            state_code: "MH".into(),
            state_name: "Maharashtra".into(),
            year: 2023,
            fields: BTreeMap::from([
                ("beneficiaries", FieldValue::Int(100)),
                ("houses_completed", FieldValue::Int(50)),
            ]),
            derived: BTreeMap::from([("houses_per_beneficiary", 0.5)]),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["beneficiaries"], 100);
        assert_eq!(json["houses_per_beneficiary"], 0.5);
        assert_eq!(record.value("houses_per_beneficiary"), Some(FieldValue::Float(0.5)));
        assert_eq!(record.value("funds_released"), None);
    }

    #[test]
    fn run_result_serialization() {
        let result = PipelineRunResult::degraded(SchemeKind::Saubhagya);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""status":"degraded""#));
        assert!(!json.contains("run_id"));
        assert_eq!("completed".parse::<RunStatus>().unwrap(), RunStatus::Completed);
    }
}
