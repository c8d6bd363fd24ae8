//! Per-scheme transforms and their dispatch table.
//!
//! Each kind implements [`SchemeTransform`]; [`transformer_for`] is the one
//! place a kind is bound to its implementation.

mod mnrega;
mod pmay;
mod saubhagya;
mod startup;

use std::collections::BTreeMap;

use govdata_shared::{SchemeKind, ValidatedRecord};

use crate::TransformContext;

pub use mnrega::MnregaTransform;
pub use pmay::PmayTransform;
pub use saubhagya::SaubhagyaTransform;
pub use startup::StartupIndiaTransform;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Derived metrics computed for a single record.
pub type Derived = BTreeMap<&'static str, f64>;

/// Kind-specific derivation.
///
/// Implementations only add metrics; a metric whose inputs are missing or
/// undefined is left out of the returned map.
pub trait SchemeTransform: Send + Sync {
    /// Kind this transform handles.
    fn kind(&self) -> SchemeKind;

    /// Compute the derived metrics for one record.
    fn derive(&self, record: &ValidatedRecord, ctx: &TransformContext) -> Derived;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Look up the transform for a kind.
pub fn transformer_for(kind: SchemeKind) -> &'static dyn SchemeTransform {
    match kind {
        SchemeKind::Pmay => &PmayTransform,
        SchemeKind::Mnrega => &MnregaTransform,
        SchemeKind::StartupIndia => &StartupIndiaTransform,
        SchemeKind::Saubhagya => &SaubhagyaTransform,
    }
}

/// Read a field as `f64`, if present.
fn number(record: &ValidatedRecord, name: &str) -> Option<f64> {
    record.get(name).map(|v| v.as_f64())
}

/// Insert `value` under `name` only when it is defined.
fn put(derived: &mut Derived, name: &'static str, value: Option<f64>) {
    if let Some(v) = value {
        derived.insert(name, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_every_kind() {
        for kind in SchemeKind::ALL {
            assert_eq!(transformer_for(kind).kind(), kind);
        }
    }

    #[test]
    fn derived_names_match_schema() {
        use govdata_schema::schema_for;
        use govdata_shared::FieldValue;

        // A record with every field set to 10 and a population for its state
        // must produce exactly the derived columns its schema declares.
        let ctx = TransformContext::new([("XX", 100u64)].into_iter().collect());
        for kind in SchemeKind::ALL {
            let schema = schema_for(kind);
            let record = ValidatedRecord {
                kind,
                state_code: "XX".into(),
                state_name: "Test".into(),
                year: 2023,
                fields: schema
                    .fields
                    .iter()
                    .map(|f| (f.name, FieldValue::Int(10)))
                    .collect(),
            };
            let derived = transformer_for(kind).derive(&record, &ctx);
            let names: Vec<_> = derived.keys().copied().collect();
            assert_eq!(names, schema.derived, "{kind}");
        }
    }
}
