//! Numeric normalization and derived metrics for validated records.

pub mod kpis;
pub mod population;
pub mod schemes;

use govdata_shared::{SchemeKind, TransformedRecord, ValidatedRecord};
use tracing::{debug, warn};

pub use kpis::{growth_rate, per_capita, ratio};
pub use population::PopulationMap;
pub use schemes::{Derived, SchemeTransform, transformer_for};

/// Caller-supplied inputs shared by every transform.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    /// State populations; empty disables per-capita metrics.
    pub population: PopulationMap,
}

impl TransformContext {
    pub fn new(population: PopulationMap) -> Self {
        Self { population }
    }
}

/// Transform a batch of validated records of one kind.
///
/// Output order matches input order. Non-finite numeric values become absent
/// before any metric is derived from them.
pub fn transform(
    kind: SchemeKind,
    records: Vec<ValidatedRecord>,
    ctx: &TransformContext,
) -> Vec<TransformedRecord> {
    if records.is_empty() {
        return Vec::new();
    }

    let transformer = transformer_for(kind);
    let out: Vec<TransformedRecord> = records
        .into_iter()
        .map(|record| {
            let record = normalize(record);
            let derived = transformer.derive(&record, ctx);
            TransformedRecord {
                kind: record.kind,
                state_code: record.state_code,
                state_name: record.state_name,
                year: record.year,
                fields: record.fields,
                derived,
            }
        })
        .collect();

    debug!(
        %kind,
        count = out.len(),
        with_metrics = out.iter().filter(|r| !r.derived.is_empty()).count(),
        "transform finished"
    );
    out
}

fn normalize(mut record: ValidatedRecord) -> ValidatedRecord {
    record.fields.retain(|name, value| {
        let finite = value.as_f64().is_finite();
        if !finite {
            warn!(
                kind = %record.kind,
                state_code = %record.state_code,
                year = record.year,
                field = *name,
                "non-finite value, treating as absent"
            );
        }
        finite
    });
    record
}
