//! Startup support: startups per head of state population.

use govdata_shared::{SchemeKind, ValidatedRecord};

use super::{Derived, SchemeTransform, number, put};
use crate::TransformContext;
use crate::kpis::per_capita;

pub struct StartupIndiaTransform;

impl SchemeTransform for StartupIndiaTransform {
    fn kind(&self) -> SchemeKind {
        SchemeKind::StartupIndia
    }

    fn derive(&self, record: &ValidatedRecord, ctx: &TransformContext) -> Derived {
        let mut derived = Derived::new();
        put(
            &mut derived,
            "per_capita_startups",
            per_capita(
                number(record, "startups_supported"),
                ctx.population.get(&record.state_code),
            ),
        );
        derived
    }
}
