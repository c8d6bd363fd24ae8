//! Employment guarantee: person-days per job card.

use govdata_shared::{SchemeKind, ValidatedRecord};

use super::{Derived, SchemeTransform, number, put};
use crate::TransformContext;
use crate::kpis::ratio;

pub struct MnregaTransform;

impl SchemeTransform for MnregaTransform {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Mnrega
    }

    fn derive(&self, record: &ValidatedRecord, _ctx: &TransformContext) -> Derived {
        let mut derived = Derived::new();
        put(
            &mut derived,
            "person_days_per_job_card",
            ratio(
                number(record, "person_days_generated"),
                number(record, "job_cards"),
            ),
        );
        derived
    }
}
