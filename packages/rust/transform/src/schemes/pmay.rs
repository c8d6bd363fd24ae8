//! Housing: completion rate per beneficiary.

use govdata_shared::{SchemeKind, ValidatedRecord};

use super::{Derived, SchemeTransform, number, put};
use crate::TransformContext;
use crate::kpis::ratio;

pub struct PmayTransform;

impl SchemeTransform for PmayTransform {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Pmay
    }

    fn derive(&self, record: &ValidatedRecord, _ctx: &TransformContext) -> Derived {
        let mut derived = Derived::new();
        put(
            &mut derived,
            "houses_per_beneficiary",
            ratio(
                number(record, "houses_completed"),
                number(record, "beneficiaries"),
            ),
        );
        derived
    }
}
