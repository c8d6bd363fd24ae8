//! Electrification. No derived metrics; records pass through numeric
//! normalization only.

use govdata_shared::{SchemeKind, ValidatedRecord};

use super::{Derived, SchemeTransform};
use crate::TransformContext;

pub struct SaubhagyaTransform;

impl SchemeTransform for SaubhagyaTransform {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Saubhagya
    }

    fn derive(&self, _record: &ValidatedRecord, _ctx: &TransformContext) -> Derived {
        Derived::new()
    }
}
