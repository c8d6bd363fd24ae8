//! Deterministic sample data for local development.
//!
//! Eight states over five years for every scheme kind. Values are spread
//! across realistic ranges with a fixed formula, so repeated seeding
//! produces identical rows.

use govdata_shared::{RawRecord, SchemeKind};
use serde_json::{Value, json};

/// States included in the sample set.
pub const SAMPLE_STATES: [(&str, &str); 8] = [
    ("MH", "Maharashtra"),
    ("UP", "Uttar Pradesh"),
    ("DL", "Delhi"),
    ("KA", "Karnataka"),
    ("TN", "Tamil Nadu"),
    ("GJ", "Gujarat"),
    ("RJ", "Rajasthan"),
    ("WB", "West Bengal"),
];

/// Reporting years included in the sample set.
pub const SAMPLE_YEARS: std::ops::RangeInclusive<i32> = 2020..=2024;

/// Raw records for one kind, as the source API would return them.
pub fn sample_records(kind: SchemeKind) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for (state_idx, (code, name)) in SAMPLE_STATES.iter().enumerate() {
        for year in SAMPLE_YEARS {
            let step = Step::new(state_idx as u64, (year - SAMPLE_YEARS.start()) as u64);
            let fields = match kind {
                SchemeKind::Pmay => json!({
                    "beneficiaries": step.int(10_000, 100_000, 7_919),
                    "houses_completed": step.int(5_000, 80_000, 6_151),
                    "funds_released": step.float(100.0, 1_000.0, 337),
                }),
                SchemeKind::Mnrega => json!({
                    "person_days_generated": step.int(100_000, 1_000_000, 104_729),
                    "job_cards": step.int(50_000, 500_000, 48_611),
                    "funds_spent": step.float(500.0, 5_000.0, 911),
                }),
                SchemeKind::StartupIndia => json!({
                    "startups_supported": step.int(100, 5_000, 613),
                    "funds_allocated": step.float(50.0, 500.0, 149),
                }),
                SchemeKind::Saubhagya => json!({
                    "households_electrified": step.int(10_000, 200_000, 19_997),
                    "percent_coverage": step.float(70.0, 99.0, 41),
                }),
            };

            let mut record = RawRecord::new();
            record.insert("state_code".into(), Value::from(*code));
            record.insert("state_name".into(), Value::from(*name));
            record.insert("year".into(), Value::from(year));
            if let Value::Object(fields) = fields {
                record.extend(fields);
            }
            records.push(record);
        }
    }
    records
}

/// Position in the state × year grid.
struct Step {
    n: u64,
}

impl Step {
    fn new(state_idx: u64, year_idx: u64) -> Self {
        Self {
            n: state_idx * 31 + year_idx * 7 + 1,
        }
    }

    /// Integer in `[lo, hi)`; `stride` should be coprime with the span.
    fn int(&self, lo: u64, hi: u64, stride: u64) -> u64 {
        lo + (self.n * stride) % (hi - lo)
    }

    /// Float in `[lo, hi)` rounded to two decimals.
    fn float(&self, lo: f64, hi: f64, stride: u64) -> f64 {
        let fraction = ((self.n * stride) % 10_000) as f64 / 10_000.0;
        ((lo + fraction * (hi - lo)) * 100.0).round() / 100.0
    }
}
