//! Static validation contracts, one per [`SchemeKind`].
//!
//! Every kind shares the base contract (`state_code`, `state_name`, `year`)
//! and adds its own optional numeric fields. Storage tables are generated
//! from these entries, so adding a kind means adding one entry here.

use std::ops::RangeInclusive;

use govdata_shared::SchemeKind;

/// Maximum length of `state_code`, in characters.
pub const STATE_CODE_MAX_LEN: usize = 10;

/// Accepted reporting years.
pub const YEAR_RANGE: RangeInclusive<i64> = 2000..=2100;

/// Base fields every record must carry, in column order.
pub const BASE_FIELDS: [&str; 3] = ["state_code", "state_name", "year"];

/// Numeric type of an optional scheme field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
}

impl FieldType {
    /// SQLite column affinity.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "REAL",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Float => "float",
        }
    }
}

/// An optional, kind-specific numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn int(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        ty: FieldType::Integer,
    }
}

const fn float(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        ty: FieldType::Float,
    }
}

/// Contract for one scheme kind.
#[derive(Debug)]
pub struct SchemeSchema {
    pub kind: SchemeKind,
    /// Optional numeric fields, in column order.
    pub fields: &'static [FieldSpec],
    /// Derived metric columns produced by the kind's transform.
    pub derived: &'static [&'static str],
}

impl SchemeSchema {
    /// Storage table for this kind.
    pub fn table(&self) -> &'static str {
        self.kind.key()
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Scheme-specific columns (fields, then derived metrics).
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .map(|f| f.name)
            .chain(self.derived.iter().copied())
    }
}

static PMAY: SchemeSchema = SchemeSchema {
    kind: SchemeKind::Pmay,
    fields: &[
        int("beneficiaries"),
        int("houses_completed"),
        float("funds_released"),
    ],
    derived: &["houses_per_beneficiary"],
};

static MNREGA: SchemeSchema = SchemeSchema {
    kind: SchemeKind::Mnrega,
    fields: &[
        int("person_days_generated"),
        int("job_cards"),
        float("funds_spent"),
    ],
    derived: &["person_days_per_job_card"],
};

static STARTUP_INDIA: SchemeSchema = SchemeSchema {
    kind: SchemeKind::StartupIndia,
    fields: &[int("startups_supported"), float("funds_allocated")],
    derived: &["per_capita_startups"],
};

static SAUBHAGYA: SchemeSchema = SchemeSchema {
    kind: SchemeKind::Saubhagya,
    fields: &[int("households_electrified"), float("percent_coverage")],
    derived: &[],
};

/// Look up the contract for a kind.
pub fn schema_for(kind: SchemeKind) -> &'static SchemeSchema {
    match kind {
        SchemeKind::Pmay => &PMAY,
        SchemeKind::Mnrega => &MNREGA,
        SchemeKind::StartupIndia => &STARTUP_INDIA,
        SchemeKind::Saubhagya => &SAUBHAGYA,
    }
}
