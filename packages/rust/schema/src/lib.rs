//! Schema registry and record validator.
//!
//! The registry holds one static contract per [`SchemeKind`]; the validator
//! applies it to raw source records, dropping (and logging) the ones that
//! do not conform.
//!
//! [`SchemeKind`]: govdata_shared::SchemeKind

pub mod registry;
pub mod validator;

pub use registry::{
    BASE_FIELDS, FieldSpec, FieldType, STATE_CODE_MAX_LEN, SchemeSchema, YEAR_RANGE, schema_for,
};
pub use validator::{Rejection, validate, validate_record};
