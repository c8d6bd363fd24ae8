//! Shared types, error model, and configuration for govdata.
//!
//! This crate is the foundation depended on by all other govdata crates.
//! It provides:
//! - [`GovDataError`], the unified error type
//! - Domain types ([`SchemeKind`], [`RawRecord`], [`ValidatedRecord`], [`TransformedRecord`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, FetchConfig, PipelineSettings, SourceConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, load_mapping_file,
    load_population_file, resolve_api_key, scheme_mapping,
};
pub use error::{GovDataError, Result};
pub use types::{
    FieldValue, PipelineRunResult, RawRecord, RunStatus, SchemeKind, TransformedRecord,
    ValidatedRecord,
};
