//! Core pipeline orchestration for govdata.
//!
//! This crate ties together extraction, validation, transformation and
//! storage into per-scheme runs, and fans those runs out across schemes.

pub mod orchestrator;
pub mod progress;
pub mod sample;
pub mod stage;

pub use orchestrator::Orchestrator;
pub use progress::{ProgressReporter, SilentProgress};
pub use sample::{SAMPLE_STATES, SAMPLE_YEARS, sample_records};
pub use stage::PipelineStage;
