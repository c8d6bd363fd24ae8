//! Progress callbacks for pipeline runs.

use govdata_shared::{PipelineRunResult, SchemeKind};

use crate::stage::PipelineStage;

/// Progress callback for reporting pipeline status.
///
/// Implementations are shared across concurrently running pipelines.
pub trait ProgressReporter: Send + Sync {
    /// Called when a run for `kind` enters `stage`; `count` is the size of
    /// the payload the stage produced.
    fn stage(&self, kind: SchemeKind, stage: PipelineStage, count: usize);
    /// Called once per run, after bookkeeping.
    fn finished(&self, result: &PipelineRunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _kind: SchemeKind, _stage: PipelineStage, _count: usize) {}
    fn finished(&self, _result: &PipelineRunResult) {}
}
