//! Per-run stage machine.
//!
//! Every transition is unconditional: an empty or failed stage hands an empty
//! payload to the next one rather than stopping the run.

use std::fmt;

use serde::Serialize;

/// Where a single scheme pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    Extracted,
    Validated,
    Transformed,
    Loaded,
    Done,
}

impl PipelineStage {
    /// The stage that follows this one. `Done` is terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Init => Self::Extracted,
            Self::Extracted => Self::Validated,
            Self::Validated => Self::Transformed,
            Self::Transformed => Self::Loaded,
            Self::Loaded | Self::Done => Self::Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Extracted => "extracted",
            Self::Validated => "validated",
            Self::Transformed => "transformed",
            Self::Loaded => "loaded",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_every_stage_in_order() {
        let mut stage = PipelineStage::Init;
        let mut seen = vec![stage];
        while stage != PipelineStage::Done {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            [
                PipelineStage::Init,
                PipelineStage::Extracted,
                PipelineStage::Validated,
                PipelineStage::Transformed,
                PipelineStage::Loaded,
                PipelineStage::Done,
            ]
        );
        assert_eq!(PipelineStage::Done.next(), PipelineStage::Done);
    }
}
