//! Stage selection.

use std::fmt;

use vidshift_models::TransformOptions;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Engine transcode with the filter graph
    Transform,
    /// Per-frame pixel filter
    FrameFilter,
    /// Re-encode frame output and attach audio
    FinalEncode,
    /// Speed change after frame filtering
    SpeedAdjust,
    /// Stream copy, nothing to change
    DirectCopy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transform => "transform",
            Stage::FrameFilter => "frame_filter",
            Stage::FinalEncode => "final_encode",
            Stage::SpeedAdjust => "speed_adjust",
            Stage::DirectCopy => "direct_copy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which stages run for a set of options. Computed once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub transform: bool,
    pub frame_filter: bool,
    pub final_encode: bool,
    pub speed_adjust: bool,
    pub direct_copy: bool,
}

impl StagePlan {
    pub fn from_options(options: &TransformOptions) -> Self {
        let has_filter = !options.filter.is_none();
        let transform = !options.transformation.is_none()
            || options.brightness_changed()
            || options.contrast_changed()
            || (!has_filter && options.speed_changed());
        let speed_adjust = has_filter && options.speed_changed();

        Self {
            transform,
            frame_filter: has_filter,
            final_encode: has_filter,
            speed_adjust,
            direct_copy: !transform && !has_filter && !speed_adjust,
        }
    }

    /// Applicable stages in execution order.
    pub fn stages(&self) -> Vec<Stage> {
        [
            (self.transform, Stage::Transform),
            (self.frame_filter, Stage::FrameFilter),
            (self.final_encode, Stage::FinalEncode),
            (self.speed_adjust, Stage::SpeedAdjust),
            (self.direct_copy, Stage::DirectCopy),
        ]
        .into_iter()
        .filter_map(|(enabled, stage)| enabled.then_some(stage))
        .collect()
    }
}
