//! Configuration for the camera mixer.

use serde::{Deserialize, Serialize};

use duocam_models::MixerKind;

use crate::error::{MediaError, MediaResult};
use crate::production::check_output_fps;
use crate::vision::{FieldMaskConfig, FlowConfig};

/// Configuration for one mixing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerConfig {
    /// Camera selection heuristic
    pub kind: MixerKind,

    // === Frame rates ===
    /// Frame rate of both synchronized inputs
    pub input_fps: u32,
    /// Output frame rate; must divide down from `input_fps` (default: input rate)
    pub output_fps: u32,
    /// How often motion is evaluated per second (default: 5, action hotspot: 30)
    pub flow_eval_fps: u32,

    // === Decision ===
    /// Number of recent votes kept (default: 24, action hotspot: 12)
    pub history_length: usize,
    /// Weight of the newest history mean in the smoothed score (action hotspot only)
    pub smoothing_alpha: f64,

    /// Output frame size; `None` keeps the input size
    pub output_size: Option<(u32, u32)>,

    #[serde(skip)]
    pub field_mask: FieldMaskConfig,
    #[serde(skip)]
    pub flow: FlowConfig,
}

impl MixerConfig {
    /// Defaults for `kind` at the given input frame rate.
    pub fn new(kind: MixerKind, input_fps: u32) -> Self {
        let (flow_eval_fps, history_length) = match kind {
            MixerKind::ActionHotspot => (30, 12),
            MixerKind::FrameDifference | MixerKind::FrameDifferenceFieldMask => (5, 24),
        };
        Self {
            kind,
            input_fps,
            output_fps: input_fps,
            flow_eval_fps,
            history_length,
            smoothing_alpha: 0.7,
            output_size: None,
            field_mask: FieldMaskConfig::default(),
            flow: FlowConfig::default(),
        }
    }

    pub fn with_output_fps(mut self, fps: u32) -> Self {
        self.output_fps = fps;
        self
    }

    pub fn with_flow_eval_fps(mut self, fps: u32) -> Self {
        self.flow_eval_fps = fps;
        self
    }

    pub fn with_history_length(mut self, length: usize) -> Self {
        self.history_length = length;
        self
    }

    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = Some((width, height));
        self
    }

    pub fn with_field_mask(mut self, field_mask: FieldMaskConfig) -> Self {
        self.field_mask = field_mask;
        self
    }

    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }

    /// Reject settings the mixer cannot honor. Called before any frame is read.
    pub fn validate(&self) -> MediaResult<()> {
        if self.input_fps == 0 || self.output_fps == 0 || self.flow_eval_fps == 0 {
            return Err(MediaError::invalid_config(format!(
                "frame rates must be positive (input {}, output {}, flow {})",
                self.input_fps, self.output_fps, self.flow_eval_fps
            )));
        }
        check_output_fps(self.input_fps, self.output_fps)?;
        if self.history_length == 0 {
            return Err(MediaError::invalid_config("history length must be positive"));
        }
        if !(0.0..=1.0).contains(&self.smoothing_alpha) {
            return Err(MediaError::invalid_config(format!(
                "smoothing alpha {} must lie in [0, 1]",
                self.smoothing_alpha
            )));
        }
        Ok(())
    }

    /// Input frames between two motion evaluations.
    pub fn frames_per_eval(&self) -> u64 {
        let ratio = self.input_fps as f64 / self.flow_eval_fps.max(1) as f64;
        (ratio.round() as u64).max(1)
    }

    /// Every `decimation()`-th input frame is written.
    pub fn decimation(&self) -> u64 {
        (self.input_fps / self.output_fps.max(1)).max(1) as u64
    }
}
