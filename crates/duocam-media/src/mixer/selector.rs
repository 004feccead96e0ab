//! Motion-driven camera selection.
//!
//! Both synchronized streams are read in lockstep. Every few frames a
//! [`MotionVoter`] looks at both cameras and votes for one; the vote goes
//! into the [`MixState`] and every frame is then taken from whichever camera
//! the state currently favors.

use image::GrayImage;
use std::time::Instant;
use tracing::{debug, info};

use duocam_models::{Camera, MixerKind};

use super::config::MixerConfig;
use super::history::{DecisionRule, MixState};
use crate::core::ProgressReporter;
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, FrameSink, FrameSource};
use crate::vision::{action_hotspot, mask_field, motion_score, prepare_frame, FieldMaskConfig, FlowConfig};

/// Progress step name used while mixing.
pub const MIXING_STEP: &str = "Mixing videos";

/// Picks a camera from one pair of synchronized frames.
pub trait MotionVoter: Send {
    /// Called once with the first frame of each camera.
    fn prime(&mut self, first_a: &Frame, first_b: &Frame) -> MediaResult<()>;

    /// Vote for the camera showing the action in this pair.
    fn vote(&mut self, a: &Frame, b: &Frame) -> MediaResult<Camera>;
}

/// Votes for the camera with more frame-to-frame difference.
pub struct FrameDifferenceVoter {
    field_mask: Option<FieldMaskConfig>,
    masks: Option<(GrayImage, GrayImage)>,
    previous: Option<(GrayImage, GrayImage)>,
}

impl FrameDifferenceVoter {
    pub fn new() -> Self {
        Self {
            field_mask: None,
            masks: None,
            previous: None,
        }
    }

    /// Only count motion on the playing field, detected from the first frames.
    pub fn with_field_mask(config: FieldMaskConfig) -> Self {
        Self {
            field_mask: Some(config),
            ..Self::new()
        }
    }

    fn prepare(&self, a: &Frame, b: &Frame) -> MediaResult<(GrayImage, GrayImage)> {
        let (mask_a, mask_b) = match &self.masks {
            Some((ma, mb)) => (Some(ma), Some(mb)),
            None => (None, None),
        };
        Ok((prepare_frame(a, mask_a)?, prepare_frame(b, mask_b)?))
    }
}

impl Default for FrameDifferenceVoter {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionVoter for FrameDifferenceVoter {
    fn prime(&mut self, first_a: &Frame, first_b: &Frame) -> MediaResult<()> {
        if let Some(config) = &self.field_mask {
            self.masks = Some((mask_field(first_a, config)?, mask_field(first_b, config)?));
        }
        self.previous = Some(self.prepare(first_a, first_b)?);
        Ok(())
    }

    fn vote(&mut self, a: &Frame, b: &Frame) -> MediaResult<Camera> {
        let (cur_a, cur_b) = self.prepare(a, b)?;
        let vote = match &self.previous {
            Some((prev_a, prev_b)) => {
                let score_a = motion_score(prev_a, &cur_a)?;
                let score_b = motion_score(prev_b, &cur_b)?;
                if score_a >= score_b {
                    Camera::A
                } else {
                    Camera::B
                }
            }
            None => Camera::A,
        };
        self.previous = Some((cur_a, cur_b));
        Ok(vote)
    }
}

/// Votes by where the action is: camera A covers the left of the pitch.
///
/// A is kept while its action sits left of 0.6 or B's action sits left of
/// 0.4, leaving an overlap band so play in the middle does not flip cameras.
pub struct ActionHotspotVoter {
    flow: FlowConfig,
    previous: Option<(Frame, Frame)>,
}

impl ActionHotspotVoter {
    pub fn new(flow: FlowConfig) -> Self {
        Self { flow, previous: None }
    }
}

impl MotionVoter for ActionHotspotVoter {
    fn prime(&mut self, first_a: &Frame, first_b: &Frame) -> MediaResult<()> {
        self.previous = Some((first_a.clone(), first_b.clone()));
        Ok(())
    }

    fn vote(&mut self, a: &Frame, b: &Frame) -> MediaResult<Camera> {
        let vote = match &self.previous {
            Some((prev_a, prev_b)) => {
                let pos_a = action_hotspot(prev_a, a, &self.flow)?;
                let pos_b = action_hotspot(prev_b, b, &self.flow)?;
                debug!(pos_a, pos_b, "Action hotspots");
                if pos_a < 0.6 || pos_b < 0.4 {
                    Camera::A
                } else {
                    Camera::B
                }
            }
            None => Camera::A,
        };
        self.previous = Some((a.clone(), b.clone()));
        Ok(vote)
    }
}

/// Counters from one mixing run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MixStats {
    /// Frame pairs read, including the first
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_from_a: u64,
    pub frames_from_b: u64,
    pub evaluations: u64,
    pub switches: u64,
    /// History mean when the run ended
    pub final_history_mean: f64,
}

/// Switches between two synchronized camera streams.
pub struct CameraMixer {
    config: MixerConfig,
}

impl CameraMixer {
    pub fn new(config: MixerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    fn voter(&self) -> Box<dyn MotionVoter> {
        match self.config.kind {
            MixerKind::FrameDifference => Box::new(FrameDifferenceVoter::new()),
            MixerKind::FrameDifferenceFieldMask => {
                Box::new(FrameDifferenceVoter::with_field_mask(self.config.field_mask))
            }
            MixerKind::ActionHotspot => Box::new(ActionHotspotVoter::new(self.config.flow)),
        }
    }

    fn rule(&self) -> DecisionRule {
        match self.config.kind {
            MixerKind::ActionHotspot => DecisionRule::Smoothed {
                alpha: self.config.smoothing_alpha,
            },
            MixerKind::FrameDifference | MixerKind::FrameDifferenceFieldMask => DecisionRule::Majority,
        }
    }

    /// Mix `a` and `b` into `sink` with the configured heuristic.
    ///
    /// Both sources are released whether or not mixing succeeds; the sink is
    /// finished only on success.
    pub fn mix(
        &self,
        a: &mut dyn FrameSource,
        b: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        reporter: &dyn ProgressReporter,
    ) -> MediaResult<MixStats> {
        let mut voter = self.voter();
        self.mix_with(voter.as_mut(), a, b, sink, reporter)
    }

    /// Mix with a caller-supplied voter.
    pub fn mix_with(
        &self,
        voter: &mut dyn MotionVoter,
        a: &mut dyn FrameSource,
        b: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        reporter: &dyn ProgressReporter,
    ) -> MediaResult<MixStats> {
        let result = self.run(voter, a, b, sink, reporter);
        a.release();
        b.release();
        result
    }

    fn run(
        &self,
        voter: &mut dyn MotionVoter,
        a: &mut dyn FrameSource,
        b: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        reporter: &dyn ProgressReporter,
    ) -> MediaResult<MixStats> {
        self.config.validate()?;
        let started = Instant::now();

        let total = match (a.frame_count(), b.frame_count()) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (Some(x), None) | (None, Some(x)) => Some(x),
            (None, None) => None,
        };
        let frames_per_eval = self.config.frames_per_eval();
        let decimation = self.config.decimation();

        let first_a = a
            .read_next()?
            .ok_or_else(|| MediaError::decode_failed(a.name(), "first frame"))?;
        let first_b = b
            .read_next()?
            .ok_or_else(|| MediaError::decode_failed(b.name(), "first frame"))?;

        voter.prime(&first_a, &first_b)?;
        let mut state = MixState::new(self.config.history_length, self.rule());
        let mut stats = MixStats {
            frames_read: 1,
            ..MixStats::default()
        };

        info!(
            mixer = %self.config.kind,
            total_frames = ?total,
            frames_per_eval,
            decimation,
            history_length = self.config.history_length,
            "Mixing camera streams"
        );
        reporter.started(MIXING_STEP, 0);

        sink.write(&first_a)?;
        stats.frames_written = 1;
        stats.frames_from_a = 1;
        let mut shown = Camera::A;
        let mut last_percent = 0u8;

        let mut i: u64 = 1;
        while total.map_or(true, |t| i < t) {
            let (Some(frame_a), Some(frame_b)) = (a.read_next()?, b.read_next()?) else {
                debug!(frame = i, "Input exhausted");
                break;
            };
            stats.frames_read += 1;

            if i % frames_per_eval == 0 {
                let vote = voter.vote(&frame_a, &frame_b)?;
                state.step(vote);
                stats.evaluations += 1;
            }

            let camera = state.current();
            if camera != shown {
                stats.switches += 1;
                shown = camera;
            }

            if i % decimation == 0 {
                match camera {
                    Camera::A => {
                        sink.write(&frame_a)?;
                        stats.frames_from_a += 1;
                    }
                    Camera::B => {
                        sink.write(&frame_b)?;
                        stats.frames_from_b += 1;
                    }
                }
                stats.frames_written += 1;
            }

            if let Some(t) = total {
                let percent = ((100 * i) as f64 / t as f64).round().min(100.0) as u8;
                if percent != last_percent {
                    reporter.running(MIXING_STEP, percent);
                    last_percent = percent;
                }
            }
            i += 1;
        }

        sink.finish()?;
        stats.final_history_mean = state.history().mean();

        metrics::counter!("duocam_mixed_frames_total", "mixer" => self.config.kind.as_str())
            .increment(stats.frames_written);
        metrics::counter!("duocam_camera_switches_total", "mixer" => self.config.kind.as_str())
            .increment(stats.switches);

        info!(
            frames_written = stats.frames_written,
            from_a = stats.frames_from_a,
            from_b = stats.frames_from_b,
            switches = stats.switches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Mixing complete"
        );
        reporter.finished(MIXING_STEP, 100);
        Ok(stats)
    }
}
