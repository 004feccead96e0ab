//! Match job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::timestamp::{TimeRange, TimestampError};
use crate::{LinkingMethod, MixerKind, ProductionMode, SyncMethod};

/// Length of a sample render in seconds.
pub const SAMPLE_DURATION_SECS: f64 = 120.0;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options controlling how the output is produced.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct OutputOptions {
    /// Mixer or panorama
    pub mode: ProductionMode,
    /// Camera selection heuristic (mixer mode only)
    pub mixer: MixerKind,
    /// Audio offset estimation method
    pub sync_method: SyncMethod,
    /// Clip ordering method
    pub linking: LinkingMethod,
    /// Output frame rate; defaults to the input rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_fps: Option<u32>,
    /// Game start on camera A's timeline (HH:MM:SS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Game end on camera A's timeline (HH:MM:SS)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    /// Render only the first two minutes from the start time
    pub make_sample: bool,
    /// Keep intermediate files in the output directory
    pub keep_intermediate: bool,
    /// Container extension for intermediate files (without dot)
    pub file_type: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            mode: ProductionMode::default(),
            mixer: MixerKind::default(),
            sync_method: SyncMethod::default(),
            linking: LinkingMethod::default(),
            output_fps: None,
            start_time: None,
            end_time: None,
            make_sample: false,
            keep_intermediate: false,
            file_type: "mp4".to_string(),
        }
    }
}

impl OutputOptions {
    /// Parsed start/end window, with sample mode applied.
    pub fn time_range(&self) -> Result<TimeRange, JobValidationError> {
        let range = TimeRange::parse(self.start_time.as_deref(), self.end_time.as_deref())?;
        if !self.make_sample {
            return Ok(range);
        }
        if range.end.is_some() {
            return Err(JobValidationError::SampleWithEndTime);
        }
        let start = range.start.unwrap_or(0.0);
        Ok(TimeRange::new(Some(start), Some(start + SAMPLE_DURATION_SECS))?)
    }
}

/// A request to combine two cameras' clips into one video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatchJob {
    #[serde(default)]
    pub id: JobId,
    /// Unordered clips from camera A (left)
    pub left_clips: Vec<PathBuf>,
    /// Unordered clips from camera B (right)
    pub right_clips: Vec<PathBuf>,
    /// Final output path
    pub output: PathBuf,
    #[serde(default)]
    pub options: OutputOptions,
}

impl MatchJob {
    pub fn new(left_clips: Vec<PathBuf>, right_clips: Vec<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            id: JobId::new(),
            left_clips,
            right_clips,
            output: output.into(),
            options: OutputOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OutputOptions) -> Self {
        self.options = options;
        self
    }

    /// Check the job before any work starts.
    pub fn validate(&self) -> Result<(), JobValidationError> {
        if self.left_clips.is_empty() {
            return Err(JobValidationError::NoClips("left"));
        }
        if self.right_clips.is_empty() {
            return Err(JobValidationError::NoClips("right"));
        }
        if self.options.output_fps == Some(0) {
            return Err(JobValidationError::InvalidFps);
        }
        self.options.time_range()?;
        Ok(())
    }
}

/// Result of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobOutput {
    pub job_id: JobId,
    pub file_path: PathBuf,
    /// Offset applied between the cameras (positive = A leads)
    pub offset_seconds: f64,
    /// Sync confidence when the robust estimator was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_confidence: Option<f64>,
    /// Duration of the synchronized overlap in seconds
    pub synchronized_duration: f64,
}

/// Job validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobValidationError {
    #[error("No {0} camera clips given")]
    NoClips(&'static str),

    #[error("Output fps must be positive")]
    InvalidFps,

    #[error("Cannot make a sample video with an end time")]
    SampleWithEndTime,

    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> MatchJob {
        MatchJob::new(
            vec![PathBuf::from("l1.mp4")],
            vec![PathBuf::from("r1.mp4"), PathBuf::from("r2.mp4")],
            "out.mp4",
        )
    }

    #[test]
    fn test_job_deserialize_defaults() {
        let json = r#"{"left_clips":["a.mp4"],"right_clips":["b.mp4"],"output":"o.mp4"}"#;
        let job: MatchJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.options.file_type, "mp4");
        assert_eq!(job.options.mode, ProductionMode::Mixer);
        assert!(!job.id.as_str().is_empty());
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_clips() {
        let mut job = job();
        job.left_clips.clear();
        assert_eq!(job.validate(), Err(JobValidationError::NoClips("left")));
    }

    #[test]
    fn test_sample_window() {
        let mut job = job();
        job.options.make_sample = true;
        job.options.start_time = Some("00:10:00".to_string());
        let range = job.options.time_range().unwrap();
        assert_eq!(range.start, Some(600.0));
        assert_eq!(range.end, Some(720.0));

        job.options.end_time = Some("00:20:00".to_string());
        assert_eq!(job.validate(), Err(JobValidationError::SampleWithEndTime));
    }
}
