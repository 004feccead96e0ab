//! Errors raised while probing, decoding, analysing and encoding media.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg is not installed or not on PATH")]
    FfmpegNotFound,

    #[error("ffprobe is not installed or not on PATH")]
    FfprobeNotFound,

    #[error("ffmpeg: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("ffprobe: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("{tool} failed: {message}")]
    ExternalToolFailed {
        tool: String,
        message: String,
        stderr: Option<String>,
    },

    #[error("No such media file: {0}")]
    FileNotFound(PathBuf),

    #[error("Frame dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch {
        left: (u32, u32),
        right: (u32, u32),
    },

    #[error("Cannot determine linking for {camera} clips: {reason}")]
    LinkingFailed {
        camera: String,
        reason: String,
        clips: Vec<PathBuf>,
    },

    #[error("Failed to decode {what} from {path}")]
    DecodeFailed { path: PathBuf, what: String },

    #[error("Invalid settings: {0}")]
    InvalidConfig(String),

    #[error("Nothing to process: {0}")]
    EmptyInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Malformed ffprobe output: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("Frame image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image processing: {0}")]
    ImageProcessing(String),

    #[error("Audio analysis: {0}")]
    Audio(String),

    #[error("Audio resampling: {0}")]
    Resample(String),

    #[error("Unusable video: {0}")]
    InvalidVideo(String),

    #[error("Internal: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a linking failure for one camera's clip set.
    pub fn linking_failed(
        camera: impl Into<String>,
        reason: impl Into<String>,
        clips: Vec<PathBuf>,
    ) -> Self {
        Self::LinkingFailed {
            camera: camera.into(),
            reason: reason.into(),
            clips,
        }
    }

    pub fn decode_failed(path: impl Into<PathBuf>, what: impl Into<String>) -> Self {
        Self::DecodeFailed {
            path: path.into(),
            what: what.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Rejected inputs or settings, as opposed to a failure while processing.
    pub fn is_input_validation(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. } | Self::InvalidConfig(_) | Self::EmptyInput(_)
        )
    }

    /// Diagnostic output from an external tool, if any.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed { stderr, .. }
            | Self::FfprobeFailed { stderr, .. }
            | Self::ExternalToolFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
