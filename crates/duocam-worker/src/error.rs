//! Worker error types.

use thiserror::Error;

use duocam_media::MediaError;
use duocam_models::JobValidationError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] JobValidationError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A media operation failed inside a named pipeline step.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: MediaError,
    },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn stage(stage: &'static str, source: MediaError) -> Self {
        Self::Stage { stage, source }
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// Step the error happened in, when known.
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            WorkerError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// The underlying media error, if any.
    pub fn media_error(&self) -> Option<&MediaError> {
        match self {
            WorkerError::Stage { source, .. } | WorkerError::Media(source) => Some(source),
            _ => None,
        }
    }

    /// Bad job or configuration, as opposed to a processing failure.
    pub fn is_input_validation(&self) -> bool {
        match self {
            WorkerError::InvalidJob(_) | WorkerError::ConfigError(_) => true,
            _ => self.media_error().is_some_and(MediaError::is_input_validation),
        }
    }

    /// Clips could not be put in order.
    pub fn is_linking_failure(&self) -> bool {
        matches!(self.media_error(), Some(MediaError::LinkingFailed { .. }))
    }
}

/// Attach a pipeline step to media results.
pub trait StageContext<T> {
    fn in_stage(self, stage: &'static str) -> WorkerResult<T>;
}

impl<T> StageContext<T> for Result<T, MediaError> {
    fn in_stage(self, stage: &'static str) -> WorkerResult<T> {
        self.map_err(|source| WorkerError::stage(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duocam_models::Camera;
    use std::path::PathBuf;

    #[test]
    fn test_stage_context() {
        let result: Result<(), MediaError> = Err(MediaError::EmptyInput("no clips".into()));
        let err = result.in_stage("Linking clips").unwrap_err();

        assert_eq!(err.stage_name(), Some("Linking clips"));
        assert!(err.is_input_validation());
        assert!(err.to_string().starts_with("Linking clips failed"));
    }

    #[test]
    fn test_linking_failure_detected() {
        let err = WorkerError::stage(
            "Linking clips",
            MediaError::linking_failed(Camera::B.to_string(), "two roots", vec![PathBuf::from("b1.mp4")]),
        );
        assert!(err.is_linking_failure());
        assert!(!WorkerError::task_failed("join").is_linking_failure());
    }

    #[test]
    fn test_job_errors_are_validation() {
        let err = WorkerError::from(JobValidationError::InvalidFps);
        assert!(err.is_input_validation());
        assert_eq!(err.stage_name(), None);
    }
}
