//! Structured job logging.
//!
//! Nothing in the pipeline owns a global logger. A [`JobLogger`] carrying the
//! job identity is handed to each step, and the job span it creates wraps
//! everything the media crate logs while the job runs.

use std::path::Path;
use tracing::{error, info, warn, Span};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use duocam_models::{JobId, MatchJob, ProductionMode};

/// Logs one job's lifecycle with its id and production mode attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    mode: ProductionMode,
}

impl JobLogger {
    pub fn new(job_id: JobId, mode: ProductionMode) -> Self {
        Self { job_id, mode }
    }

    pub fn for_job(job: &MatchJob) -> Self {
        Self::new(job.id.clone(), job.options.mode)
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Span wrapping all work done for this job.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, mode = ?self.mode)
    }

    pub fn accepted(&self, job: &MatchJob) {
        info!(
            job_id = %self.job_id,
            mode = ?self.mode,
            left_clips = job.left_clips.len(),
            right_clips = job.right_clips.len(),
            output = %job.output.display(),
            "Job accepted"
        );
    }

    pub fn stage(&self, stage: &str, percent: u8) {
        info!(job_id = %self.job_id, stage, percent, "Stage started: {}", stage);
    }

    pub fn note(&self, stage: &str, message: &str) {
        info!(job_id = %self.job_id, stage, "{}", message);
    }

    pub fn cleanup_failed(&self, dir: &Path, err: &std::io::Error) {
        warn!(job_id = %self.job_id, dir = %dir.display(), error = %err, "Could not remove working directory");
    }

    pub fn failed(&self, stage: &str, err: &dyn std::error::Error) {
        error!(job_id = %self.job_id, stage, error = %err, "Job failed in {}", stage);
    }

    pub fn completed(&self, output: &Path, offset_seconds: f64, synchronized_seconds: f64, elapsed_seconds: f64) {
        info!(
            job_id = %self.job_id,
            output = %output.display(),
            offset_seconds,
            synchronized_seconds,
            elapsed_seconds,
            "Job completed"
        );
    }
}

/// Install the global subscriber: JSON lines when `LOG_FORMAT=json`,
/// plain text otherwise. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FORMAT") {
        Ok(format) if format.eq_ignore_ascii_case("json") => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
        _ => registry.with(fmt::layer().with_target(true)).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_logger_for_job() {
        let job = MatchJob::new(vec![PathBuf::from("a.mp4")], vec![PathBuf::from("b.mp4")], "out.mp4");
        let logger = JobLogger::for_job(&job);
        assert_eq!(logger.job_id(), &job.id);
    }

    #[test]
    fn test_events_carry_job_identity() {
        let logger = JobLogger::new(JobId::from_string("match-7"), ProductionMode::Mixer);
        let text = capture(|| {
            let _span = logger.span().entered();
            logger.stage("Linking clips", 5);
            let err = std::io::Error::other("ffmpeg exited with 1");
            logger.failed("Muxing", &err);
        });

        assert!(text.contains("job_id=match-7"), "{text}");
        assert!(text.contains("Stage started: Linking clips"), "{text}");
        assert!(text.contains("Job failed in Muxing"), "{text}");
        assert!(text.contains("ffmpeg exited with 1"), "{text}");
    }
}
