//! Prometheus metrics for the worker.
//!
//! The media crate records its own counters (`duocam_linking_total`,
//! `duocam_mixed_frames_total`, `duocam_camera_switches_total`); this module
//! adds job- and step-level ones and installs the exporter.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_TOTAL: &str = "duocam_jobs_total";
    pub const JOB_DURATION_SECONDS: &str = "duocam_job_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "duocam_stage_duration_seconds";
    pub const SYNC_OFFSET_SECONDS: &str = "duocam_sync_offset_seconds";
    pub const SYNCHRONIZED_DURATION_SECONDS: &str = "duocam_synchronized_duration_seconds";
}

/// Serve metrics on `addr` at `/metrics`. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record a finished job.
pub fn record_job(outcome: &'static str, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record the measured offset and the length of the synchronized overlap.
pub fn record_sync(offset_secs: f64, synchronized_secs: f64) {
    histogram!(names::SYNC_OFFSET_SECONDS).record(offset_secs.abs());
    histogram!(names::SYNCHRONIZED_DURATION_SECONDS).record(synchronized_secs);
}

/// Times one pipeline step; the duration is recorded when it is finished.
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Record the elapsed time and return it in seconds.
    pub fn finish(self, outcome: &'static str) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        histogram!(
            names::STAGE_DURATION_SECONDS,
            "stage" => self.stage,
            "outcome" => outcome
        )
        .record(elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_share_prefix() {
        for name in [
            names::JOBS_TOTAL,
            names::JOB_DURATION_SECONDS,
            names::STAGE_DURATION_SECONDS,
            names::SYNC_OFFSET_SECONDS,
            names::SYNCHRONIZED_DURATION_SECONDS,
        ] {
            assert!(name.starts_with("duocam_"), "{name}");
        }
    }

    #[test]
    fn test_stage_timer_without_recorder() {
        let timer = StageTimer::start("Muxing");
        assert_eq!(timer.stage(), "Muxing");
        assert!(timer.finish("ok") >= 0.0);
    }
}
