//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use duocam_media::audio::DEFAULT_COMPARE_SECONDS;
use duocam_models::{MixerKind, OutputOptions, SyncMethod};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
///
/// Strategy fields are overrides: when set they replace whatever the job
/// asked for, otherwise the job's own options apply.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Parent of the per-job working directories
    pub work_dir: PathBuf,
    /// Output fps for jobs that do not set one (`None` keeps the input rate)
    pub output_fps: Option<u32>,
    /// Motion evaluation rate override
    pub flow_fps: Option<u32>,
    /// Flow history length override
    pub history_length: Option<usize>,
    /// Mixer output frame size (`None` keeps camera A's size)
    pub output_size: Option<(u32, u32)>,
    /// Seconds of audio compared when estimating the offset
    pub compare_seconds: f64,
    pub sync_method: Option<SyncMethod>,
    pub mixer: Option<MixerKind>,
    /// Keep every job's working directory after it finishes
    pub keep_intermediate: bool,
    /// Prometheus listener address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/duocam"),
            output_fps: None,
            flow_fps: None,
            history_length: None,
            output_size: None,
            compare_seconds: DEFAULT_COMPARE_SECONDS,
            sync_method: None,
            mixer: None,
            keep_intermediate: false,
            metrics_addr: None,
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str) -> WorkerResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| WorkerError::config_error(format!("{key}={v}: {e}")))
        })
        .transpose()
}

/// Parse `1280x720`.
fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(['x', 'X'])?;
    let size = (w.trim().parse().ok()?, h.trim().parse().ok()?);
    (size.0 > 0 && size.1 > 0).then_some(size)
}

impl WorkerConfig {
    /// Create config from `DUOCAM_*` environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();
        Self {
            work_dir: env_var("DUOCAM_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_fps: parse_var("DUOCAM_OUTPUT_FPS")?,
            flow_fps: parse_var("DUOCAM_FLOW_FPS")?,
            history_length: parse_var("DUOCAM_HISTORY_LENGTH")?,
            output_size: env_var("DUOCAM_OUTPUT_SIZE")
                .map(|v| {
                    parse_size(&v).ok_or_else(|| {
                        WorkerError::config_error(format!("DUOCAM_OUTPUT_SIZE={v}: expected WIDTHxHEIGHT"))
                    })
                })
                .transpose()?,
            compare_seconds: parse_var("DUOCAM_COMPARE_SECONDS")?.unwrap_or(defaults.compare_seconds),
            sync_method: parse_var("DUOCAM_SYNC_METHOD")?,
            mixer: parse_var("DUOCAM_MIXER")?,
            keep_intermediate: parse_var("DUOCAM_KEEP_INTERMEDIATE")?.unwrap_or(false),
            metrics_addr: parse_var("DUOCAM_METRICS_ADDR")?,
        }
        .validated()
    }

    fn validated(self) -> WorkerResult<Self> {
        if self.output_fps == Some(0) || self.flow_fps == Some(0) {
            return Err(WorkerError::config_error("frame rates must be positive"));
        }
        if self.history_length == Some(0) {
            return Err(WorkerError::config_error("history length must be positive"));
        }
        if self.compare_seconds.is_nan() || self.compare_seconds <= 0.0 {
            return Err(WorkerError::config_error("comparison window must be positive"));
        }
        Ok(self)
    }

    /// Job options with this worker's overrides applied.
    pub fn apply_overrides(&self, options: &OutputOptions) -> OutputOptions {
        let mut options = options.clone();
        if let Some(method) = self.sync_method {
            options.sync_method = method;
        }
        if let Some(mixer) = self.mixer {
            options.mixer = mixer;
        }
        if options.output_fps.is_none() {
            options.output_fps = self.output_fps;
        }
        options.keep_intermediate |= self.keep_intermediate;
        options
    }
}
