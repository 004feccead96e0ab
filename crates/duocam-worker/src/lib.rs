//! Match job worker.
//!
//! This crate provides:
//! - The match pipeline: link, concatenate, sync, cut, produce, mux
//! - Audio-only export of two synchronized camera tracks
//! - Worker configuration from `DUOCAM_*` environment variables
//! - Structured job logging and Prometheus metrics

pub mod audio_export;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use audio_export::{export_synced_audio, AudioLayout};
pub use config::WorkerConfig;
pub use error::{StageContext, WorkerError, WorkerResult};
pub use logging::{init_tracing, JobLogger};
pub use pipeline::MatchPipeline;
