//! Shared data models for the duocam pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Camera sides and per-frame camera choices
//! - Match jobs (two clip lists plus output options)
//! - Task status and progress updates
//! - Strategy selections for syncing, linking and producing output
//! - Timestamp parsing for user-supplied game start/end times

pub mod camera;
pub mod job;
pub mod status;
pub mod strategy;
pub mod timestamp;

// Re-export common types
pub use camera::Camera;
pub use job::{JobId, JobOutput, JobValidationError, MatchJob, OutputOptions, SAMPLE_DURATION_SECS};
pub use status::{scale_percent, ProgressUpdate, TaskStatus};
pub use strategy::{LinkingMethod, MixerKind, ProductionMode, SyncMethod};
pub use timestamp::{format_seconds, parse_timestamp, TimeRange, TimestampError};
