#![deny(unreachable_patterns)]
//! Media processing for two-camera match recordings.
//!
//! This crate provides:
//! - FFmpeg/FFprobe invocation, with `-progress` output parsed into snapshots
//! - Frame streams decoded from and encoded to FFmpeg pipes
//! - Ordering of unordered clip lists by boundary-frame similarity
//! - Audio offset estimation, alignment and stereo mixing
//! - Motion-driven switching between two synchronized cameras
//! - Output production through the mixer or an external stitcher

pub mod audio;
pub mod backend;
pub mod clip;
pub mod command;
pub mod core;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod linker;
pub mod mixer;
pub mod probe;
pub mod production;
pub mod progress;
pub mod similarity;
pub mod vision;

pub use audio::{AudioSignal, SyncWindow};
pub use backend::{FfmpegBackend, MediaBackend};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use core::{BandReporter, NoopReporter, ProgressReporter};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, FrameSink, FrameSource};
pub use linker::{ClipLinker, ClipOpener, FfmpegClipOpener, LinkerConfig};
pub use mixer::{CameraMixer, MixStats, MixerConfig};
pub use probe::{probe_video, VideoInfo};
pub use production::{producer_for, OutputProducer, ProductionRequest, ProductionResult, StitcherConfig};
pub use progress::{FfmpegProgress, ProgressParser};
