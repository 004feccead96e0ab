//! Media operations the pipeline needs, behind one interface.
//!
//! [`FfmpegBackend`] is the production implementation. The pipeline only
//! ever talks to a `dyn MediaBackend`, so it can be driven by in-memory
//! clips as well.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::audio::{read_mono, AudioSignal};
use crate::clip::{self, ANALYSIS_SAMPLE_RATE};
use crate::error::{MediaError, MediaResult};
use crate::frame::{FfmpegFrameReader, FfmpegFrameWriter, FrameSink, FrameSource};
use crate::probe::{probe_video, VideoInfo};

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;

    /// Join clips, in order, into one file.
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()>;

    /// Mono audio of `input` for offset analysis. `scratch` may be used for
    /// an intermediate file.
    async fn extract_audio(&self, input: &Path, scratch: &Path) -> MediaResult<AudioSignal>;

    /// Copy `[start, end]` seconds of `input` to `output`.
    async fn cut(&self, input: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()>;

    /// Re-encode the video of `input` at `fps`, keeping its audio.
    async fn resample_fps(&self, input: &Path, fps: f64, output: &Path) -> MediaResult<()>;

    /// Combine a video with a WAV audio track, stopping at the shorter one.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path, fps: Option<f64>) -> MediaResult<()>;

    /// Decoded frames of a video. Blocking; call from a blocking thread.
    fn open_frames(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>>;

    /// Encoder for a new video. Blocking; call from a blocking thread.
    fn create_frames(&self, path: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Box<dyn FrameSink>>;
}

/// Backend driving the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }

    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        clip::concatenate(inputs, output).await
    }

    async fn extract_audio(&self, input: &Path, scratch: &Path) -> MediaResult<AudioSignal> {
        clip::extract_mono_audio(input, scratch, ANALYSIS_SAMPLE_RATE).await?;
        let path = scratch.to_path_buf();
        tokio::task::spawn_blocking(move || read_mono(path))
            .await
            .map_err(|e| MediaError::internal(format!("audio decode task failed: {e}")))?
    }

    async fn cut(&self, input: &Path, start: f64, end: f64, output: &Path) -> MediaResult<()> {
        clip::cut(input, start, end, output).await
    }

    async fn resample_fps(&self, input: &Path, fps: f64, output: &Path) -> MediaResult<()> {
        let total = Duration::try_from_secs_f64(probe_video(input).await?.duration).unwrap_or_default();
        let name = input.display().to_string();
        clip::resample_fps(input, fps, output, move |progress| {
            debug!(input = %name, percent = progress.percent_of(total), "Resampling");
        })
        .await
    }

    async fn mux(&self, video: &Path, audio: &Path, output: &Path, fps: Option<f64>) -> MediaResult<()> {
        clip::mux(video, audio, output, fps).await
    }

    fn open_frames(&self, path: &Path) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameReader::open(path)?))
    }

    fn create_frames(&self, path: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegFrameWriter::create(path, width, height, fps)?))
    }
}
