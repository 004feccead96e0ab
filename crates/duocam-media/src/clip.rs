//! Container operations delegated to FFmpeg.
//!
//! Everything here is plumbing around the `ffmpeg` binary: cutting a
//! synchronized window out of a file, joining ordered clips, changing the
//! frame rate, pulling mono audio out for sync analysis and muxing the
//! mixed video with its audio track.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Sample rate used for extracted sync audio.
pub const ANALYSIS_SAMPLE_RATE: u32 = 44_100;

/// Cut `[start_secs, end_secs]` out of `input` without re-encoding.
pub async fn cut(
    input: impl AsRef<Path>,
    start_secs: f64,
    end_secs: f64,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    if end_secs <= start_secs {
        return Err(MediaError::invalid_config(format!(
            "cut window [{:.3}, {:.3}] is empty for {}",
            start_secs,
            end_secs,
            input.display()
        )));
    }

    info!(
        input = %input.display(),
        output = %output.display(),
        start = start_secs,
        end = end_secs,
        "Cutting segment"
    );

    let cmd = FfmpegCommand::new(input, output)
        .seek(start_secs.max(0.0))
        .limit(end_secs - start_secs.max(0.0))
        .stream_copy();

    FfmpegRunner::new().run(&cmd).await
}

/// Concatenate `inputs` in order into `output` via the concat demuxer.
///
/// The list file is written next to the output and removed afterwards.
pub async fn concatenate(inputs: &[PathBuf], output: impl AsRef<Path>) -> MediaResult<()> {
    let output = output.as_ref();

    if inputs.is_empty() {
        return Err(MediaError::EmptyInput("no clips to concatenate".to_string()));
    }

    let list_path = output.with_extension("concat.txt");
    tokio::fs::write(&list_path, concat_list(inputs)?).await?;

    info!(
        clips = inputs.len(),
        output = %output.display(),
        "Concatenating clips"
    );

    let cmd = FfmpegCommand::new(&list_path, output).concat_list().stream_copy();
    let result = FfmpegRunner::new().run(&cmd).await;

    if let Err(e) = tokio::fs::remove_file(&list_path).await {
        tracing::debug!("Failed to remove concat list {}: {}", list_path.display(), e);
    }

    result
}

/// Render a concat demuxer list file.
pub fn concat_list(inputs: &[PathBuf]) -> MediaResult<String> {
    let mut list = String::new();
    for input in inputs {
        let absolute = if input.is_absolute() {
            input.clone()
        } else {
            std::env::current_dir()?.join(input)
        };
        let escaped = absolute.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{}'\n", escaped));
    }
    Ok(list)
}

/// Re-encode the video stream at `fps`, copying audio.
pub async fn resample_fps<F>(
    input: impl AsRef<Path>,
    fps: f64,
    output: impl AsRef<Path>,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let input = input.as_ref();
    let output = output.as_ref();

    if fps <= 0.0 {
        return Err(MediaError::invalid_config(format!("invalid target fps {}", fps)));
    }

    info!(input = %input.display(), fps, "Changing frame rate");

    let cmd = FfmpegCommand::new(input, output)
        .encode_h264(fps)
        .option(["-c:a", "copy"]);

    FfmpegRunner::new().run_observed(&cmd, on_progress).await
}

/// Extract the first audio track as mono 16-bit WAV.
pub async fn extract_mono_audio(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    sample_rate: u32,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    info!(input = %input.display(), sample_rate, "Extracting mono audio");

    let cmd = FfmpegCommand::new(input, output).mono_pcm(sample_rate);

    FfmpegRunner::new().run(&cmd).await
}

/// Mux `video` with `audio`, stopping at the shorter stream.
pub async fn mux(
    video: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
    fps: Option<f64>,
) -> MediaResult<()> {
    let video = video.as_ref();
    let audio = audio.as_ref();
    let output = output.as_ref();

    info!(
        video = %video.display(),
        audio = %audio.display(),
        output = %output.display(),
        "Muxing audio and video"
    );

    let cmd = FfmpegCommand::new(video, output)
        .input(audio)
        .map("0:v:0")
        .map("1:a:0");
    let cmd = match fps {
        Some(fps) => cmd.encode_h264(fps),
        None => cmd.option(["-c:v", "copy"]),
    };
    let cmd = cmd.option(["-c:a", "aac", "-b:a", "192k", "-shortest"]);

    FfmpegRunner::new().run(&cmd).await
}
