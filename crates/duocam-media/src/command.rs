//! Building and running `ffmpeg` invocations.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::progress::{FfmpegProgress, ProgressParser, StderrLine};

/// Diagnostic lines kept for the error report of a failed run.
const DIAGNOSTIC_LINES: usize = 40;

/// Quality settings for re-encoded video.
const H264_ARGS: [&str; 6] = ["-c:v", "libx264", "-preset", "veryfast", "-crf", "18"];

#[derive(Debug, Clone)]
struct Input {
    /// Options placed before this input's `-i`.
    options: Vec<String>,
    path: PathBuf,
}

/// One `ffmpeg` invocation: any number of inputs and a single output.
///
/// Input options (`seek`, `limit`, `concat_list`) attach to the most
/// recently added input.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<Input>,
    output: PathBuf,
    output_options: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![Input {
                options: Vec::new(),
                path: input.as_ref().to_path_buf(),
            }],
            output: output.as_ref().to_path_buf(),
            output_options: Vec::new(),
        }
    }

    /// Add another input after the existing ones.
    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.inputs.push(Input {
            options: Vec::new(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    fn input_option<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(input) = self.inputs.last_mut() {
            input.options.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Start reading the current input at `seconds`.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_option(["-ss".to_string(), format!("{seconds:.3}")])
    }

    /// Read at most `seconds` of the current input.
    pub fn limit(self, seconds: f64) -> Self {
        self.input_option(["-t".to_string(), format!("{seconds:.3}")])
    }

    /// Treat the current input as a concat demuxer list file.
    pub fn concat_list(self) -> Self {
        self.input_option(["-f", "concat", "-safe", "0"])
    }

    /// Append raw output options.
    pub fn option<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_options.extend(args.into_iter().map(Into::into));
        self
    }

    /// Copy every stream as is.
    pub fn stream_copy(self) -> Self {
        self.option(["-c", "copy"])
    }

    /// Select a stream for the output (`0:v:0`, `1:a:0`, ...).
    pub fn map(self, spec: &str) -> Self {
        self.option(["-map", spec])
    }

    /// Re-encode video with H.264 at `fps`.
    pub fn encode_h264(self, fps: f64) -> Self {
        self.option(["-r".to_string(), format_rate(fps)]).option(H264_ARGS)
    }

    /// Mono 16-bit PCM at `sample_rate`, video dropped.
    pub fn mono_pcm(self, sample_rate: u32) -> Self {
        self.option(["-vn", "-ac", "1", "-c:a", "pcm_s16le", "-ar"])
            .option([sample_rate.to_string()])
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Full argument list, without the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error", "-progress", "pipe:2"]
            .into_iter()
            .map(String::from)
            .collect();

        for input in &self.inputs {
            args.extend(input.options.iter().cloned());
            args.push("-i".into());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.extend(self.output_options.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Frame rate as FFmpeg expects it: "30", "29.970".
fn format_rate(fps: f64) -> String {
    if fps.fract().abs() < 1e-9 {
        format!("{}", fps as i64)
    } else {
        format!("{fps:.3}")
    }
}

/// Last lines of non-progress stderr output.
#[derive(Debug, Default)]
struct Diagnostics(VecDeque<String>);

impl Diagnostics {
    fn push(&mut self, line: String) {
        if self.0.len() == DIAGNOSTIC_LINES {
            self.0.pop_front();
        }
        self.0.push_back(line);
    }

    fn into_text(self) -> Option<String> {
        (!self.0.is_empty()).then(|| Vec::from(self.0).join("\n"))
    }
}

/// Spawns `ffmpeg` and waits for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_observed(cmd, |_| {}).await
    }

    /// Run `cmd`, calling `on_progress` after each progress block.
    ///
    /// When FFmpeg fails, the error carries the tail of its diagnostics.
    pub async fn run_observed<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.args();
        debug!(args = %args.join(" "), "Running ffmpeg");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr not captured"))?;

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::new();
            let mut diagnostics = Diagnostics::default();
            while let Ok(Some(line)) = lines.next_line().await {
                match parser.feed(&line) {
                    StderrLine::Block(progress) => on_progress(progress),
                    StderrLine::Field => {}
                    StderrLine::Diagnostic => diagnostics.push(line),
                }
            }
            diagnostics
        });

        let status = child.wait().await?;
        let diagnostics = reader.await.unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        Err(MediaError::ffmpeg_failed(
            format!("ffmpeg exited with {} writing {}", status, cmd.output().display()),
            diagnostics.into_text(),
            status.code(),
        ))
    }
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
