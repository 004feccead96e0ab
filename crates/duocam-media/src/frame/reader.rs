//! Sequential frame sources.

use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use super::Frame;
use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video_blocking, VideoInfo};

/// A stream of decoded frames.
///
/// `read_next` returning `Ok(None)` means the stream is exhausted, which is
/// not an error. Implementations release their handles on drop as well as
/// on an explicit [`FrameSource::release`].
pub trait FrameSource: Send {
    /// Identifier used in errors and logs (usually the file path).
    fn name(&self) -> String;

    fn fps(&self) -> f64;

    /// Total frames when known up front.
    fn frame_count(&self) -> Option<u64>;

    /// Duration in seconds.
    fn duration(&self) -> f64;

    fn dimensions(&self) -> (u32, u32);

    fn read_next(&mut self) -> MediaResult<Option<Frame>>;

    /// Position the stream so the next read returns the frame at `seconds`.
    fn seek(&mut self, seconds: f64) -> MediaResult<()>;

    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> String {
        (**self).name()
    }
    fn fps(&self) -> f64 {
        (**self).fps()
    }
    fn frame_count(&self) -> Option<u64> {
        (**self).frame_count()
    }
    fn duration(&self) -> f64 {
        (**self).duration()
    }
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }
    fn read_next(&mut self) -> MediaResult<Option<Frame>> {
        (**self).read_next()
    }
    fn seek(&mut self, seconds: f64) -> MediaResult<()> {
        (**self).seek(seconds)
    }
    fn release(&mut self) {
        (**self).release()
    }
}

/// Decodes a video file through an `ffmpeg` rawvideo pipe.
pub struct FfmpegFrameReader {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
}

impl FfmpegFrameReader {
    /// Probe `path` and start decoding from the beginning.
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let info = probe_video_blocking(&path)?;
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{} reports no frame size",
                path.display()
            )));
        }

        let mut reader = Self {
            path,
            info,
            child: None,
            stdout: None,
        };
        reader.spawn_decoder(0.0)?;
        Ok(reader)
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_bytes(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    fn spawn_decoder(&mut self, start: f64) -> MediaResult<()> {
        self.release();
        check_ffmpeg()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        if start > 0.0 {
            cmd.args(["-ss", &format!("{:.3}", start)]);
        }
        cmd.arg("-i")
            .arg(&self.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        debug!(path = %self.path.display(), start, "Starting frame decoder");

        let mut child = cmd.spawn().map_err(|e| {
            MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg decoder: {}", e), None, None)
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;

        self.stdout = Some(BufReader::with_capacity(self.frame_bytes().max(8192), stdout));
        self.child = Some(child);
        Ok(())
    }
}

impl FrameSource for FfmpegFrameReader {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn fps(&self) -> f64 {
        self.info.fps
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.info.estimated_frames())
    }

    fn duration(&self) -> f64 {
        self.info.duration
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn read_next(&mut self) -> MediaResult<Option<Frame>> {
        let (width, height) = (self.info.width, self.info.height);
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };
        let frame = read_rgb24(stdout, width, height);
        if let Err(e) = &frame {
            warn!(path = %self.path.display(), error = %e, "Frame read failed");
        }
        frame
    }

    fn seek(&mut self, seconds: f64) -> MediaResult<()> {
        self.spawn_decoder(seconds.max(0.0))
    }

    fn release(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Read one packed rgb24 frame. A stream ending before the next frame is a
/// clean end; any other read error fails.
fn read_rgb24(stream: &mut impl Read, width: u32, height: u32) -> MediaResult<Option<Frame>> {
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    match stream.read_exact(&mut buffer) {
        Ok(()) => Frame::from_rgb24(width, height, buffer).map(Some),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(MediaError::Io(e)),
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        self.release();
    }
}

/// Frames held in memory, for synthetic inputs and tests.
#[derive(Debug, Clone)]
pub struct MemoryFrameSource {
    name: String,
    frames: Vec<Frame>,
    fps: f64,
    position: usize,
    frames_read: usize,
    released: bool,
}

impl MemoryFrameSource {
    pub fn new(name: impl Into<String>, frames: Vec<Frame>, fps: f64) -> Self {
        Self {
            name: name.into(),
            frames,
            fps,
            position: 0,
            frames_read: 0,
            released: false,
        }
    }

    /// Frames produced by `read_next` so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl FrameSource for MemoryFrameSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frames.len() as f64 / self.fps
        } else {
            0.0
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frames.first().map(Frame::dimensions).unwrap_or((0, 0))
    }

    fn read_next(&mut self) -> MediaResult<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, seconds: f64) -> MediaResult<()> {
        let index = (seconds.max(0.0) * self.fps).round() as usize;
        self.position = index.min(self.frames.len());
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
    }
}
