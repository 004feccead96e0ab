//! Frame sinks.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;
use tracing::debug;

use super::Frame;
use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// Destination for output frames.
///
/// Frames whose size differs from the sink's output size are resized.
pub trait FrameSink: Send {
    fn write(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the output. Further writes fail.
    fn finish(&mut self) -> MediaResult<()>;

    fn frames_written(&self) -> u64;
}

/// Encoder diagnostic lines kept for error reports.
const STDERR_TAIL_LINES: usize = 40;

/// Read `stream` to the end on its own thread, keeping the last lines.
///
/// The encoder blocks once its stderr pipe is full, so the pipe has to be
/// emptied while frames are still being written.
fn drain_stderr<R: Read + Send + 'static>(stream: R) -> JoinHandle<Option<String>> {
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stream).split(b'\n').map_while(Result::ok) {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        (!tail.is_empty()).then(|| Vec::from(tail).join("\n"))
    })
}

/// Encodes frames with libx264 through an `ffmpeg` stdin pipe.
pub struct FfmpegFrameWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<Option<String>>>,
    written: u64,
}

impl FfmpegFrameWriter {
    /// Start an encoder writing `width`×`height` frames at `fps` to `path`.
    pub fn create(path: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        if width == 0 || height == 0 || fps <= 0.0 {
            return Err(MediaError::invalid_config(format!(
                "cannot encode {}x{} at {} fps",
                width, height, fps
            )));
        }
        check_ffmpeg()?;

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &format!("{}", fps)])
            .args(["-i", "-"])
            .args(["-an", "-c:v", "libx264", "-preset", "veryfast", "-crf", "18"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg encoder: {}", e), None, None)
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("Failed to capture FFmpeg stdin", None, None))?;
        let stderr = child.stderr.take().map(drain_stderr);

        debug!(path = %path.display(), width, height, fps, "Started frame encoder");

        Ok(Self {
            path,
            width,
            height,
            child: Some(child),
            stdin: Some(BufWriter::new(stdin)),
            stderr,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the encoder to exit and collect what it printed.
    fn reap(&mut self) -> MediaResult<(Option<std::process::ExitStatus>, Option<String>)> {
        self.stdin = None;
        let status = match self.child.take() {
            Some(mut child) => Some(child.wait()?),
            None => None,
        };
        let stderr = self.stderr.take().and_then(|handle| handle.join().ok().flatten());
        Ok((status, stderr))
    }
}

impl FrameSink for FfmpegFrameWriter {
    fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("write after encoder was finished"))?;

        let resized;
        let frame = if frame.dimensions() == (self.width, self.height) {
            frame
        } else {
            resized = frame.resized(self.width, self.height);
            &resized
        };

        if let Err(e) = stdin.write_all(frame.as_bytes()) {
            // Encoder died; surface its own diagnostics
            let (status, stderr) = self.reap()?;
            return Err(MediaError::ffmpeg_failed(
                format!("FFmpeg encoder rejected frame {}: {}", self.written, e),
                stderr,
                status.and_then(|s| s.code()),
            ));
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }
        let (status, stderr) = self.reap()?;
        match status {
            None => Ok(()),
            Some(status) if status.success() => {
                debug!(path = %self.path.display(), frames = self.written, "Frame encoder finished");
                Ok(())
            }
            Some(status) => Err(MediaError::ffmpeg_failed(
                format!("FFmpeg encoder failed for {}", self.path.display()),
                stderr,
                status.code(),
            )),
        }
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        let _ = self.reap();
    }
}

/// Collects frames in memory.
#[derive(Debug, Default)]
pub struct MemoryFrameSink {
    size: Option<(u32, u32)>,
    frames: Vec<Frame>,
    finished: bool,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize every written frame to `width`×`height`.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for MemoryFrameSink {
    fn write(&mut self, frame: &Frame) -> MediaResult<()> {
        if self.finished {
            return Err(MediaError::internal("write after sink was finished"));
        }
        let frame = match self.size {
            Some((w, h)) => frame.resized(w, h),
            None => frame.clone(),
        };
        self.frames.push(frame);
        Ok(())
    }

    fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_resizes() {
        let mut sink = MemoryFrameSink::with_size(2, 2);
        sink.write(&Frame::filled(8, 8, [1, 2, 3])).unwrap();
        assert_eq!(sink.frames()[0].dimensions(), (2, 2));
        assert_eq!(sink.frames_written(), 1);
    }

    #[test]
    fn test_memory_sink_rejects_write_after_finish() {
        let mut sink = MemoryFrameSink::new();
        sink.finish().unwrap();
        assert!(sink.is_finished());
        assert!(sink.write(&Frame::filled(1, 1, [0, 0, 0])).is_err());
    }

    #[test]
    fn test_drain_keeps_the_tail() {
        let text: String = (0..1000).map(|i| format!("warning {i}\n")).collect();
        let tail = drain_stderr(std::io::Cursor::new(text)).join().unwrap().unwrap();
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.starts_with("warning 960"));
        assert!(tail.ends_with("warning 999"));
        assert_eq!(drain_stderr(std::io::empty()).join().unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_child_does_not_block() {
        // Far more than a pipe buffer holds, written before the child reads stdin
        let mut child = Command::new("sh")
            .args(["-c", "i=0; while [ $i -lt 4000 ]; do echo \"frame $i: non-monotonic dts\" >&2; i=$((i+1)); done; cat > /dev/null"])
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let stderr = drain_stderr(child.stderr.take().unwrap());
        child.stdin.take().unwrap().write_all(&[0u8; 1 << 16]).unwrap();

        assert!(child.wait().unwrap().success());
        let tail = stderr.join().unwrap().unwrap();
        assert!(tail.ends_with("frame 3999: non-monotonic dts"));
    }

    #[test]
    fn test_encoder_rejects_bad_geometry() {
        let result = FfmpegFrameWriter::create("/tmp/out.mp4", 0, 720, 30.0);
        assert!(matches!(result, Err(MediaError::InvalidConfig(_))));
    }
}
