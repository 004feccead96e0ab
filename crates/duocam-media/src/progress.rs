//! Parsing of `ffmpeg -progress pipe:2` output.
//!
//! FFmpeg writes blocks of `key=value` lines, each block closed by a
//! `progress=continue` or `progress=end` line. Everything else on stderr is
//! a diagnostic.

use std::time::Duration;

/// State of a running transcode at the end of one progress block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Timestamp of the last written output frame.
    pub out_time: Duration,
    /// Encoding speed relative to realtime, when FFmpeg knows it.
    pub speed: Option<f64>,
    pub done: bool,
}

impl FfmpegProgress {
    /// Whole percent of `total` written so far.
    pub fn percent_of(&self, total: Duration) -> u8 {
        if self.done {
            return 100;
        }
        if total.is_zero() {
            return 0;
        }
        let ratio = self.out_time.as_secs_f64() / total.as_secs_f64();
        (ratio * 100.0).clamp(0.0, 100.0).round() as u8
    }
}

/// What one stderr line turned out to be.
#[derive(Debug, PartialEq)]
pub enum StderrLine {
    /// A field inside a progress block.
    Field,
    /// The line closing a block.
    Block(FfmpegProgress),
    /// Anything FFmpeg printed that is not progress.
    Diagnostic,
}

/// Folds progress fields into [`FfmpegProgress`] snapshots.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> StderrLine {
        let Some((key, value)) = split_field(line.trim()) else {
            return StderrLine::Diagnostic;
        };

        match key {
            // Both carry microseconds, whatever the name says.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.current.out_time = Duration::from_micros(us);
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                self.current.speed = value.trim_end_matches('x').trim().parse().ok();
            }
            "progress" => {
                self.current.done = value == "end";
                return StderrLine::Block(self.current.clone());
            }
            _ => {}
        }
        StderrLine::Field
    }
}

/// `key=value` with a bare lowercase key, as progress fields are written.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let bare = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    bare.then_some((key, value))
}
