//! Video properties read with `ffprobe`.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::process::Output;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// What the pipeline needs to know about one video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Evaluated from the stream's rational rate, e.g. 30000/1001
    pub fps: f64,
    /// As reported by the container, if at all
    pub frame_count: Option<u64>,
    pub codec: String,
    /// Demuxer name, e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub container_type: String,
    pub has_audio: bool,
}

impl VideoInfo {
    /// Reported frame count, or duration times rate.
    pub fn estimated_frames(&self) -> u64 {
        match self.frame_count {
            Some(count) => count,
            None => (self.duration * self.fps).round().max(0.0) as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

impl TryFrom<ProbeReport> for VideoInfo {
    type Error = MediaError;

    fn try_from(report: ProbeReport) -> MediaResult<Self> {
        let has_audio = report.streams.iter().any(|s| s.codec_type == "audio");
        let video = report
            .streams
            .into_iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

        // avg_frame_rate is "0/0" for some variable-rate streams.
        let fps = [&video.avg_frame_rate, &video.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|rate| parse_frame_rate(rate))
            .ok_or_else(|| MediaError::InvalidVideo("no usable frame rate".to_string()))?;

        let duration = report
            .format
            .duration
            .or(video.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        Ok(Self {
            duration,
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
            fps,
            frame_count: video.nb_frames.and_then(|n| n.parse().ok()).filter(|n| *n > 0),
            codec: video.codec_name.unwrap_or_default(),
            container_type: report.format.format_name.unwrap_or_default(),
            has_audio,
        })
    }
}

fn probe_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args
}

fn ensure_probeable(path: &Path) -> MediaResult<()> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe().map(|_| ())
}

pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    ensure_probeable(path)?;
    let output = tokio::process::Command::new("ffprobe")
        .args(probe_args(path))
        .output()
        .await?;
    interpret(path, output)
}

/// Same as [`probe_video`], for code already on a blocking thread.
pub fn probe_video_blocking(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    ensure_probeable(path)?;
    let output = std::process::Command::new("ffprobe").args(probe_args(path)).output()?;
    interpret(path, output)
}

fn interpret(path: &Path, output: Output) -> MediaResult<VideoInfo> {
    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("cannot probe {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }
    parse_probe_json(&output.stdout).map_err(|e| match e {
        MediaError::InvalidVideo(reason) => MediaError::InvalidVideo(format!("{}: {}", path.display(), reason)),
        other => other,
    })
}

pub fn parse_probe_json(json: &[u8]) -> MediaResult<VideoInfo> {
    let report: ProbeReport = serde_json::from_slice(json)?;
    VideoInfo::try_from(report)
}

/// "30000/1001", "25/1" or a plain decimal. Zero and non-finite rates are
/// rejected.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.trim().parse::<f64>().ok()? / den
        }
        None => s.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
