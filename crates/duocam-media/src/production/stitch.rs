//! Panorama output through an external stitcher binary.
//!
//! The stitcher is invoked as
//! `<binary> <output_dir> <output_name> <fps> <dry_run> <use_lir> <left> <right>`
//! and prints `PROGRESS: <percent>` lines on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Environment variable naming the stitcher binary.
pub const STITCHER_BIN_ENV: &str = "DUOCAM_STITCHER_BIN";

const DEFAULT_STITCHER_BIN: &str = "image-stitching";

/// How to run the stitcher.
#[derive(Debug, Clone, PartialEq)]
pub struct StitcherConfig {
    pub binary: PathBuf,
    /// Arguments placed before the positional ones
    pub leading_args: Vec<String>,
    /// Crop the panorama to its largest interior rectangle
    pub use_lir: bool,
    pub dry_run: bool,
}

impl Default for StitcherConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_STITCHER_BIN),
            leading_args: Vec::new(),
            use_lir: true,
            dry_run: false,
        }
    }
}

impl StitcherConfig {
    /// Binary from `DUOCAM_STITCHER_BIN`, defaults otherwise.
    pub fn from_env() -> Self {
        match std::env::var(STITCHER_BIN_ENV) {
            Ok(bin) if !bin.trim().is_empty() => Self::default().with_binary(bin.trim()),
            _ => Self::default(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_use_lir(mut self, use_lir: bool) -> Self {
        self.use_lir = use_lir;
        self
    }

    fn tool_name(&self) -> String {
        self.binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.binary.display().to_string())
    }
}

/// Percent from a `PROGRESS: <n>` line.
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let (key, value) = line.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case("progress") {
        return None;
    }
    value.trim().parse::<f64>().ok().map(|p| p.clamp(0.0, 100.0).round() as u8)
}

/// Stitch `left` and `right` into `output`, reporting stitcher progress.
pub async fn stitch<F>(
    config: &StitcherConfig,
    left: &Path,
    right: &Path,
    output: &Path,
    fps: u32,
    progress: F,
) -> MediaResult<PathBuf>
where
    F: Fn(u8) + Send,
{
    let output_dir = match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let output_name = output
        .file_name()
        .ok_or_else(|| MediaError::invalid_config(format!("output {} has no file name", output.display())))?;

    let tool = config.tool_name();
    info!(tool = %tool, left = %left.display(), right = %right.display(), fps, "Stitching panorama");

    let mut child = Command::new(&config.binary)
        .args(&config.leading_args)
        .arg(&output_dir)
        .arg(output_name)
        .arg(fps.to_string())
        .arg(config.dry_run.to_string())
        .arg(config.use_lir.to_string())
        .arg(left)
        .arg(right)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::ExternalToolFailed {
            tool: tool.clone(),
            message: format!("failed to start {}: {}", config.binary.display(), e),
            stderr: None,
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("stitcher stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("stitcher stderr not captured"))?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf).await;
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_progress_line(&line) {
            Some(percent) => progress(percent),
            None => debug!(tool = %tool, "{}", line.trim()),
        }
    }

    let status = child.wait().await?;
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        return Err(MediaError::ExternalToolFailed {
            tool,
            message: format!("exited with {}", status),
            stderr: (!stderr.trim().is_empty()).then(|| stderr.trim().to_string()),
        });
    }

    Ok(output_dir.join(output_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn shell(script: &str) -> StitcherConfig {
        StitcherConfig::default()
            .with_binary("sh")
            .with_leading_args(["-c", script, "stitcher"])
    }

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("PROGRESS: 42"), Some(42));
        assert_eq!(parse_progress_line("progress:100"), Some(100));
        assert_eq!(parse_progress_line("Warping frame 3"), None);
        assert_eq!(parse_progress_line("PROGRESS: soon"), None);
    }

    #[tokio::test]
    async fn test_stitcher_receives_positional_args() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("panorama.mp4");
        // $1 = dir, $2 = name, $3 = fps, $6 = left, $7 = right
        let config = shell(r#"echo "PROGRESS: 50"; echo "$3 $6 $7" > "$1/$2"; echo "PROGRESS: 100""#);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let path = stitch(&config, Path::new("l.mp4"), Path::new("r.mp4"), &output, 25, move |p| {
            sink.lock().unwrap().push(p)
        })
        .await
        .unwrap();

        assert_eq!(path, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap().trim(), "25 l.mp4 r.mp4");
        assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let config = shell("echo 'no overlap between views' >&2; exit 3");

        let err = stitch(&config, Path::new("l.mp4"), Path::new("r.mp4"), &dir.path().join("out.mp4"), 30, |_| {})
            .await
            .unwrap_err();

        match &err {
            MediaError::ExternalToolFailed { tool, .. } => assert_eq!(tool, "sh"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.tool_output(), Some("no overlap between views"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let config = StitcherConfig::default().with_binary("/nonexistent/stitcher");
        let result = stitch(&config, Path::new("l"), Path::new("r"), Path::new("/tmp/out.mp4"), 30, |_| {}).await;
        assert!(matches!(result, Err(MediaError::ExternalToolFailed { .. })));
    }
}
