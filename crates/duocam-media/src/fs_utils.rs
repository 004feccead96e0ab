//! Paths and moves for job working directories.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// `EXDEV`: rename across filesystems.
const CROSS_DEVICE: i32 = 18;

/// `<dir>/<prefix>_<name>.<ext>`, e.g. `work/left_concat.mp4`.
pub fn working_file(dir: &Path, prefix: &str, name: &str, ext: &str) -> PathBuf {
    let ext = ext.trim_start_matches('.');
    dir.join(format!("{prefix}_{name}.{ext}"))
}

/// Move `src` to `dst`, creating `dst`'s directory.
///
/// Falls back to copy and delete when the two are on different filesystems;
/// the copy lands under a temporary name first so `dst` never holds a
/// partial file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(dir) = dst.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }

    match fs::rename(src, dst).await {
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE) => {
            debug!(from = %src.display(), to = %dst.display(), "Copying across filesystems");
            copy_then_remove(src, dst).await?;
        }
        other => other?,
    }
    Ok(())
}

async fn copy_then_remove(src: &Path, dst: &Path) -> io::Result<()> {
    let staging = dst.with_extension("partial");
    fs::copy(src, &staging).await?;
    if let Err(e) = fs::rename(&staging, dst).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e);
    }
    if let Err(e) = fs::remove_file(src).await {
        warn!(path = %src.display(), error = %e, "Moved file left behind");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_working_file_strips_dot() {
        let path = working_file(Path::new("/tmp/job"), "right", "cut", ".mov");
        assert_eq!(path, PathBuf::from("/tmp/job/right_cut.mov"));
        assert_eq!(
            working_file(Path::new("w"), "match", "audio", "wav"),
            PathBuf::from("w/match_audio.wav")
        );
    }

    #[tokio::test]
    async fn test_move_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("mixed.mp4");
        let dst = dir.path().join("out").join("final.mp4");
        fs::write(&src, b"frames").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"frames");
    }

    #[tokio::test]
    async fn test_copy_then_remove() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.wav");
        let dst = dir.path().join("b.wav");
        fs::write(&src, b"pcm").await.unwrap();

        copy_then_remove(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(!dir.path().join("b.partial").exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"pcm");
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = move_file(dir.path().join("nope.mp4"), dir.path().join("x.mp4")).await;
        assert!(result.is_err());
    }
}
