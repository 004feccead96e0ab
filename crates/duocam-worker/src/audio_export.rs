//! Audio-only sync: align camera B's track onto camera A's and write the mix.
//!
//! Used when only the sound of a match is wanted, e.g. to check a pair of
//! recordings before running the full pipeline.

use std::path::Path;
use tracing::info;

use duocam_media::audio::{
    overlay, read_mono, sync_and_mix, write_mono, write_stereo, AudioSignal, MixRatio, RobustSyncConfig,
    SyncMixResult, WavEncoding,
};

use crate::error::{WorkerError, WorkerResult};

/// Channel layout of the exported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioLayout {
    /// A mostly left, B mostly right, per the mix ratio
    #[default]
    Stereo,
    /// Both cameras summed into one channel
    Mono,
}

/// Read two WAV tracks, align B onto A and write the result to `output`.
pub async fn export_synced_audio(
    camera_a: &Path,
    camera_b: &Path,
    output: &Path,
    layout: AudioLayout,
    ratio: MixRatio,
) -> WorkerResult<SyncMixResult> {
    let (a, b, output) = (camera_a.to_path_buf(), camera_b.to_path_buf(), output.to_path_buf());
    let result = tokio::task::spawn_blocking(move || write_synced(&a, &b, &output, layout, ratio))
        .await
        .map_err(|e| WorkerError::task_failed(format!("audio export task failed: {e}")))??;

    info!(
        delay_ms = result.delay_ms,
        confidence = result.confidence,
        layout = ?layout,
        "Exported synchronized audio"
    );
    Ok(result)
}

fn write_synced(
    camera_a: &Path,
    camera_b: &Path,
    output: &Path,
    layout: AudioLayout,
    ratio: MixRatio,
) -> WorkerResult<SyncMixResult> {
    let a = read_mono(camera_a)?;
    let b = read_mono(camera_b)?;
    let config = RobustSyncConfig::default();

    match layout {
        AudioLayout::Stereo => {
            let (stereo, result) = sync_and_mix(&a, &b, ratio, &config)?;
            write_stereo(output, &stereo, WavEncoding::Pcm16)?;
            Ok(result)
        }
        AudioLayout::Mono => {
            // Full separation keeps each aligned track in its own channel
            let (aligned, result) = sync_and_mix(&a, &b, MixRatio::new(1.0, 1.0)?, &config)?;
            let rate = aligned.sample_rate;
            let merged = overlay(&AudioSignal::new(aligned.left, rate), &AudioSignal::new(aligned.right, rate))?;
            write_mono(output, &merged, WavEncoding::Pcm16)?;
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Same as the robust estimator's analysis rate, so nothing is resampled.
    const RATE: u32 = 22_050;

    fn crowd_noise(len: usize) -> Vec<f32> {
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32 - 0.5) * 0.8
            })
            .collect()
    }

    fn recordings(dir: &TempDir, lead: usize) -> (Vec<f32>, PathBuf, PathBuf) {
        let scene = crowd_noise(RATE as usize * 3);
        let a = dir.path().join("left.wav");
        let b = dir.path().join("right.wav");
        write_mono(&a, &AudioSignal::new(scene.clone(), RATE), WavEncoding::Float32).unwrap();
        write_mono(&b, &AudioSignal::new(scene[lead..].to_vec(), RATE), WavEncoding::Float32).unwrap();
        (scene, a, b)
    }

    #[tokio::test]
    async fn test_stereo_export_reports_delay() {
        let dir = TempDir::new().unwrap();
        let (_, a, b) = recordings(&dir, RATE as usize / 4);
        let output = dir.path().join("synced.wav");

        let result = export_synced_audio(&a, &b, &output, AudioLayout::Stereo, MixRatio::default())
            .await
            .unwrap();

        assert!((result.delay_ms - 250.0).abs() < 0.5, "{result:?}");
        assert_eq!(result.sample_rate, RATE);
        let spec = hound::WavReader::open(&output).unwrap().spec();
        assert_eq!(spec.channels, 2);
    }

    #[tokio::test]
    async fn test_mono_export_sums_aligned_tracks() {
        let dir = TempDir::new().unwrap();
        let lead = RATE as usize / 2;
        let (scene, a, b) = recordings(&dir, lead);
        let output = dir.path().join("synced.wav");

        let result = export_synced_audio(&a, &b, &output, AudioLayout::Mono, MixRatio::default())
            .await
            .unwrap();
        assert!((result.delay_ms - 500.0).abs() < 0.5, "{result:?}");

        let merged = read_mono(&output).unwrap();
        assert_eq!(merged.len(), RATE as usize * 3);
        assert!((merged.duration() - result.duration).abs() < 1e-9);

        // B is silent until its late start, so the head is A alone at full scale
        let peak = scene.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        for (merged, original) in merged.samples()[..lead].iter().zip(&scene) {
            assert!((merged - original / peak).abs() < 1e-3);
        }
    }

    #[tokio::test]
    async fn test_missing_track_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("none.wav");
        let output = dir.path().join("o.wav");
        let result = export_synced_audio(&missing, &missing, &output, AudioLayout::Stereo, MixRatio::default()).await;
        assert!(matches!(result, Err(WorkerError::Media(_))));
    }
}
