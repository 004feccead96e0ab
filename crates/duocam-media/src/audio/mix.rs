//! Combining the two cameras' audio.

use tracing::info;

use super::signal::AudioSignal;
use super::sync::{estimate_offset_robust, RobustSyncConfig};
use crate::error::{MediaError, MediaResult};

/// Share of each camera in the left and right output channels.
///
/// `left` is camera A's weight in the left channel and `right` camera B's
/// weight in the right channel; the remainder comes from the other camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixRatio {
    pub left: f32,
    pub right: f32,
}

impl Default for MixRatio {
    fn default() -> Self {
        Self {
            left: 0.5,
            right: 0.5,
        }
    }
}

impl MixRatio {
    pub fn new(left: f32, right: f32) -> MediaResult<Self> {
        if !(0.0..=1.0).contains(&left) || !(0.0..=1.0).contains(&right) {
            return Err(MediaError::invalid_config(format!(
                "mix ratio ({}, {}) must lie in [0, 1]",
                left, right
            )));
        }
        Ok(Self { left, right })
    }
}

/// Two-channel audio.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoSignal {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoSignal {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.left.len() as f64 / self.sample_rate as f64
    }
}

/// Scale so the loudest sample reaches 1.0. Silence is returned unchanged.
pub fn normalize_peak(signal: &AudioSignal) -> AudioSignal {
    let peak = signal.peak();
    if peak <= f32::EPSILON {
        return signal.clone();
    }
    AudioSignal::new(
        signal.samples().iter().map(|s| s / peak).collect(),
        signal.sample_rate(),
    )
}

fn check_rates(a: &AudioSignal, b: &AudioSignal) -> MediaResult<()> {
    if a.sample_rate() != b.sample_rate() {
        return Err(MediaError::Audio(format!(
            "cannot mix {} Hz with {} Hz audio",
            a.sample_rate(),
            b.sample_rate()
        )));
    }
    Ok(())
}

fn sample_or_silence(signal: &AudioSignal, i: usize) -> f32 {
    signal.samples().get(i).copied().unwrap_or(0.0)
}

/// Stereo mix of two aligned signals; the shorter one is padded with silence.
///
/// `left = a·l + b·(1 − l)`, `right = a·(1 − r) + b·r`.
pub fn mix_stereo(a: &AudioSignal, b: &AudioSignal, ratio: MixRatio) -> MediaResult<StereoSignal> {
    check_rates(a, b)?;
    let len = a.len().max(b.len());
    let (l, r) = (ratio.left, ratio.right);

    let mut left = Vec::with_capacity(len);
    let mut right = Vec::with_capacity(len);
    for i in 0..len {
        let (sa, sb) = (sample_or_silence(a, i), sample_or_silence(b, i));
        left.push(sa * l + sb * (1.0 - l));
        right.push(sa * (1.0 - r) + sb * r);
    }

    Ok(StereoSignal {
        left,
        right,
        sample_rate: a.sample_rate(),
    })
}

/// Mono sum of two aligned signals, clipped to `[-1, 1]`.
pub fn overlay(a: &AudioSignal, b: &AudioSignal) -> MediaResult<AudioSignal> {
    check_rates(a, b)?;
    let len = a.len().max(b.len());
    let samples = (0..len)
        .map(|i| (sample_or_silence(a, i) + sample_or_silence(b, i)).clamp(-1.0, 1.0))
        .collect();
    Ok(AudioSignal::new(samples, a.sample_rate()))
}

/// Shift a signal by `delay_samples`, keeping its length.
///
/// Positive delays prepend silence and drop the tail; negative delays drop
/// the head and append silence.
pub fn apply_delay(signal: &AudioSignal, delay_samples: i64) -> AudioSignal {
    let len = signal.len();
    let shift = (delay_samples.unsigned_abs() as usize).min(len);
    let samples = signal.samples();

    let mut out = Vec::with_capacity(len);
    if delay_samples >= 0 {
        out.extend(std::iter::repeat(0.0).take(shift));
        out.extend_from_slice(&samples[..len - shift]);
    } else {
        out.extend_from_slice(&samples[shift..]);
        out.extend(std::iter::repeat(0.0).take(shift));
    }
    AudioSignal::new(out, signal.sample_rate())
}

/// Outcome of [`sync_and_mix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncMixResult {
    pub delay_ms: f64,
    pub confidence: f64,
    pub sample_rate: u32,
    /// Mixed duration in seconds
    pub duration: f64,
}

/// Align B onto A with the robust estimator and mix them to stereo.
///
/// Both tracks are padded to the same length, B is shifted by the measured
/// delay and each is peak-normalized before mixing.
pub fn sync_and_mix(
    a: &AudioSignal,
    b: &AudioSignal,
    ratio: MixRatio,
    config: &RobustSyncConfig,
) -> MediaResult<(StereoSignal, SyncMixResult)> {
    check_rates(a, b)?;
    let sync = estimate_offset_robust(a, b, config)?;

    let rate = a.sample_rate();
    let len = a.len().max(b.len());
    let pad = |s: &AudioSignal| {
        let mut samples = s.samples().to_vec();
        samples.resize(len, 0.0);
        AudioSignal::new(samples, rate)
    };

    let delay_samples = (sync.offset_seconds() * rate as f64).round() as i64;
    let a = normalize_peak(&pad(a));
    let b = normalize_peak(&apply_delay(&pad(b), delay_samples));

    let stereo = mix_stereo(&a, &b, ratio)?;
    let result = SyncMixResult {
        delay_ms: sync.delay_ms,
        confidence: sync.confidence,
        sample_rate: rate,
        duration: stereo.duration(),
    };

    info!(
        delay_ms = result.delay_ms,
        confidence = result.confidence,
        duration = result.duration,
        "Synchronized and mixed audio"
    );
    Ok((stereo, result))
}
