//! Audio offset estimation.
//!
//! Both cameras record the same crowd noise, whistles and ball strikes, so
//! the lag that maximizes the cross-correlation of their audio is the time
//! offset between the recordings.
//!
//! Sign convention, shared by every consumer of an offset: a positive offset
//! means camera A started recording earlier, so A's first `offset` seconds
//! have no counterpart in B and are trimmed. A negative offset means the same
//! for camera B.

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::{debug, info};

use duocam_models::SyncMethod;

use super::signal::AudioSignal;
use crate::error::{MediaError, MediaResult};

/// Default comparison window in seconds.
pub const DEFAULT_COMPARE_SECONDS: f64 = 180.0;

/// Plain cross-correlation settings.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Only the leading part of long recordings is compared
    pub max_compare_seconds: f64,
    /// Settings for [`SyncMethod::Robust`]
    pub robust: RobustSyncConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_compare_seconds: DEFAULT_COMPARE_SECONDS,
            robust: RobustSyncConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_max_compare_seconds(mut self, seconds: f64) -> Self {
        self.max_compare_seconds = seconds;
        self.robust.max_compare_seconds = seconds;
        self
    }

    pub fn with_robust(mut self, robust: RobustSyncConfig) -> Self {
        self.robust = robust;
        self
    }
}

/// Settings for the pre-emphasized, normalized estimator.
#[derive(Debug, Clone, Copy)]
pub struct RobustSyncConfig {
    /// Both signals are resampled to this rate before correlating
    pub analysis_rate: u32,
    /// First-order high-pass coefficient
    pub pre_emphasis: f32,
    /// Comparison window in seconds
    pub max_compare_seconds: f64,
}

impl Default for RobustSyncConfig {
    fn default() -> Self {
        Self {
            analysis_rate: 22_050,
            pre_emphasis: 0.97,
            max_compare_seconds: DEFAULT_COMPARE_SECONDS,
        }
    }
}

impl RobustSyncConfig {
    pub fn with_analysis_rate(mut self, rate: u32) -> Self {
        self.analysis_rate = rate;
        self
    }

    pub fn with_pre_emphasis(mut self, coefficient: f32) -> Self {
        self.pre_emphasis = coefficient;
        self
    }
}

/// Result of the robust estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustSyncResult {
    /// Offset in milliseconds
    pub delay_ms: f64,
    /// Offset in samples at the analysis rate
    pub delay_samples: i64,
    /// Peak of the normalized correlation
    pub confidence: f64,
    pub analysis_rate: u32,
}

impl RobustSyncResult {
    pub fn offset_seconds(&self) -> f64 {
        self.delay_ms / 1000.0
    }
}

/// Offset from either estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncOutcome {
    pub offset_seconds: f64,
    /// Only the robust estimator reports a confidence
    pub confidence: Option<f64>,
}

/// Estimate the offset between two recordings with the chosen method.
pub fn estimate(
    method: SyncMethod,
    a: &AudioSignal,
    b: &AudioSignal,
    config: &SyncConfig,
) -> MediaResult<SyncOutcome> {
    let outcome = match method {
        SyncMethod::FftCrossCorrelation => {
            if a.sample_rate() != b.sample_rate() {
                return Err(MediaError::Audio(format!(
                    "sample rates differ: {} vs {}",
                    a.sample_rate(),
                    b.sample_rate()
                )));
            }
            SyncOutcome {
                offset_seconds: estimate_offset(
                    a.samples(),
                    b.samples(),
                    a.sample_rate(),
                    config.max_compare_seconds,
                )?,
                confidence: None,
            }
        }
        SyncMethod::Robust => {
            let result = estimate_offset_robust(a, b, &config.robust)?;
            SyncOutcome {
                offset_seconds: result.offset_seconds(),
                confidence: Some(result.confidence),
            }
        }
    };

    info!(
        method = %method,
        offset = outcome.offset_seconds,
        confidence = ?outcome.confidence,
        "Estimated audio offset"
    );
    Ok(outcome)
}

/// Circular cross-correlation `corr[k] = Σ a[n + k]·b[n]` over `size` points.
fn cross_correlate(a: &[f32], b: &[f32], size: usize) -> Vec<Complex<f64>> {
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let padded = |signal: &[f32]| -> Vec<Complex<f64>> {
        let mut buffer = vec![Complex::new(0.0, 0.0); size];
        for (slot, &s) in buffer.iter_mut().zip(signal) {
            slot.re = s as f64;
        }
        buffer
    };

    let mut spectrum_a = padded(a);
    let mut spectrum_b = padded(b);
    forward.process(&mut spectrum_a);
    forward.process(&mut spectrum_b);

    let mut corr: Vec<Complex<f64>> = spectrum_a
        .iter()
        .zip(&spectrum_b)
        .map(|(x, y)| x * y.conj())
        .collect();
    inverse.process(&mut corr);

    let scale = 1.0 / size as f64;
    corr.iter_mut().for_each(|c| *c *= scale);
    corr
}

/// Offset in seconds between two equally sampled signals.
///
/// When both signals are longer than `max_compare_seconds`, only that many
/// leading seconds are compared. The signals are zero-padded to the next
/// power of two above `len(a) + len(b)` so the correlation is linear.
pub fn estimate_offset(a: &[f32], b: &[f32], sample_rate: u32, max_compare_seconds: f64) -> MediaResult<f64> {
    if a.is_empty() || b.is_empty() {
        return Err(MediaError::EmptyInput("audio signal has no samples".to_string()));
    }
    if sample_rate == 0 {
        return Err(MediaError::invalid_config("sample rate must be positive"));
    }

    let limit = (max_compare_seconds * sample_rate as f64).max(0.0) as usize;
    let (a, b) = if limit > 0 && a.len() > limit && b.len() > limit {
        (&a[..limit], &b[..limit])
    } else {
        (a, b)
    };

    let padsize = (a.len() + b.len() + 1).next_power_of_two();
    let corr = cross_correlate(a, b, padsize);

    let xmax = corr
        .iter()
        .enumerate()
        .max_by(|(_, x), (_, y)| x.norm().total_cmp(&y.norm()))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let offset = if xmax > padsize / 2 {
        // b[n] lines up with a[n - (padsize - xmax)]: B has extra lead-in
        -((padsize - xmax) as f64 / sample_rate as f64)
    } else {
        xmax as f64 / sample_rate as f64
    };

    debug!(padsize, xmax, offset, "FFT cross-correlation peak");
    Ok(offset)
}

/// `y[n] = x[n] - coefficient·x[n - 1]`, attenuating low-frequency rumble.
pub fn pre_emphasis(samples: &[f32], coefficient: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len());
    let mut previous = 0.0;
    for (i, &s) in samples.iter().enumerate() {
        out.push(if i == 0 { s } else { s - coefficient * previous });
        previous = s;
    }
    out
}

/// Scale to unit energy. Silent input is returned unchanged.
pub fn normalize_energy(samples: &[f32]) -> Vec<f32> {
    let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    if energy <= f64::EPSILON {
        return samples.to_vec();
    }
    let norm = energy.sqrt() as f32;
    samples.iter().map(|&s| s / norm).collect()
}

/// Resample mono samples to `to_rate`.
///
/// Integer ratios are handled by averaging consecutive samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> MediaResult<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(MediaError::invalid_config("sample rate must be positive"));
    }

    if from_rate % to_rate == 0 {
        let factor = (from_rate / to_rate) as usize;
        return Ok(samples
            .chunks(factor)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect());
    }

    let params = SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 64,
        window: rubato::WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .map_err(|e| MediaError::Resample(e.to_string()))?;

    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| MediaError::Resample(e.to_string()))?;
    Ok(output.pop().unwrap_or_default())
}

/// Offset estimation on pre-emphasized, energy-normalized signals.
///
/// Both signals are resampled to a common analysis rate and cut to the same
/// length. The reported confidence is the correlation peak, which approaches
/// 1.0 for identical content.
pub fn estimate_offset_robust(
    a: &AudioSignal,
    b: &AudioSignal,
    config: &RobustSyncConfig,
) -> MediaResult<RobustSyncResult> {
    if a.is_empty() || b.is_empty() {
        return Err(MediaError::EmptyInput("audio signal has no samples".to_string()));
    }

    let rate = config.analysis_rate;
    let ya = resample(a.samples(), a.sample_rate(), rate)?;
    let yb = resample(b.samples(), b.sample_rate(), rate)?;

    let mut length = ya.len().min(yb.len());
    if config.max_compare_seconds > 0.0 {
        length = length.min((config.max_compare_seconds * rate as f64) as usize);
    }
    if length == 0 {
        return Err(MediaError::EmptyInput("audio signal too short to compare".to_string()));
    }

    let ya = normalize_energy(&pre_emphasis(&ya[..length], config.pre_emphasis));
    let yb = normalize_energy(&pre_emphasis(&yb[..length], config.pre_emphasis));

    // Full linear correlation; lags -(length-1)..=(length-1)
    let size = (2 * length).next_power_of_two();
    let corr = cross_correlate(&ya, &yb, size);
    let max_lag = length as i64 - 1;

    let (lag, peak) = (-max_lag..=max_lag)
        .map(|lag| {
            let index = if lag >= 0 { lag as usize } else { size - (-lag) as usize };
            (lag, corr[index].re)
        })
        .max_by(|x, y| x.1.total_cmp(&y.1))
        .unwrap_or((0, 0.0));

    let delay_ms = lag as f64 / rate as f64 * 1000.0;
    debug!(lag, peak, delay_ms, "Robust correlation peak");

    Ok(RobustSyncResult {
        delay_ms,
        delay_samples: lag,
        confidence: peak,
        analysis_rate: rate,
    })
}
