//! Mono sample buffers.

/// Mono samples in `[-1.0, 1.0]` at a fixed rate.
///
/// Operations return new signals; a signal is never changed in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Sample index for a time, clamped to the signal.
    pub fn index_at(&self, seconds: f64) -> usize {
        let index = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        index.min(self.samples.len())
    }

    /// Samples in `[start, end)` seconds, clamped to the signal.
    pub fn slice_seconds(&self, start: f64, end: f64) -> AudioSignal {
        let from = self.index_at(start);
        let to = self.index_at(end).max(from);
        AudioSignal::new(self.samples[from..to].to_vec(), self.sample_rate)
    }

    /// The first `max_samples` samples.
    pub fn truncated(&self, max_samples: usize) -> AudioSignal {
        let end = max_samples.min(self.samples.len());
        AudioSignal::new(self.samples[..end].to_vec(), self.sample_rate)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}
