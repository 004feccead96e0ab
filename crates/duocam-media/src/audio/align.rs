//! The overlapping, synchronized window of two recordings.
//!
//! One [`SyncWindow`] is computed from the estimated offset and then used for
//! every cut: both videos, both audio tracks and the user's start/end range.

use duocam_models::TimeRange;

use super::signal::AudioSignal;
use crate::error::{MediaError, MediaResult};

/// Where each recording's synchronized part starts, and how long it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncWindow {
    pub offset: f64,
    pub a_start: f64,
    pub b_start: f64,
    pub duration: f64,
}

impl SyncWindow {
    /// Window for recordings of `duration_a` and `duration_b` seconds.
    ///
    /// The overlap lasts `min(duration_a, duration_b) - |offset|`. A positive
    /// offset trims A's start, otherwise B's.
    pub fn compute(offset: f64, duration_a: f64, duration_b: f64) -> MediaResult<Self> {
        let duration = duration_a.min(duration_b) - offset.abs();
        if !duration.is_finite() || duration <= 0.0 {
            return Err(MediaError::invalid_config(format!(
                "recordings do not overlap (durations {:.3}s / {:.3}s, offset {:.3}s)",
                duration_a, duration_b, offset
            )));
        }

        let (a_start, b_start) = if offset > 0.0 { (offset, 0.0) } else { (0.0, -offset) };

        Ok(Self {
            offset,
            a_start,
            b_start,
            duration,
        })
    }

    /// `[start, end]` on camera A's original timeline.
    pub fn a_range(&self) -> (f64, f64) {
        (self.a_start, self.a_start + self.duration)
    }

    /// `[start, end]` on camera B's original timeline.
    pub fn b_range(&self) -> (f64, f64) {
        (self.b_start, self.b_start + self.duration)
    }

    /// Map a user range on A's original timeline into the synchronized timeline.
    ///
    /// Times shift by `-offset` when A was trimmed and stay put otherwise,
    /// then get clamped to `[0, duration]`. Returns `None` when no range was
    /// requested.
    pub fn adjust_time_range(&self, range: &TimeRange) -> MediaResult<Option<(f64, f64)>> {
        if range.is_unbounded() {
            return Ok(None);
        }

        let shift = self.a_start;
        let clamp = |t: f64| (t - shift).clamp(0.0, self.duration);
        let start = range.start.map(clamp).unwrap_or(0.0);
        let end = range.end.map(clamp).unwrap_or(self.duration);

        if end <= start {
            return Err(MediaError::invalid_config(format!(
                "requested range falls outside the synchronized {:.3}s",
                self.duration
            )));
        }
        Ok(Some((start, end)))
    }

    /// The part of this window between `start` and `end` seconds of the
    /// synchronized timeline, as returned by [`adjust_time_range`](Self::adjust_time_range).
    pub fn restrict(&self, start: f64, end: f64) -> Self {
        let start = start.clamp(0.0, self.duration);
        let end = end.clamp(start, self.duration);
        Self {
            offset: self.offset,
            a_start: self.a_start + start,
            b_start: self.b_start + start,
            duration: end - start,
        }
    }

    /// Cut both signals to the synchronized window.
    pub fn align(&self, a: &AudioSignal, b: &AudioSignal) -> (AudioSignal, AudioSignal) {
        let (a_from, a_to) = self.a_range();
        let (b_from, b_to) = self.b_range();
        (a.slice_seconds(a_from, a_to), b.slice_seconds(b_from, b_to))
    }
}
