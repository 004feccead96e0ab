//! Strategy selections for the pipeline stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How the final video is produced from the synchronized pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductionMode {
    /// Switch between cameras frame by frame
    #[default]
    Mixer,
    /// Stitch both views into a panorama with the external stitcher
    Panorama,
}

impl ProductionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionMode::Mixer => "mixer",
            ProductionMode::Panorama => "panorama",
        }
    }
}

impl fmt::Display for ProductionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductionMode {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mixer" => Ok(ProductionMode::Mixer),
            "panorama" => Ok(ProductionMode::Panorama),
            _ => Err(StrategyParseError::new("production mode", s)),
        }
    }
}

/// Camera selection heuristic used by the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MixerKind {
    /// Frame-difference motion, whole frame
    FrameDifference,
    /// Frame-difference motion restricted to the detected field
    #[default]
    FrameDifferenceFieldMask,
    /// Dense-flow action hotspot with exponential smoothing
    ActionHotspot,
}

impl MixerKind {
    pub const ALL: &'static [MixerKind] = &[
        MixerKind::FrameDifference,
        MixerKind::FrameDifferenceFieldMask,
        MixerKind::ActionHotspot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MixerKind::FrameDifference => "abs_diff",
            MixerKind::FrameDifferenceFieldMask => "abs_diff_field_mask",
            MixerKind::ActionHotspot => "action_hotspot",
        }
    }
}

impl fmt::Display for MixerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MixerKind {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abs_diff" => Ok(MixerKind::FrameDifference),
            "abs_diff_field_mask" | "field_mask" => Ok(MixerKind::FrameDifferenceFieldMask),
            "action_hotspot" | "farneback" => Ok(MixerKind::ActionHotspot),
            _ => Err(StrategyParseError::new("mixer", s)),
        }
    }
}

/// Audio offset estimation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMethod {
    /// Plain FFT cross-correlation on raw samples
    #[default]
    FftCrossCorrelation,
    /// Pre-emphasized, normalized, resampled correlation with confidence
    Robust,
}

impl SyncMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMethod::FftCrossCorrelation => "fft",
            SyncMethod::Robust => "robust",
        }
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncMethod {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fft" | "fft_cross_correlation" => Ok(SyncMethod::FftCrossCorrelation),
            "robust" => Ok(SyncMethod::Robust),
            _ => Err(StrategyParseError::new("sync method", s)),
        }
    }
}

/// Clip ordering method. Both are gated by the same chain validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LinkingMethod {
    /// Take the N-1 globally best boundary matches
    #[default]
    GreedyTopK,
    /// Link every last/first pair scoring under the threshold
    Threshold { max_score: f64 },
}

impl LinkingMethod {
    /// Default score threshold for pairwise linking.
    pub const DEFAULT_THRESHOLD: f64 = 10.0;

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkingMethod::GreedyTopK => "greedy_top_k",
            LinkingMethod::Threshold { .. } => "threshold",
        }
    }
}

impl fmt::Display for LinkingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkingMethod {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greedy_top_k" | "greedy" => Ok(LinkingMethod::GreedyTopK),
            "threshold" => Ok(LinkingMethod::Threshold {
                max_score: Self::DEFAULT_THRESHOLD,
            }),
            _ => Err(StrategyParseError::new("linking method", s)),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown {kind}: {value}")]
pub struct StrategyParseError {
    kind: &'static str,
    value: String,
}

impl StrategyParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
