//! Dense motion and the action hotspot.
//!
//! Motion is measured on a downscaled gray frame: Farneback optical flow with
//! the `opencv` feature, exhaustive block matching without it. Combined with
//! a mask of bright (player) pixels it gives an "action map" whose horizontal
//! centroid tells where play is happening.

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::error::MediaResult;
#[cfg(not(feature = "opencv"))]
use crate::error::MediaError;
use crate::frame::{ensure_same_dimensions, ops, Frame};

/// Weight of motion magnitude in the action map.
pub const MOTION_WEIGHT: f64 = 0.7;
/// Weight of the player mask in the action map.
pub const PLAYER_WEIGHT: f64 = 0.3;

/// Motion settings. Block size and search radius only apply to block
/// matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    pub block_size: u32,
    pub search_radius: u32,
    /// Frames wider than this are downscaled before matching
    pub analysis_width: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            block_size: 8,
            search_radius: 4,
            analysis_width: 320,
        }
    }
}

impl FlowConfig {
    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size.max(1);
        self
    }

    pub fn with_search_radius(mut self, radius: u32) -> Self {
        self.search_radius = radius;
        self
    }

    pub fn with_analysis_width(mut self, width: u32) -> Self {
        self.analysis_width = width.max(1);
        self
    }
}

/// Per-pixel motion magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub width: u32,
    pub height: u32,
    pub magnitude: Vec<f32>,
}

impl FlowField {
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.magnitude[(y * self.width + x) as usize]
    }

    pub fn max(&self) -> f32 {
        self.magnitude.iter().copied().fold(0.0, f32::max)
    }
}

#[cfg(not(feature = "opencv"))]
fn sad(prev: &GrayImage, cur: &GrayImage, bx: u32, by: u32, bw: u32, bh: u32, dx: i64, dy: i64) -> u32 {
    let mut total = 0u32;
    for y in by..by + bh {
        for x in bx..bx + bw {
            let px = (x as i64 + dx) as u32;
            let py = (y as i64 + dy) as u32;
            total += cur.get_pixel(x, y).0[0].abs_diff(prev.get_pixel(px, py).0[0]) as u32;
        }
    }
    total
}

/// Motion magnitude of `cur` relative to `prev` by block matching.
///
/// Each block of `cur` is searched for in `prev` within the configured
/// radius; ties keep the smaller displacement so flat areas report no motion.
#[cfg(not(feature = "opencv"))]
pub fn block_matching_flow(prev: &GrayImage, cur: &GrayImage, config: &FlowConfig) -> MediaResult<FlowField> {
    if prev.dimensions() != cur.dimensions() {
        return Err(MediaError::DimensionMismatch {
            left: prev.dimensions(),
            right: cur.dimensions(),
        });
    }
    let (width, height) = cur.dimensions();
    let mut magnitude = vec![0.0f32; (width * height) as usize];
    let bs = config.block_size.max(1);
    let radius = config.search_radius as i64;

    for by in (0..height).step_by(bs as usize) {
        for bx in (0..width).step_by(bs as usize) {
            let bw = bs.min(width - bx);
            let bh = bs.min(height - by);

            let mut best = (sad(prev, cur, bx, by, bw, bh, 0, 0), 0i64);
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (x0, y0) = (bx as i64 + dx, by as i64 + dy);
                    if x0 < 0 || y0 < 0 || x0 + bw as i64 > width as i64 || y0 + bh as i64 > height as i64 {
                        continue;
                    }
                    let score = sad(prev, cur, bx, by, bw, bh, dx, dy);
                    let distance = dx * dx + dy * dy;
                    if score < best.0 || (score == best.0 && distance < best.1) {
                        best = (score, distance);
                    }
                }
            }

            let length = (best.1 as f32).sqrt();
            for y in by..by + bh {
                let row = (y * width) as usize;
                magnitude[row + bx as usize..row + (bx + bw) as usize].fill(length);
            }
        }
    }

    Ok(FlowField {
        width,
        height,
        magnitude,
    })
}

/// Per-pixel motion magnitude of `cur` relative to `prev`.
pub fn dense_flow(prev: &GrayImage, cur: &GrayImage, config: &FlowConfig) -> MediaResult<FlowField> {
    let (width, height) = cur.dimensions();

    #[cfg(feature = "opencv")]
    let magnitude = {
        let _ = config;
        ops::farneback_magnitude(prev, cur)?
    };
    #[cfg(not(feature = "opencv"))]
    let magnitude = block_matching_flow(prev, cur, config)?.magnitude;

    Ok(FlowField {
        width,
        height,
        magnitude,
    })
}

/// Pixels brighter than one standard deviation above the mean.
pub fn player_mask(gray: &GrayImage) -> MediaResult<GrayImage> {
    let (mean, std) = ops::mean_std(gray)?;
    ops::threshold(gray, (mean + std).floor().min(255.0) as u8)
}

fn analysis_gray(frame: &Frame, analysis_width: u32) -> MediaResult<(GrayImage, f32)> {
    let gray = frame.to_gray()?;
    let (width, height) = gray.dimensions();
    if width <= analysis_width {
        return Ok((gray, 1.0));
    }
    let scale = analysis_width as f32 / width as f32;
    let target_height = ((height as f32 * scale).round() as u32).max(1);
    let small = imageops::resize(&gray, analysis_width, target_height, FilterType::Triangle);
    Ok((small, 1.0 / scale))
}

/// Normalized horizontal position (0 = left edge, 1 = right edge) of the action.
///
/// Returns 0.5 when the frame carries neither motion nor bright pixels.
pub fn action_hotspot(prev: &Frame, cur: &Frame, config: &FlowConfig) -> MediaResult<f64> {
    ensure_same_dimensions(prev, cur)?;
    let (prev_gray, _) = analysis_gray(prev, config.analysis_width)?;
    let (cur_gray, scale) = analysis_gray(cur, config.analysis_width)?;

    let flow = dense_flow(&prev_gray, &cur_gray, config)?;
    let players = player_mask(&cur_gray)?;

    let weights: Vec<f32> = flow
        .magnitude
        .iter()
        .zip(players.as_raw())
        .map(|(&motion, &player)| {
            (MOTION_WEIGHT * (motion * scale) as f64 + PLAYER_WEIGHT * player as f64) as f32
        })
        .collect();

    let (width, height) = cur_gray.dimensions();
    let cx = match ops::centroid_x(&weights, width, height)? {
        Some(cx) => cx.floor(),
        None => (width / 2) as f64,
    };
    Ok(cx / width as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn square_frame(width: u32, x0: u32) -> Frame {
        Frame::new(RgbImage::from_fn(width, 24, |x, y| {
            if (x0..x0 + 6).contains(&x) && (9..15).contains(&y) {
                Rgb([250, 250, 250])
            } else {
                Rgb([30, 90, 30])
            }
        }))
    }

    #[test]
    fn test_static_frame_has_no_flow() {
        let gray = square_frame(32, 10).to_gray().unwrap();
        let flow = dense_flow(&gray, &gray, &FlowConfig::default()).unwrap();
        assert_eq!((flow.width, flow.height), (32, 24));
        assert!(flow.max() < 1e-3);
    }

    #[test]
    fn test_player_mask_picks_bright_pixels() {
        let gray = square_frame(32, 10).to_gray().unwrap();
        let mask = player_mask(&gray).unwrap();
        assert_eq!(mask.get_pixel(12, 11).0[0], 255);
        assert_eq!(mask.get_pixel(2, 2).0[0], 0);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_shift_is_detected() {
        let prev = GrayImage::from_fn(32, 32, |x, y| image::Luma([((x * 7 + y * 13) % 251) as u8]));
        // Content moves 2 px to the right
        let cur = GrayImage::from_fn(32, 32, |x, y| *prev.get_pixel(x.saturating_sub(2), y));

        let config = FlowConfig::default().with_block_size(8).with_search_radius(3);
        let flow = block_matching_flow(&prev, &cur, &config).unwrap();
        assert_eq!(flow.at(16, 16), 2.0);
    }

    #[test]
    fn test_hotspot_follows_action() {
        let config = FlowConfig::default();
        let right = action_hotspot(&square_frame(64, 46), &square_frame(64, 48), &config).unwrap();
        let left = action_hotspot(&square_frame(64, 6), &square_frame(64, 8), &config).unwrap();

        assert!(right > 0.6, "right {right}");
        assert!(left < 0.4, "left {left}");
    }

    #[test]
    fn test_uniform_frame_is_centered() {
        let frame = Frame::filled(40, 20, [50, 50, 50]);
        assert_eq!(action_hotspot(&frame, &frame, &FlowConfig::default()).unwrap(), 0.5);
    }

    #[test]
    fn test_large_frames_are_downscaled() {
        let config = FlowConfig::default().with_analysis_width(32);
        let pos = action_hotspot(&square_frame(128, 100), &square_frame(128, 104), &config).unwrap();
        assert!(pos > 0.6, "pos {pos}");
    }
}
