//! Frame-difference motion scoring.

use image::GrayImage;

use crate::error::MediaResult;
use crate::frame::{ops, Frame};

/// Blur kernel applied before differencing.
pub const BLUR_KSIZE: u32 = 9;
/// Dilation applied to the raw difference.
pub const DILATE_KSIZE: u32 = 5;
/// Minimum dilated difference that counts as motion.
pub const MOTION_THRESHOLD: u8 = 30;

/// Grayscale and blur a frame, then zero everything outside `mask`.
pub fn prepare_frame(frame: &Frame, mask: Option<&GrayImage>) -> MediaResult<GrayImage> {
    let blurred = ops::gaussian_blur(&frame.to_gray()?, BLUR_KSIZE, 0.0)?;
    match mask {
        Some(mask) => ops::apply_mask(&blurred, mask),
        None => Ok(blurred),
    }
}

/// Binary motion map between two prepared frames.
pub fn absolute_difference_flow(previous: &GrayImage, current: &GrayImage) -> MediaResult<GrayImage> {
    let diff = ops::absdiff(previous, current)?;
    ops::threshold(&ops::dilate(&diff, DILATE_KSIZE)?, MOTION_THRESHOLD)
}

/// Summed mass of the motion map.
pub fn motion_score(previous: &GrayImage, current: &GrayImage) -> MediaResult<u64> {
    ops::sum(&absolute_difference_flow(previous, current)?)
}
