//! Playing-field detection.
//!
//! The field is the largest bright region of a heavily smoothed frame. The
//! mask keeps the mixers' motion scores from reacting to spectators, benches
//! and passing traffic outside the pitch.

use image::GrayImage;
use tracing::debug;

use crate::error::MediaResult;
use crate::frame::{ops, Frame};

/// Kernel sizes and threshold for [`mask_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMaskConfig {
    /// Median blur window, removes lines and players
    pub median_ksize: u32,
    /// Gray level above which a pixel counts as field
    pub threshold: u8,
    /// Closing rectangle, bridges gaps in the field region
    pub close_ksize: u32,
}

impl Default for FieldMaskConfig {
    fn default() -> Self {
        Self {
            median_ksize: 51,
            threshold: 100,
            close_ksize: 151,
        }
    }
}

impl FieldMaskConfig {
    pub fn with_median_ksize(mut self, ksize: u32) -> Self {
        self.median_ksize = ksize;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_close_ksize(mut self, ksize: u32) -> Self {
        self.close_ksize = ksize;
        self
    }
}

/// Binary mask (255 = field) for a frame.
///
/// The largest region is filled solid, so goal mouths and players standing
/// on the line stay inside. When no bright region exists the whole frame is
/// kept.
pub fn mask_field(frame: &Frame, config: &FieldMaskConfig) -> MediaResult<GrayImage> {
    let (width, height) = frame.dimensions();
    let gray = ops::median_blur(&frame.to_gray()?, config.median_ksize)?;
    let binary = ops::close(&ops::threshold(&gray, config.threshold)?, config.close_ksize)?;

    match ops::fill_largest_region(&binary)? {
        Some(mask) => {
            debug!(width, height, field_pixels = ops::sum(&mask)? / 255, "Computed field mask");
            Ok(mask)
        }
        None => {
            debug!(width, height, "No field region found, using the whole frame");
            Ok(GrayImage::from_pixel(width, height, image::Luma([255])))
        }
    }
}
