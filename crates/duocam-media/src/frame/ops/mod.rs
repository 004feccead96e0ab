//! Pixel operations on grayscale images.
//!
//! With the `opencv` feature every operation runs through OpenCV's `imgproc`
//! and `video` modules. Without it the same operations are computed directly
//! on `image` buffers, following OpenCV's border conventions: the Gaussian
//! blur reflects without repeating the edge pixel, the median blur replicates
//! the edge, and morphology only looks at pixels inside the image.

#[cfg(feature = "opencv")]
mod cv;
#[cfg(not(feature = "opencv"))]
mod portable;

#[cfg(feature = "opencv")]
pub use cv::{
    absdiff, apply_mask, centroid_x, close, dilate, farneback_magnitude, fill_largest_region, gaussian_blur,
    mean_std, median_blur, sum, threshold, to_gray,
};
#[cfg(not(feature = "opencv"))]
pub use portable::{
    absdiff, apply_mask, centroid_x, close, dilate, fill_largest_region, gaussian_blur, mean_std, median_blur, sum,
    threshold, to_gray,
};

use image::GrayImage;

use crate::error::{MediaError, MediaResult};

/// Sigma used for a Gaussian kernel of size `ksize` when none is given.
pub fn default_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn ensure_same_size(a: &GrayImage, b: &GrayImage) -> MediaResult<()> {
    if a.dimensions() != b.dimensions() {
        return Err(MediaError::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(())
}
