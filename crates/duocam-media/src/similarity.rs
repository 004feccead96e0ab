//! Frame dissimilarity used to match clip boundaries.

use crate::error::MediaResult;
use crate::frame::{ensure_same_dimensions, ops, Frame};

/// Pixels differing by more than this count as changed.
pub const DIFF_THRESHOLD: u8 = 50;

/// Dissimilarity of two frames; 0 for identical frames, larger is less similar.
///
/// Both frames are converted to grayscale, differenced and thresholded; the
/// score is the summed 255-valued mask divided by the pixel count, so it lies
/// in `[0, 255]`. Frames of different sizes are rejected, never resized.
pub fn similarity(a: &Frame, b: &Frame) -> MediaResult<f64> {
    ensure_same_dimensions(a, b)?;
    let pixels = a.pixel_count();
    if pixels == 0 {
        return Ok(0.0);
    }

    let diff = ops::absdiff(&a.to_gray()?, &b.to_gray()?)?;
    let mask = ops::threshold(&diff, DIFF_THRESHOLD)?;
    Ok(ops::sum(&mask)? as f64 / pixels as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    #[test]
    fn test_identical_frames_score_zero() {
        let frame = Frame::filled(10, 10, [120, 80, 40]);
        assert_eq!(similarity(&frame, &frame.clone()).unwrap(), 0.0);
    }

    #[test]
    fn test_opposite_frames_score_max() {
        let black = Frame::filled(10, 10, [0, 0, 0]);
        let white = Frame::filled(10, 10, [255, 255, 255]);
        assert_eq!(similarity(&black, &white).unwrap(), 255.0);
    }

    #[test]
    fn test_small_differences_ignored() {
        let a = Frame::filled(10, 10, [100, 100, 100]);
        let b = Frame::filled(10, 10, [140, 140, 140]);
        assert_eq!(similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_partial_change() {
        let a = Frame::filled(10, 10, [0, 0, 0]);
        let mut image = a.image().clone();
        for y in 0..5 {
            for x in 0..10 {
                image.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }
        let b = Frame::new(image);
        assert_eq!(similarity(&a, &b).unwrap(), 127.5);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let a = Frame::filled(10, 10, [0, 0, 0]);
        let b = Frame::filled(10, 12, [0, 0, 0]);
        assert!(matches!(similarity(&a, &b), Err(MediaError::DimensionMismatch { .. })));
    }
}
