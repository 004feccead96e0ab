//! Decoded video frames and the streams that carry them.
//!
//! A [`Frame`] is an immutable RGB image. Every processing step derives a new
//! image (grayscale, blurred, masked) instead of touching the decoded pixels,
//! so the same frame can be written to the output after it was analyzed.

pub mod ops;
pub mod reader;
pub mod writer;

use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};

pub use reader::{FfmpegFrameReader, FrameSource, MemoryFrameSource};
pub use writer::{FfmpegFrameWriter, FrameSink, MemoryFrameSink};

/// One decoded RGB frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame(RgbImage);

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self(image)
    }

    /// A frame of a single color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// Wrap packed `rgb24` bytes as produced by FFmpeg's rawvideo output.
    pub fn from_rgb24(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = width as usize * height as usize * 3;
        let len = data.len();
        RgbImage::from_raw(width, height, data)
            .map(Self)
            .ok_or_else(|| {
                MediaError::internal(format!(
                    "rgb24 buffer of {} bytes does not hold a {}x{} frame ({} bytes)",
                    len, width, height, expected
                ))
            })
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn pixel_count(&self) -> usize {
        self.0.width() as usize * self.0.height() as usize
    }

    pub fn image(&self) -> &RgbImage {
        &self.0
    }

    pub fn into_image(self) -> RgbImage {
        self.0
    }

    /// Packed rgb24 bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Luma conversion with the Rec. 601 weights used by video tooling.
    pub fn to_gray(&self) -> MediaResult<GrayImage> {
        ops::to_gray(&self.0)
    }

    /// Resized copy; returns a clone when the size already matches.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Frame(image::imageops::resize(&self.0, width, height, FilterType::Triangle))
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self(image)
    }
}

/// Fail unless both frames have the same size.
pub fn ensure_same_dimensions(a: &Frame, b: &Frame) -> MediaResult<()> {
    if a.dimensions() != b.dimensions() {
        return Err(MediaError::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(())
}
