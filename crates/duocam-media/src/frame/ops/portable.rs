//! Operations computed on `image` buffers, for builds without OpenCV.

use image::{GrayImage, Luma, RgbImage};
use std::collections::VecDeque;

use super::{default_sigma, ensure_same_size};
use crate::error::{MediaError, MediaResult};

fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> MediaResult<GrayImage> {
    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| MediaError::internal(format!("pixel buffer does not fit {}x{}", width, height)))
}

/// Rec. 601 luma, rounded.
pub fn to_gray(image: &RgbImage) -> MediaResult<GrayImage> {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = src.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        dst.0[0] = luma.round().clamp(0.0, 255.0) as u8;
    }
    Ok(gray)
}

fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    let radius = (ksize / 2) as i32;
    let sigma = if sigma > 0.0 { sigma } else { default_sigma(ksize) };
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Index into `0..len` with reflect-101 border handling.
fn reflect_101(i: i64, len: usize) -> usize {
    let last = len as i64 - 1;
    if last <= 0 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i > last {
        i = if i < 0 { -i } else { 2 * last - i };
    }
    i as usize
}

/// Separable Gaussian blur with an odd `ksize` square kernel.
///
/// A non-positive `sigma` derives one from the kernel size.
pub fn gaussian_blur(image: &GrayImage, ksize: u32, sigma: f32) -> MediaResult<GrayImage> {
    let ksize = ksize.max(1) | 1;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || ksize == 1 {
        return Ok(image.clone());
    }

    let kernel = gaussian_kernel(ksize, sigma);
    let radius = (ksize / 2) as i64;
    let (w, h) = (width as usize, height as usize);
    let src = image.as_raw();

    let mut horizontal = vec![0f32; w * h];
    for (row, out) in src.chunks_exact(w).zip(horizontal.chunks_exact_mut(w)) {
        for (x, value) in out.iter_mut().enumerate() {
            *value = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * row[reflect_101(x as i64 + k as i64 - radius, w)] as f32)
                .sum();
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let acc: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * horizontal[reflect_101(y as i64 + k as i64 - radius, h) * w + x])
                .sum();
            out[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    from_pixels(width, height, out)
}

pub fn absdiff(a: &GrayImage, b: &GrayImage) -> MediaResult<GrayImage> {
    ensure_same_size(a, b)?;
    let pixels = a.as_raw().iter().zip(b.as_raw()).map(|(x, y)| x.abs_diff(*y)).collect();
    from_pixels(a.width(), a.height(), pixels)
}

/// Binary threshold: pixels strictly above `thresh` become 255, others 0.
pub fn threshold(image: &GrayImage, thresh: u8) -> MediaResult<GrayImage> {
    let pixels = image.as_raw().iter().map(|&v| if v > thresh { 255 } else { 0 }).collect();
    from_pixels(image.width(), image.height(), pixels)
}

/// Keep pixels where `mask` is non-zero, zero the rest.
pub fn apply_mask(image: &GrayImage, mask: &GrayImage) -> MediaResult<GrayImage> {
    ensure_same_size(image, mask)?;
    let pixels = image
        .as_raw()
        .iter()
        .zip(mask.as_raw())
        .map(|(&v, &m)| if m == 0 { 0 } else { v })
        .collect();
    from_pixels(image.width(), image.height(), pixels)
}

pub fn sum(image: &GrayImage) -> MediaResult<u64> {
    Ok(image.as_raw().iter().map(|&v| v as u64).sum())
}

/// Mean and population standard deviation of pixel values.
pub fn mean_std(image: &GrayImage) -> MediaResult<(f64, f64)> {
    let data = image.as_raw();
    if data.is_empty() {
        return Ok((0.0, 0.0));
    }
    let n = data.len() as f64;
    let mean = data.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = data.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    Ok((mean, var.sqrt()))
}

/// Running max (or min) over a window of `radius` on both sides, clipped to the line.
fn sliding_extreme(src: &[u8], radius: usize, dst: &mut [u8], take_max: bool) {
    let n = src.len();
    let dominates = |a: u8, b: u8| if take_max { a >= b } else { a <= b };
    let mut window: VecDeque<usize> = VecDeque::with_capacity(2 * radius + 1);
    let mut next = 0;

    for x in 0..n {
        let hi = (x + radius).min(n - 1);
        while next <= hi {
            while window.back().is_some_and(|&back| dominates(src[next], src[back])) {
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }
        let lo = x.saturating_sub(radius);
        while window.front().is_some_and(|&front| front < lo) {
            window.pop_front();
        }
        dst[x] = window.front().map(|&i| src[i]).unwrap_or(src[x]);
    }
}

fn rank_filter(image: &GrayImage, ksize: u32, take_max: bool) -> MediaResult<GrayImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || ksize <= 1 {
        return Ok(image.clone());
    }
    let radius = (ksize / 2) as usize;
    let (w, h) = (width as usize, height as usize);

    let mut rows = vec![0u8; w * h];
    for (src, dst) in image.as_raw().chunks_exact(w).zip(rows.chunks_exact_mut(w)) {
        sliding_extreme(src, radius, dst, take_max);
    }

    let mut out = vec![0u8; w * h];
    let mut column = vec![0u8; h];
    let mut filtered = vec![0u8; h];
    for x in 0..w {
        for y in 0..h {
            column[y] = rows[y * w + x];
        }
        sliding_extreme(&column, radius, &mut filtered, take_max);
        for y in 0..h {
            out[y * w + x] = filtered[y];
        }
    }
    from_pixels(width, height, out)
}

/// Dilation with a `ksize`×`ksize` rectangle.
pub fn dilate(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    rank_filter(image, ksize, true)
}

fn erode(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    rank_filter(image, ksize, false)
}

/// Morphological close (dilate then erode).
pub fn close(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    erode(&dilate(image, ksize)?, ksize)
}

fn histogram_median(histogram: &[u32; 256], rank: u32) -> u8 {
    let mut seen = 0;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u8;
        }
    }
    255
}

/// Median blur with an odd `ksize` square window and replicated borders.
pub fn median_blur(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    let ksize = ksize.max(1) | 1;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || ksize == 1 {
        return Ok(image.clone());
    }

    let radius = (ksize / 2) as i64;
    let (w, h) = (width as i64, height as i64);
    let rank = ksize * ksize / 2;
    let at = |x: i64, y: i64| image.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32).0[0];

    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        let mut histogram = [0u32; 256];
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                histogram[at(dx, y + dy) as usize] += 1;
            }
        }
        out.put_pixel(0, y as u32, Luma([histogram_median(&histogram, rank)]));

        for x in 1..w {
            for dy in -radius..=radius {
                histogram[at(x - 1 - radius, y + dy) as usize] -= 1;
                histogram[at(x + radius, y + dy) as usize] += 1;
            }
            out.put_pixel(x as u32, y as u32, Luma([histogram_median(&histogram, rank)]));
        }
    }
    Ok(out)
}

/// Pixels of the largest 4-connected non-zero region.
fn largest_component(binary: &GrayImage) -> Vec<(u32, u32)> {
    let (width, height) = binary.dimensions();
    let index = |x: u32, y: u32| (y * width + x) as usize;
    let lit = |x: u32, y: u32| binary.get_pixel(x, y).0[0] != 0;
    let mut visited = vec![false; (width * height) as usize];
    let mut largest = Vec::new();
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            if visited[index(x, y)] || !lit(x, y) {
                continue;
            }

            let mut component = Vec::new();
            visited[index(x, y)] = true;
            queue.push_back((x, y));
            while let Some((cx, cy)) = queue.pop_front() {
                component.push((cx, cy));
                let neighbours = [
                    (cx.wrapping_sub(1), cy),
                    (cx + 1, cy),
                    (cx, cy.wrapping_sub(1)),
                    (cx, cy + 1),
                ];
                for (nx, ny) in neighbours {
                    if nx < width && ny < height && !visited[index(nx, ny)] && lit(nx, ny) {
                        visited[index(nx, ny)] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            if component.len() > largest.len() {
                largest = component;
            }
        }
    }
    largest
}

/// The largest non-zero region of a binary image, filled solid.
///
/// Each row of the region is filled between its outermost pixels, which
/// closes holes the way a filled outer contour does.
pub fn fill_largest_region(binary: &GrayImage) -> MediaResult<Option<GrayImage>> {
    let region = largest_component(binary);
    if region.is_empty() {
        return Ok(None);
    }

    let (width, height) = binary.dimensions();
    let mut spans: Vec<Option<(u32, u32)>> = vec![None; height as usize];
    for &(x, y) in &region {
        let span = &mut spans[y as usize];
        *span = Some(match *span {
            Some((lo, hi)) => (lo.min(x), hi.max(x)),
            None => (x, x),
        });
    }

    let mut filled = GrayImage::new(width, height);
    for (y, span) in spans.iter().enumerate() {
        if let Some((lo, hi)) = *span {
            for x in lo..=hi {
                filled.put_pixel(x, y as u32, Luma([255]));
            }
        }
    }
    Ok(Some(filled))
}

/// Horizontal center of mass of a row-major weight map, `None` when it is
/// all zero.
pub fn centroid_x(weights: &[f32], width: u32, height: u32) -> MediaResult<Option<f64>> {
    if weights.len() != width as usize * height as usize {
        return Err(MediaError::internal(format!(
            "{} weights do not fit {}x{}",
            weights.len(),
            width,
            height
        )));
    }
    let (mut m00, mut m10) = (0.0f64, 0.0f64);
    for row in weights.chunks_exact(width.max(1) as usize) {
        for (x, &w) in row.iter().enumerate() {
            m00 += w as f64;
            m10 += w as f64 * x as f64;
        }
    }
    Ok((m00 > 0.0).then(|| m10 / m00))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-3, 1), 0);
    }

    #[test]
    fn test_erode_removes_speck() {
        let speck = GrayImage::from_fn(7, 7, |x, y| Luma([if x == 3 && y == 3 { 255 } else { 0 }]));
        assert_eq!(sum(&erode(&speck, 3).unwrap()).unwrap(), 0);
    }

    #[test]
    fn test_centroid_rejects_wrong_length() {
        assert!(centroid_x(&[1.0; 5], 2, 2).is_err());
    }
}
