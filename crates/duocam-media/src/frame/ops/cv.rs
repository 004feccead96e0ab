//! Operations backed by OpenCV.

use image::{GrayImage, RgbImage};
use opencv::{
    core::{self, Mat, Point, Scalar, Size, Vector, CV_8UC1},
    imgproc,
    prelude::*,
    video,
};

use super::{default_sigma, ensure_same_size};
use crate::error::{MediaError, MediaResult};

fn cv_err(op: &'static str) -> impl Fn(opencv::Error) -> MediaError {
    move |e| MediaError::ImageProcessing(format!("{op}: {e}"))
}

fn gray_mat(image: &GrayImage) -> MediaResult<Mat> {
    let (width, height) = image.dimensions();
    let view = Mat::new_rows_cols_with_data(height as i32, width as i32, image.as_raw().as_slice())
        .map_err(cv_err("wrap gray"))?;
    view.try_clone().map_err(cv_err("wrap gray"))
}

fn rgb_mat(image: &RgbImage) -> MediaResult<Mat> {
    let (width, height) = image.dimensions();
    let flat = Mat::new_rows_cols_with_data(height as i32, width as i32 * 3, image.as_raw().as_slice())
        .map_err(cv_err("wrap rgb"))?;
    let view = flat.reshape(3, height as i32).map_err(cv_err("wrap rgb"))?;
    view.try_clone().map_err(cv_err("wrap rgb"))
}

fn to_image(mat: &Mat) -> MediaResult<GrayImage> {
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let bytes = mat.data_bytes().map_err(cv_err("read pixels"))?.to_vec();
    GrayImage::from_raw(width, height, bytes)
        .ok_or_else(|| MediaError::internal(format!("pixel buffer does not fit {}x{}", width, height)))
}

fn rect_kernel(ksize: u32) -> MediaResult<Mat> {
    let k = ksize.max(1) as i32;
    imgproc::get_structuring_element_def(imgproc::MORPH_RECT, Size::new(k, k)).map_err(cv_err("kernel"))
}

pub fn to_gray(image: &RgbImage) -> MediaResult<GrayImage> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(&rgb_mat(image)?, &mut gray, imgproc::COLOR_RGB2GRAY).map_err(cv_err("cvt_color"))?;
    to_image(&gray)
}

/// A non-positive `sigma` derives one from the kernel size.
pub fn gaussian_blur(image: &GrayImage, ksize: u32, sigma: f32) -> MediaResult<GrayImage> {
    let ksize = ksize.max(1) | 1;
    let sigma = if sigma > 0.0 { sigma } else { default_sigma(ksize) };
    let mut blurred = Mat::default();
    let k = ksize as i32;
    imgproc::gaussian_blur_def(&gray_mat(image)?, &mut blurred, Size::new(k, k), sigma as f64)
        .map_err(cv_err("gaussian_blur"))?;
    to_image(&blurred)
}

pub fn median_blur(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    let mut blurred = Mat::default();
    imgproc::median_blur(&gray_mat(image)?, &mut blurred, (ksize.max(1) | 1) as i32)
        .map_err(cv_err("median_blur"))?;
    to_image(&blurred)
}

pub fn absdiff(a: &GrayImage, b: &GrayImage) -> MediaResult<GrayImage> {
    ensure_same_size(a, b)?;
    let mut diff = Mat::default();
    core::absdiff(&gray_mat(a)?, &gray_mat(b)?, &mut diff).map_err(cv_err("absdiff"))?;
    to_image(&diff)
}

/// Pixels strictly above `thresh` become 255, others 0.
pub fn threshold(image: &GrayImage, thresh: u8) -> MediaResult<GrayImage> {
    let mut binary = Mat::default();
    imgproc::threshold(&gray_mat(image)?, &mut binary, thresh as f64, 255.0, imgproc::THRESH_BINARY)
        .map_err(cv_err("threshold"))?;
    to_image(&binary)
}

pub fn dilate(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    let mut dilated = Mat::default();
    imgproc::dilate_def(&gray_mat(image)?, &mut dilated, &rect_kernel(ksize)?).map_err(cv_err("dilate"))?;
    to_image(&dilated)
}

pub fn close(image: &GrayImage, ksize: u32) -> MediaResult<GrayImage> {
    let mut closed = Mat::default();
    imgproc::morphology_ex_def(&gray_mat(image)?, &mut closed, imgproc::MORPH_CLOSE, &rect_kernel(ksize)?)
        .map_err(cv_err("morphology_ex"))?;
    to_image(&closed)
}

pub fn apply_mask(image: &GrayImage, mask: &GrayImage) -> MediaResult<GrayImage> {
    ensure_same_size(image, mask)?;
    let (width, height) = image.dimensions();
    let mut masked = Mat::zeros(height as i32, width as i32, CV_8UC1)
        .and_then(|zeros| zeros.to_mat())
        .map_err(cv_err("zeros"))?;
    gray_mat(image)?
        .copy_to_masked(&mut masked, &gray_mat(mask)?)
        .map_err(cv_err("copy_to"))?;
    to_image(&masked)
}

pub fn sum(image: &GrayImage) -> MediaResult<u64> {
    let total = core::sum_elems(&gray_mat(image)?).map_err(cv_err("sum"))?;
    Ok(total[0].max(0.0) as u64)
}

/// Mean and population standard deviation of pixel values.
pub fn mean_std(image: &GrayImage) -> MediaResult<(f64, f64)> {
    let (mut mean, mut std) = (Mat::default(), Mat::default());
    core::mean_std_dev_def(&gray_mat(image)?, &mut mean, &mut std).map_err(cv_err("mean_std_dev"))?;
    let mean = *mean.at::<f64>(0).map_err(cv_err("mean_std_dev"))?;
    let std = *std.at::<f64>(0).map_err(cv_err("mean_std_dev"))?;
    Ok((mean, std))
}

/// The largest external contour of a binary image, filled solid.
pub fn fill_largest_region(binary: &GrayImage) -> MediaResult<Option<GrayImage>> {
    let mut contours: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours_def(
        &gray_mat(binary)?,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
    )
    .map_err(cv_err("find_contours"))?;

    let mut largest: Option<(usize, f64)> = None;
    for (i, contour) in contours.iter().enumerate() {
        let area = imgproc::contour_area_def(&contour).map_err(cv_err("contour_area"))?;
        if largest.map_or(true, |(_, best)| area > best) {
            largest = Some((i, area));
        }
    }
    let Some((index, _)) = largest else {
        return Ok(None);
    };

    let (width, height) = binary.dimensions();
    let mut filled = Mat::zeros(height as i32, width as i32, CV_8UC1)
        .and_then(|zeros| zeros.to_mat())
        .map_err(cv_err("zeros"))?;
    imgproc::draw_contours(
        &mut filled,
        &contours,
        index as i32,
        Scalar::all(255.0),
        imgproc::FILLED,
        imgproc::LINE_8,
        &core::no_array(),
        i32::MAX,
        Point::new(0, 0),
    )
    .map_err(cv_err("draw_contours"))?;
    to_image(&filled).map(Some)
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
    let map = Mat::new_rows_cols_with_data(height as i32, width as i32, weights).map_err(cv_err("wrap weights"))?;
    let moments = imgproc::moments(&map, false).map_err(cv_err("moments"))?;
    Ok((moments.m00 > 0.0).then(|| moments.m10 / moments.m00))
}

/// Per-pixel Farneback flow magnitude of `cur` relative to `prev`.
pub fn farneback_magnitude(prev: &GrayImage, cur: &GrayImage) -> MediaResult<Vec<f32>> {
    ensure_same_size(prev, cur)?;
    let mut flow = Mat::default();
    video::calc_optical_flow_farneback(&gray_mat(prev)?, &gray_mat(cur)?, &mut flow, 0.5, 3, 15, 3, 5, 1.2, 0)
        .map_err(cv_err("optical flow"))?;

    let mut planes: Vector<Mat> = Vector::new();
    core::split(&flow, &mut planes).map_err(cv_err("split"))?;
    let dx = planes.get(0).map_err(cv_err("split"))?;
    let dy = planes.get(1).map_err(cv_err("split"))?;

    let (mut magnitude, mut angle) = (Mat::default(), Mat::default());
    core::cart_to_polar_def(&dx, &dy, &mut magnitude, &mut angle).map_err(cv_err("cart_to_polar"))?;
    Ok(magnitude.data_typed::<f32>().map_err(cv_err("cart_to_polar"))?.to_vec())
}
