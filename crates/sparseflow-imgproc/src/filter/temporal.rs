use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sparseflow_image::{Image, ImageError};

use super::{check_same_size, median_blur3_u8};
use crate::derivative::neighbor_columns;
use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// Value written to edge pixels by [`edge_filter`].
pub const EDGE_PIXEL_VALUE: u8 = 255;

/// Per-frame denoiser applied before detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum Denoiser {
    /// Median of the pixel, its upper and its right neighbor.
    #[default]
    #[serde(rename = "THREE_PIX_MEDIAN")]
    ThreePixelMedian,
    /// Median of the pixel and its four direct neighbors.
    #[serde(rename = "FIVE_PIX_MEDIAN")]
    FivePixelMedian,
    /// Full 3x3 median.
    #[serde(rename = "THREE_BY_THREE_MEDIAN")]
    ThreeByThreeMedian,
}

impl Denoiser {
    /// All the denoisers, in declaration order.
    pub const ALL: [Denoiser; 3] = [
        Denoiser::ThreePixelMedian,
        Denoiser::FivePixelMedian,
        Denoiser::ThreeByThreeMedian,
    ];

    /// The configuration name of the denoiser.
    pub fn name(&self) -> &'static str {
        match self {
            Denoiser::ThreePixelMedian => "THREE_PIX_MEDIAN",
            Denoiser::FivePixelMedian => "FIVE_PIX_MEDIAN",
            Denoiser::ThreeByThreeMedian => "THREE_BY_THREE_MEDIAN",
        }
    }
}

impl fmt::Display for Denoiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Denoiser {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Denoiser::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| ImageError::InvalidParameter(format!("unknown denoiser: {s}")))
    }
}

#[inline]
fn median3(p1: u8, p2: u8, p3: u8) -> u8 {
    p1.min(p2).max(p1.max(p2).min(p3))
}

// Bitonic network over five samples.
#[inline]
fn median5(above: u8, left: u8, center: u8, right: u8, below: u8) -> u8 {
    let (s11, s12) = (above.min(left), above.max(left));
    let (s13, s14) = (center.min(right), center.max(right));

    let (s21, s22) = (s11.min(s14), s11.max(s14));
    let (s23, s24) = (s12.min(s13), s12.max(s13));

    let hi = s21.max(s23);
    let lo = s22.min(s24);

    median3(hi, lo, below)
}

/// Median of each pixel with its upper and right neighbors.
///
/// Neighbors outside the image read as zero.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
///
/// # Example
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_imgproc::filter::three_pixel_median;
/// use sparseflow_imgproc::parallel::ExecutionStrategy;
///
/// let src = Image::<u8, 1>::new([2, 2].into(), vec![9, 1, 5, 7]).unwrap();
/// let mut dst = Image::<u8, 1>::from_size_val(src.size(), 0).unwrap();
///
/// three_pixel_median(&src, &mut dst, ExecutionStrategy::Serial).unwrap();
///
/// assert_eq!(dst.as_slice(), &[1, 0, 7, 1]);
/// ```
pub fn three_pixel_median(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    let (cols, rows) = (src.cols(), src.rows());
    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride.max(1), cols * rows, |y, drow| {
        let row = src.row(y);
        let above = (y > 0).then(|| src.row(y - 1));
        for (x, out) in drow[..cols].iter_mut().enumerate() {
            let p1 = above.map_or(0, |r| r[x]);
            let p3 = row.get(x + 1).copied().unwrap_or(0);
            *out = median3(p1, row[x], p3);
        }
    })?;

    Ok(())
}

/// Median of each pixel with its four direct neighbors.
///
/// Neighbors outside the image read as zero.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn five_pixel_median(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    let (cols, rows) = (src.cols(), src.rows());
    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride.max(1), cols * rows, |y, drow| {
        let row = src.row(y);
        let above = (y > 0).then(|| src.row(y - 1));
        let below = (y + 1 < rows).then(|| src.row(y + 1));
        for (x, out) in drow[..cols].iter_mut().enumerate() {
            let left = if x > 0 { row[x - 1] } else { 0 };
            let right = row.get(x + 1).copied().unwrap_or(0);
            *out = median5(
                above.map_or(0, |r| r[x]),
                left,
                row[x],
                right,
                below.map_or(0, |r| r[x]),
            );
        }
    })?;

    Ok(())
}

/// Apply the selected denoiser.
pub fn denoise(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    denoiser: Denoiser,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    match denoiser {
        Denoiser::ThreePixelMedian => three_pixel_median(src, dst, strategy),
        Denoiser::FivePixelMedian => five_pixel_median(src, dst, strategy),
        Denoiser::ThreeByThreeMedian => median_blur3_u8(src, dst, strategy),
    }
}

/// Binarize an image into an edge map.
///
/// A pixel becomes [`EDGE_PIXEL_VALUE`] when the magnitude of its centered `[-1, 0, 1]`
/// difference reaches `threshold` along either axis, and 0 otherwise. Borders are
/// reflected without repeating the edge pixel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn edge_filter(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    threshold: i32,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    if src.is_empty() {
        return Ok(());
    }

    let (cols, rows) = (src.cols(), src.rows());
    let (left, right) = neighbor_columns(cols);
    let (up, down) = neighbor_columns(rows);
    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        let row = src.row(y);
        let (r0, r2) = (src.row(up[y]), src.row(down[y]));
        for (x, out) in drow[..cols].iter_mut().enumerate() {
            let dx = (row[right[x]] as i32 - row[left[x]] as i32).abs();
            let dy = (r2[x] as i32 - r0[x] as i32).abs();
            *out = if dx >= threshold || dy >= threshold {
                EDGE_PIXEL_VALUE
            } else {
                0
            };
        }
    })?;

    Ok(())
}
