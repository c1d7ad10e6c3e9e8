use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sparseflow_image::{border_interpolate, BorderType, Image, ImageError};

use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// Fixed-point gain applied by the binarized derivative.
pub const BINARIZED_DERIVATIVE_SCALE: i16 = 16;

/// Fixed-point gain applied on top of the 3x3 Sobel kernels.
pub const SOBEL_DERIVATIVE_SCALE: i16 = 4;

/// Strategy used to compute the 2-channel gradient image.
///
/// Every strategy writes interleaved `(dx, dy)` signed 16-bit samples so the consumers
/// never need to know which one produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum SpatialDerivative {
    /// 3x3 Sobel, scaled by [`SOBEL_DERIVATIVE_SCALE`].
    #[serde(rename = "SOBEL")]
    Sobel,
    /// 3x3 Scharr with `3, 10, 3` smoothing.
    #[serde(rename = "SCHARR")]
    Scharr,
    /// 3x3 Scharr with doubled `6, 20, 6` smoothing.
    #[serde(rename = "SCHARR_SCALED")]
    ScharrScaled,
    /// Centered `[-1, 0, 1]` difference, scaled by [`BINARIZED_DERIVATIVE_SCALE`].
    #[default]
    #[serde(rename = "BINARIZED")]
    Binarized,
}

impl SpatialDerivative {
    /// All the strategies, in declaration order.
    pub const ALL: [SpatialDerivative; 4] = [
        SpatialDerivative::Sobel,
        SpatialDerivative::Scharr,
        SpatialDerivative::ScharrScaled,
        SpatialDerivative::Binarized,
    ];

    /// The configuration name of the strategy.
    pub fn name(&self) -> &'static str {
        match self {
            SpatialDerivative::Sobel => "SOBEL",
            SpatialDerivative::Scharr => "SCHARR",
            SpatialDerivative::ScharrScaled => "SCHARR_SCALED",
            SpatialDerivative::Binarized => "BINARIZED",
        }
    }

    // (vertical smoothing weights, output gain)
    fn kernel(&self) -> ([i32; 3], i32) {
        match self {
            SpatialDerivative::Sobel => ([1, 2, 1], SOBEL_DERIVATIVE_SCALE as i32),
            SpatialDerivative::Scharr => ([3, 10, 3], 1),
            SpatialDerivative::ScharrScaled => ([6, 20, 6], 1),
            SpatialDerivative::Binarized => ([0, 1, 0], BINARIZED_DERIVATIVE_SCALE as i32),
        }
    }
}

impl fmt::Display for SpatialDerivative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SpatialDerivative {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpatialDerivative::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| ImageError::InvalidParameter(format!("unknown spatial derivative: {s}")))
    }
}

/// Compute the spatial derivative of a grayscale image.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination gradient with shape (H, W, 2), holding `(dx, dy)` per pixel.
/// * `kind` - The derivative strategy.
/// * `strategy` - The execution strategy.
///
/// Borders are reflected without repeating the edge pixel.
///
/// PRECONDITION: `src` and `dst` must have the same size.
///
/// # Example
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_imgproc::derivative::{spatial_derivative, SpatialDerivative};
/// use sparseflow_imgproc::parallel::ExecutionStrategy;
///
/// let src = Image::<u8, 1>::new([3, 1].into(), vec![0, 10, 20]).unwrap();
/// let mut dst = Image::<i16, 2>::from_size_val(src.size(), 0).unwrap();
///
/// spatial_derivative(&src, &mut dst, SpatialDerivative::Binarized, ExecutionStrategy::Serial)
///     .unwrap();
///
/// assert_eq!(dst.get(1, 0, 0), Some(&320));
/// ```
pub fn spatial_derivative(
    src: &Image<u8, 1>,
    dst: &mut Image<i16, 2>,
    kind: SpatialDerivative,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    let (smooth, scale) = kind.kernel();
    derivative_3x3(src, dst, smooth, scale, strategy)
}

/// Compute the centered `[-1, 0, 1]` difference in both axes with a custom gain.
///
/// The results saturate to the signed 16-bit range.
///
/// PRECONDITION: `src` and `dst` must have the same size.
pub fn binarized_derivative(
    src: &Image<u8, 1>,
    dst: &mut Image<i16, 2>,
    scale: i16,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    derivative_3x3(src, dst, [0, 1, 0], scale as i32, strategy)
}

/// Compute the reflect-101 neighbor indices `(left, right)` of every column.
pub(crate) fn neighbor_columns(cols: usize) -> (Vec<usize>, Vec<usize>) {
    let side = |x: usize, d: isize| {
        border_interpolate(x as isize + d, cols, BorderType::Reflect101).unwrap_or(x)
    };
    (
        (0..cols).map(|x| side(x, -1)).collect(),
        (0..cols).map(|x| side(x, 1)).collect(),
    )
}

#[inline]
fn saturate_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

// Two-pass 3x3 derivative: vertical smoothing / difference, then horizontal.
fn derivative_3x3(
    src: &Image<u8, 1>,
    dst: &mut Image<i16, 2>,
    smooth: [i32; 3],
    scale: i32,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    if src.is_empty() {
        return Ok(());
    }

    let (cols, rows) = (src.cols(), src.rows());
    let (left, right) = neighbor_columns(cols);
    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        let ym = border_interpolate(y as isize - 1, rows, BorderType::Reflect101).unwrap_or(y);
        let yp = border_interpolate(y as isize + 1, rows, BorderType::Reflect101).unwrap_or(y);
        let (r0, r1, r2) = (src.row(ym), src.row(y), src.row(yp));

        let mut vsmooth = vec![0i32; cols];
        let mut vdiff = vec![0i32; cols];
        for x in 0..cols {
            let (a, b, c) = (r0[x] as i32, r1[x] as i32, r2[x] as i32);
            vsmooth[x] = smooth[0] * a + smooth[1] * b + smooth[2] * c;
            vdiff[x] = c - a;
        }

        for x in 0..cols {
            let (l, r) = (left[x], right[x]);
            let dx = vsmooth[r] - vsmooth[l];
            let dy = smooth[0] * vdiff[l] + smooth[1] * vdiff[x] + smooth[2] * vdiff[r];
            drow[2 * x] = saturate_i16(dx * scale);
            drow[2 * x + 1] = saturate_i16(dy * scale);
        }
    })?;

    Ok(())
}
