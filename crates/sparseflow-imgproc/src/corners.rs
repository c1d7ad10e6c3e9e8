use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sparseflow_image::{border_interpolate, BorderType, Image, ImageError};

use crate::filter::{check_same_size, kernels, separable_filter};
use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// Gradient used to fill the structure tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum CornerDerivative {
    /// Sobel for a positive aperture, Scharr for an aperture of -1.
    #[serde(rename = "ORIGINAL")]
    Original,
    /// Centered `[-1, 0, 1]` difference with a block-aware scale.
    #[default]
    #[serde(rename = "BINARIZED")]
    Binarized,
}

impl CornerDerivative {
    /// The configuration name of the derivative.
    pub fn name(&self) -> &'static str {
        match self {
            CornerDerivative::Original => "ORIGINAL",
            CornerDerivative::Binarized => "BINARIZED",
        }
    }
}

impl fmt::Display for CornerDerivative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CornerDerivative {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORIGINAL" => Ok(CornerDerivative::Original),
            "BINARIZED" => Ok(CornerDerivative::Binarized),
            _ => Err(ImageError::InvalidParameter(format!(
                "unknown corner derivative: {s}"
            ))),
        }
    }
}

/// Scalar reduction of the 2x2 structure tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CornerResponse {
    /// The smaller eigenvalue.
    MinEigenvalue,
    /// `det - k * trace^2`.
    Harris {
        /// Harris free parameter.
        k: f32,
    },
}

impl CornerResponse {
    #[inline]
    fn reduce(&self, cov: &[f32]) -> f32 {
        let (xx, xy, yy) = (cov[0], cov[1], cov[2]);
        match self {
            CornerResponse::MinEigenvalue => {
                let a = xx * 0.5;
                let c = yy * 0.5;
                (a + c) - ((a - c) * (a - c) + xy * xy).sqrt()
            }
            CornerResponse::Harris { k } => {
                let trace = xx + yy;
                xx * yy - xy * xy - k * trace * trace
            }
        }
    }
}

/// Check an aperture for the [`CornerDerivative::Original`] gradients.
pub fn validate_aperture(aperture_size: i32) -> Result<(), ImageError> {
    if matches!(aperture_size, -1 | 1 | 3 | 5 | 7) {
        Ok(())
    } else {
        Err(ImageError::InvalidKernelSize(aperture_size))
    }
}

/// Compute a per-pixel corner response.
///
/// The gradients are scaled so that an 8-bit image and a block sum give the same response
/// as normalized float gradients averaged over the block. The tensor entries are summed
/// over `block_size x block_size` and reduced with `response`. Borders replicate the
/// nearest pixel, except the binarized difference which reflects without repeating it.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The response map with shape (H, W, 1).
/// * `block_size` - Side of the neighborhood summed into the tensor.
/// * `aperture_size` - Sobel aperture (1, 3, 5, 7) or -1 for Scharr. Ignored for
///   [`CornerDerivative::Binarized`].
/// * `derivative` - The gradient flavour.
/// * `response` - The tensor reduction.
/// * `strategy` - The execution strategy.
pub fn corner_response(
    src: &Image<u8, 1>,
    dst: &mut Image<f32, 1>,
    block_size: usize,
    aperture_size: i32,
    derivative: CornerDerivative,
    response: CornerResponse,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    if block_size == 0 {
        return Err(ImageError::InvalidKernelSize(0));
    }

    if src.is_empty() {
        return Ok(());
    }

    let mut dx = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    let mut dy = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;

    match derivative {
        CornerDerivative::Binarized => {
            let scale = 1.0 / (block_size as f32 * 255.0);
            let diff = [-1.0, 0.0, 1.0];
            let border = BorderType::Reflect101;
            separable_filter(src, &mut dx, &diff, &[1.0], scale, border, strategy)?;
            separable_filter(src, &mut dy, &[1.0], &diff, scale, border, strategy)?;
        }
        CornerDerivative::Original => {
            validate_aperture(aperture_size)?;
            let ksize = if aperture_size > 0 { aperture_size } else { 3 };
            let mut scale = (1u32 << (ksize - 1)) as f64 * block_size as f64;
            if aperture_size < 0 {
                scale *= 2.0;
            }
            let scale = (1.0 / (scale * 255.0)) as f32;

            let (deriv, smooth) = if aperture_size < 0 {
                kernels::scharr_kernels_1d()
            } else {
                kernels::sobel_kernels_1d(aperture_size as usize)?
            };
            let border = BorderType::Replicate;
            separable_filter(src, &mut dx, &deriv, &smooth, scale, border, strategy)?;
            separable_filter(src, &mut dy, &smooth, &deriv, scale, border, strategy)?;
        }
    }

    let (cols, rows) = (src.cols(), src.rows());
    let mut cov = Image::<f32, 3>::from_size_val(src.size(), 0.0)?;
    let cov_stride = cov.stride();
    par_rows_mut(strategy, cov.as_slice_mut(), cov_stride, cols * rows, |y, crow| {
        for ((c, &gx), &gy) in crow.chunks_exact_mut(3).zip(dx.row(y)).zip(dy.row(y)) {
            c[0] = gx * gx;
            c[1] = gx * gy;
            c[2] = gy * gy;
        }
    })?;

    let mut summed = Image::<f32, 3>::from_size_val(src.size(), 0.0)?;
    box_sum(&cov, &mut summed, block_size, BorderType::Replicate, strategy)?;

    let stride = dst.stride();
    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        for (out, c) in drow[..cols].iter_mut().zip(summed.row(y).chunks_exact(3)) {
            *out = response.reduce(c);
        }
    })?;

    Ok(())
}

/// Minimum eigenvalue of the structure tensor at every pixel.
pub fn corner_min_eigen_val(
    src: &Image<u8, 1>,
    dst: &mut Image<f32, 1>,
    block_size: usize,
    aperture_size: i32,
    derivative: CornerDerivative,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    corner_response(
        src,
        dst,
        block_size,
        aperture_size,
        derivative,
        CornerResponse::MinEigenvalue,
        strategy,
    )
}

/// Harris score of the structure tensor at every pixel.
pub fn corner_harris(
    src: &Image<u8, 1>,
    dst: &mut Image<f32, 1>,
    block_size: usize,
    aperture_size: i32,
    k: f32,
    derivative: CornerDerivative,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    corner_response(
        src,
        dst,
        block_size,
        aperture_size,
        derivative,
        CornerResponse::Harris { k },
        strategy,
    )
}

// Un-normalized box sum anchored at `block / 2`.
fn box_sum<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    block: usize,
    border: BorderType,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    let (cols, rows) = (src.cols(), src.rows());
    let anchor = (block / 2) as isize;

    let taps_x: Vec<Vec<Option<usize>>> = (0..block as isize)
        .map(|i| {
            (0..cols as isize)
                .map(|x| border_interpolate(x + i - anchor, cols, border))
                .collect()
        })
        .collect();

    let stride = dst.stride();
    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows * block, |y, drow| {
        let mut column = vec![0.0f32; cols * C];
        for i in 0..block as isize {
            if let Some(sy) = border_interpolate(y as isize + i - anchor, rows, border) {
                column
                    .iter_mut()
                    .zip(src.row(sy))
                    .for_each(|(acc, &v)| *acc += v);
            }
        }

        for (x, out) in drow[..cols * C].chunks_exact_mut(C).enumerate() {
            out.fill(0.0);
            for taps in &taps_x {
                if let Some(sx) = taps[x] {
                    for (o, v) in out.iter_mut().zip(&column[sx * C..sx * C + C]) {
                        *o += v;
                    }
                }
            }
        }
    })?;

    Ok(())
}
