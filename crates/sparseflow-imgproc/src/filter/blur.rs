use sparseflow_image::{border_interpolate, BorderType, Image, ImageError};

use super::check_same_size;
use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// Blur an 8-bit image with a normalized `kernel_size x kernel_size` box.
///
/// The anchor sits at `kernel_size / 2`, so even kernels reach one more pixel towards
/// the top-left. Borders are reflected without repeating the edge pixel and the mean is
/// rounded to the nearest integer, ties to even.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `kernel_size` - The side of the box.
/// * `strategy` - The execution strategy.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
///
/// # Example
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_imgproc::filter::box_blur_u8;
/// use sparseflow_imgproc::parallel::ExecutionStrategy;
///
/// let src = Image::<u8, 1>::new([2, 2].into(), vec![0, 4, 8, 12]).unwrap();
/// let mut dst = Image::<u8, 1>::from_size_val(src.size(), 0).unwrap();
///
/// box_blur_u8(&src, &mut dst, 2, ExecutionStrategy::Serial).unwrap();
///
/// assert_eq!(dst.get(1, 1, 0), Some(&6));
/// ```
pub fn box_blur_u8(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    kernel_size: usize,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    if kernel_size == 0 {
        return Err(ImageError::InvalidKernelSize(kernel_size as i32));
    }
    let kernel = vec![1u32; kernel_size];
    let area = (kernel_size * kernel_size) as u32;
    filter_u8(src, dst, &kernel, area, Rounding::HalfEven, strategy)
}

/// Blur an 8-bit image with the 3x3 binomial kernel `[1, 2, 1]^T [1, 2, 1] / 16`.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn gaussian_blur3_u8(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    filter_u8(src, dst, &[1, 2, 1], 16, Rounding::HalfUp, strategy)
}

#[derive(Clone, Copy, PartialEq)]
enum Rounding {
    HalfUp,
    HalfEven,
}

// Separable integer filter with a rounded division by `divisor`, reflect-101 borders.
fn filter_u8(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    kernel: &[u32],
    divisor: u32,
    rounding: Rounding,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    let border = BorderType::Reflect101;
    if src.is_empty() {
        return Ok(());
    }

    let (cols, rows) = (src.cols(), src.rows());
    let anchor = (kernel.len() / 2) as isize;

    // column index of every tap, per tap
    let taps_x = (0..kernel.len())
        .map(|i| {
            (0..cols)
                .map(|x| {
                    border_interpolate(x as isize + i as isize - anchor, cols, border).unwrap_or(x)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        let mut column = vec![0u32; cols];
        for (i, &k) in kernel.iter().enumerate() {
            let sy = border_interpolate(y as isize + i as isize - anchor, rows, border).unwrap_or(y);
            column
                .iter_mut()
                .zip(src.row(sy))
                .for_each(|(acc, &v)| *acc += k * v as u32);
        }

        for (x, out) in drow[..cols].iter_mut().enumerate() {
            let sum: u32 = kernel
                .iter()
                .zip(taps_x.iter())
                .map(|(&k, taps)| k * column[taps[x]])
                .sum();
            let (q, r) = (sum / divisor, sum % divisor);
            let up = 2 * r > divisor
                || (2 * r == divisor && (rounding == Rounding::HalfUp || q % 2 == 1));
            *out = (q + up as u32).min(255) as u8;
        }
    })?;

    Ok(())
}
