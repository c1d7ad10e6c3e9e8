use sparseflow_image::{border_interpolate, BorderType, Image, ImageError};

use super::check_same_size;
use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// Apply a separable filter to an 8-bit image, producing a float image.
///
/// The kernels are correlated (not flipped) and centered at `len / 2`. Pixels outside the
/// image follow `border`; with [`BorderType::Constant`] they read as zero.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
/// * `scale` - Factor applied to every output sample.
/// * `border` - The border mode.
/// * `strategy` - The execution strategy.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn separable_filter(
    src: &Image<u8, 1>,
    dst: &mut Image<f32, 1>,
    kernel_x: &[f32],
    kernel_y: &[f32],
    scale: f32,
    border: BorderType,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    if kernel_x.is_empty() || kernel_y.is_empty() {
        return Err(ImageError::InvalidKernelSize(0));
    }

    if src.is_empty() {
        return Ok(());
    }

    let (cols, rows) = (src.cols(), src.rows());
    let half_x = (kernel_x.len() / 2) as isize;
    let half_y = (kernel_y.len() / 2) as isize;

    let taps_x: Vec<Vec<Option<usize>>> = (0..kernel_x.len() as isize)
        .map(|i| {
            (0..cols as isize)
                .map(|x| border_interpolate(x + i - half_x, cols, border))
                .collect()
        })
        .collect();

    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        // vertical pass
        let mut column = vec![0.0f32; cols];
        for (i, &k) in kernel_y.iter().enumerate() {
            let sy = y as isize + i as isize - half_y;
            if let Some(sy) = border_interpolate(sy, rows, border) {
                column
                    .iter_mut()
                    .zip(src.row(sy))
                    .for_each(|(acc, &v)| *acc += k * v as f32);
            }
        }

        // horizontal pass
        for (x, out) in drow[..cols].iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (&k, taps) in kernel_x.iter().zip(taps_x.iter()) {
                if let Some(sx) = taps[x] {
                    acc += k * column[sx];
                }
            }
            *out = acc * scale;
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_separable_filter_sobel_x() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let src = Image::<u8, 1>::new(
            [4, 3].into(),
            vec![
                0, 10, 20, 30,
                0, 10, 20, 30,
                0, 10, 20, 30,
            ],
        )?;
        let mut dst = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        separable_filter(
            &src,
            &mut dst,
            &[-1.0, 0.0, 1.0],
            &[1.0, 2.0, 1.0],
            0.5,
            BorderType::Replicate,
            ExecutionStrategy::Serial,
        )?;

        // interior: (20 - 0) * 4 * 0.5; replicated edges halve the difference
        assert_relative_eq!(*dst.get(1, 1, 0).unwrap_or(&0.0), 40.0);
        assert_relative_eq!(*dst.get(0, 1, 0).unwrap_or(&0.0), 20.0);
        assert_relative_eq!(*dst.get(3, 2, 0).unwrap_or(&0.0), 20.0);
        Ok(())
    }

    #[test]
    fn test_separable_filter_constant_border() -> Result<(), ImageError> {
        let src = Image::<u8, 1>::from_size_val([3, 1].into(), 6)?;
        let mut dst = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
        separable_filter(
            &src,
            &mut dst,
            &[1.0, 1.0, 1.0],
            &[1.0],
            1.0,
            BorderType::Constant,
            ExecutionStrategy::Serial,
        )?;
        assert_eq!(dst.as_slice(), &[12.0, 18.0, 12.0]);
        Ok(())
    }
}
