use sparseflow_image::{border_interpolate, BorderType, Image, ImageError};

use super::check_same_size;
use crate::parallel::{par_rows_mut, ExecutionStrategy};

#[inline]
fn sort2(a: &mut u8, b: &mut u8) {
    if *a > *b {
        std::mem::swap(a, b);
    }
}

// Median of nine with the 19 exchange network of Paeth.
#[inline]
fn median9(mut p: [u8; 9]) -> u8 {
    const NET: [(usize, usize); 19] = [
        (1, 2),
        (4, 5),
        (7, 8),
        (0, 1),
        (3, 4),
        (6, 7),
        (1, 2),
        (4, 5),
        (7, 8),
        (0, 3),
        (5, 8),
        (4, 7),
        (3, 6),
        (1, 4),
        (2, 5),
        (4, 7),
        (4, 2),
        (6, 4),
        (4, 2),
    ];
    for (i, j) in NET {
        let (lo, hi) = if i < j {
            let (l, r) = p.split_at_mut(j);
            (&mut l[i], &mut r[0])
        } else {
            let (l, r) = p.split_at_mut(i);
            (&mut r[0], &mut l[j])
        };
        sort2(lo, hi);
    }
    p[4]
}

/// Apply a 3x3 median filter to an 8-bit image.
///
/// Pixels outside the image replicate the nearest edge pixel.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `strategy` - The execution strategy.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn median_blur3_u8(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    if src.is_empty() {
        return Ok(());
    }

    let (cols, rows) = (src.cols(), src.rows());
    let clamp = |p: isize, len: usize| border_interpolate(p, len, BorderType::Replicate).unwrap_or(0);
    let xs: Vec<[usize; 3]> = (0..cols as isize)
        .map(|x| [clamp(x - 1, cols), x as usize, clamp(x + 1, cols)])
        .collect();
    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        let y = y as isize;
        let r = [
            src.row(clamp(y - 1, rows)),
            src.row(y as usize),
            src.row(clamp(y + 1, rows)),
        ];
        for (out, [l, c, rt]) in drow[..cols].iter_mut().zip(xs.iter().copied()) {
            *out = median9([
                r[0][l], r[0][c], r[0][rt],
                r[1][l], r[1][c], r[1][rt],
                r[2][l], r[2][c], r[2][rt],
            ]);
        }
    })?;

    Ok(())
}
