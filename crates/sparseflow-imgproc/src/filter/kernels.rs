use sparseflow_image::ImageError;

/// Create the 1-D Sobel kernels of a given aperture.
///
/// # Arguments
///
/// * `kernel_size` - The aperture, one of 1, 3, 5 or 7. An aperture of 1 differentiates
///   with `[-1, 0, 1]` and does not smooth.
///
/// # Returns
///
/// The `(derivative, smoothing)` kernels. Apply the derivative along the axis being
/// differentiated and the smoothing along the other one.
pub fn sobel_kernels_1d(kernel_size: usize) -> Result<(Vec<f32>, Vec<f32>), ImageError> {
    if !matches!(kernel_size, 1 | 3 | 5 | 7) {
        return Err(ImageError::InvalidKernelSize(kernel_size as i32));
    }

    if kernel_size == 1 {
        return Ok((vec![-1.0, 0.0, 1.0], vec![1.0]));
    }

    // binomial expansion: smoothing is (1 + z)^(n-1), derivative is (1 + z)^(n-2) (z - 1)
    let binomial = |n: usize| {
        let mut k = vec![1.0f32];
        for _ in 0..n {
            let mut next = vec![0.0; k.len() + 1];
            for (i, v) in k.iter().enumerate() {
                next[i] += v;
                next[i + 1] += v;
            }
            k = next;
        }
        k
    };

    let smooth = binomial(kernel_size - 1);
    let base = binomial(kernel_size - 2);
    let mut deriv = vec![0.0; kernel_size];
    for (i, v) in base.iter().enumerate() {
        deriv[i] -= v;
        deriv[i + 1] += v;
    }

    Ok((deriv, smooth))
}

/// Create the 1-D Scharr kernels as `(derivative, smoothing)`.
pub fn scharr_kernels_1d() -> (Vec<f32>, Vec<f32>) {
    (vec![-1.0, 0.0, 1.0], vec![3.0, 10.0, 3.0])
}
