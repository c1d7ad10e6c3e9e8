//! Filter operations
//!
//! Integer filters over 8-bit grayscale images used before pyramid decimation and as
//! per-frame pre-processing.

/// Filter kernels
pub mod kernels;

mod blur;
pub use blur::*;

mod median;
pub use median::*;

mod separable_filter;
pub use separable_filter::*;

mod temporal;
pub use temporal::*;

use sparseflow_image::{Image, ImageError, Sample};

pub(crate) fn check_same_size<T: Sample, U: Sample, const C1: usize, const C2: usize>(
    src: &Image<T, C1>,
    dst: &Image<U, C2>,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }
    Ok(())
}
