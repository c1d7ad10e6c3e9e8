#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// image representation for computer vision purposes.
pub mod image;

/// border extrapolation utilities.
pub mod border;

/// Error types for the image module.
pub mod error;

pub use crate::border::{border_interpolate, BorderType};
pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize, Sample, SampleDepth};
