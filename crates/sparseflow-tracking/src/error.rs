use sparseflow_image::{ImageError, ImageSize};

/// An error type for the tracking module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TrackingError {
    /// The two pyramids have a different number of levels.
    #[error("Pyramid level count mismatch: {0} != {1}")]
    LevelCountMismatch(usize, usize),

    /// A level has a different size in the two pyramids.
    #[error("Pyramid level {level} size mismatch: {prev} != {next}")]
    LevelSizeMismatch {
        /// The level index.
        level: usize,
        /// Size of the level in the previous pyramid.
        prev: ImageSize,
        /// Size of the level in the next pyramid.
        next: ImageSize,
    },

    /// The pyramid has no levels.
    #[error("Pyramid is empty")]
    EmptyPyramid,

    /// The initial guesses do not match the points to track.
    #[error("Point count mismatch: {0} != {1}")]
    PointCountMismatch(usize, usize),

    /// A tracker parameter is out of range.
    #[error("Invalid tracker parameter: {0}")]
    InvalidParameter(String),

    /// An image operation failed.
    #[error(transparent)]
    Image(#[from] ImageError),
}
