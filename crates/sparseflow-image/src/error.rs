use crate::border::BorderType;

/// An error type for the image module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ImageError {
    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the row stride cannot hold a full row.
    #[error("Row stride ({0}) is smaller than the row length ({1})")]
    InvalidStride(usize, usize),

    /// Error when two images that must share a size do not.
    #[error("Image size mismatch: expected ({0}, {1}), got ({2}, {3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when a pixel is addressed outside the image.
    #[error("Pixel index ({0}, {1}) is out of bounds ({2}, {3})")]
    PixelIndexOutOfBounds(usize, usize, usize, usize),

    /// Error when a channel is addressed outside the image.
    #[error("Channel index ({0}) is out of bounds ({1})")]
    ChannelIndexOutOfBounds(usize, usize),

    /// Error when an operation cannot work with the requested border mode.
    #[error("Border type {0:?} is not supported by this operation")]
    UnsupportedBorder(BorderType),

    /// Error when a filter kernel size is not supported.
    #[error("Invalid kernel size: {0}")]
    InvalidKernelSize(i32),

    /// Error when a sample cannot be represented in the target type.
    #[error("Failed to cast image data")]
    CastError,

    /// Error when the parallel executor fails.
    #[error("Parallel execution failed: {0}")]
    ExecutionFailed(String),

    /// Error when an operation parameter is outside its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
