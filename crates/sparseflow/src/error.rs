use sparseflow_image::ImageError;
use sparseflow_tracking::TrackingError;

use crate::config::ConfigError;

/// An error type for the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum SparseFlowError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An image operation failed.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Tracking failed.
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}
