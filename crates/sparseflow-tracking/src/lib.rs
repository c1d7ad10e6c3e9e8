#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// error types for the tracking module.
pub mod error;

/// pyramidal Lucas-Kanade tracker.
pub mod lk;

pub use error::TrackingError;
pub use lk::*;
