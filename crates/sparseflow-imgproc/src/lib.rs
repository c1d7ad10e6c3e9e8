#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// corner response maps from the local structure tensor.
pub mod corners;

/// spatial derivative strategies.
pub mod derivative;

/// feature detection module.
pub mod features;

/// image filtering module.
pub mod filter;

/// module containing parallization utilities.
pub mod parallel;

/// Pyramid operations
pub mod pyramid;
