//! Feature detection and keypoint extraction.
//!
//! # Available Detectors
//!
//! - **GFTT**: Good Features To Track - corner response, non-maximum suppression and
//!   spatially uniform greedy selection.

mod gftt;
pub use gftt::*;
