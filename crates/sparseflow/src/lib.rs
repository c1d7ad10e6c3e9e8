#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]
#![deny(missing_docs)]

#[doc(inline)]
pub use sparseflow_image as image;

#[doc(inline)]
pub use sparseflow_imgproc as imgproc;

#[doc(inline)]
pub use sparseflow_tracking as tracking;

/// pipeline configuration.
pub mod config;

/// error types for the pipeline.
pub mod error;

/// per-frame processing context.
pub mod processor;

/// optical flow record and replay.
pub mod replay;

pub use config::SparseFlowConfig;
pub use error::SparseFlowError;
pub use processor::FrameProcessor;
pub use replay::{FlowRecord, FlowRecorder, ReplayMode};
