//! Configuration of the [`FrameProcessor`](crate::FrameProcessor).
//!
//! Every field has a default, so a configuration file only needs to list what it changes:
//!
//! ```
//! use sparseflow::config::SparseFlowConfig;
//! use sparseflow::imgproc::pyramid::PyramidFilter;
//!
//! let config = SparseFlowConfig::from_json_str(
//!     r#"{ "tracker": { "pyramid_filter": "GAUSSIAN_5x5", "max_level": 2 } }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.tracker.pyramid_filter, PyramidFilter::Gaussian5x5);
//! assert_eq!(config.detector.max_corners, 1000);
//! ```

use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use sparseflow_image::ImageSize;
use sparseflow_imgproc::corners::CornerDerivative;
use sparseflow_imgproc::derivative::SpatialDerivative;
use sparseflow_imgproc::features::GfttParams;
use sparseflow_imgproc::filter::Denoiser;
use sparseflow_imgproc::pyramid::PyramidFilter;
use sparseflow_tracking::{ErrorMetric, LkParams, TermCriteria};

/// An error type for the configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid JSON or names an unknown option.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Switches for the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Guards {
    /// Master switch; when off every stage is disabled.
    pub enabled: bool,
    /// Run the denoiser in [`FrameProcessor::preprocess`](crate::FrameProcessor::preprocess).
    pub denoiser: bool,
    /// Run the edge filter in [`FrameProcessor::preprocess`](crate::FrameProcessor::preprocess).
    pub edge_filter: bool,
    /// Run the keypoint detector.
    pub keypoint_detector: bool,
    /// Run the optical flow tracker.
    pub optical_flow: bool,
}

impl Default for Guards {
    fn default() -> Self {
        Self {
            enabled: true,
            denoiser: true,
            edge_filter: true,
            keypoint_detector: true,
            optical_flow: true,
        }
    }
}

impl Guards {
    /// Every stage off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            denoiser: false,
            edge_filter: false,
            keypoint_detector: false,
            optical_flow: false,
        }
    }

    /// Whether the denoiser runs.
    pub fn denoiser_on(&self) -> bool {
        self.enabled && self.denoiser
    }

    /// Whether the edge filter runs.
    pub fn edge_filter_on(&self) -> bool {
        self.enabled && self.edge_filter
    }

    /// Whether the keypoint detector runs.
    pub fn keypoint_detector_on(&self) -> bool {
        self.enabled && self.keypoint_detector
    }

    /// Whether the optical flow tracker runs.
    pub fn optical_flow_on(&self) -> bool {
        self.enabled && self.optical_flow
    }
}

/// Preprocessing applied to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemporalConfig {
    /// The denoiser.
    pub denoiser: Denoiser,
    /// Minimum centered difference marking an edge pixel.
    pub edge_threshold: i32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            denoiser: Denoiser::ThreePixelMedian,
            edge_threshold: 17,
        }
    }
}

/// Keypoint detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Gradient used for the corner response.
    pub corner_derivative: CornerDerivative,
    /// Maximum number of keypoints, 0 for no limit.
    pub max_corners: usize,
    /// Fraction of the strongest response a keypoint must exceed.
    pub quality_level: f64,
    /// Minimum distance between keypoints.
    pub min_distance: f64,
    /// Structure tensor neighborhood.
    pub block_size: usize,
    /// Sobel aperture or -1 for Scharr, used with the original derivative.
    pub gradient_size: i32,
    /// Use the Harris score.
    pub use_harris: bool,
    /// Harris free parameter.
    pub k: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let params = GfttParams::default();
        Self {
            corner_derivative: params.derivative,
            max_corners: params.max_corners,
            quality_level: params.quality_level,
            min_distance: params.min_distance,
            block_size: params.block_size,
            gradient_size: params.aperture_size,
            use_harris: params.use_harris,
            k: params.harris_k,
        }
    }
}

impl DetectorConfig {
    /// The detector parameters.
    pub fn gftt_params(&self) -> GfttParams {
        GfttParams {
            max_corners: self.max_corners,
            quality_level: self.quality_level,
            min_distance: self.min_distance,
            block_size: self.block_size,
            aperture_size: self.gradient_size,
            use_harris: self.use_harris,
            harris_k: self.k,
            derivative: self.corner_derivative,
        }
    }
}

/// Optical flow settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Derivative of the previous frame.
    pub spatial_derivative: SpatialDerivative,
    /// Pyramid pre-filter.
    pub pyramid_filter: PyramidFilter,
    /// Search window as `[width, height]`.
    pub win_size: [usize; 2],
    /// Index of the coarsest pyramid level.
    pub max_level: usize,
    /// Iterations per level.
    pub max_count: usize,
    /// Convergence threshold in pixels.
    pub epsilon: f64,
    /// Minimum normalized eigenvalue of a trackable window.
    pub min_eig_threshold: f64,
    /// Start from the caller's guesses.
    pub use_initial_flow: bool,
    /// Error reported per point.
    pub error_metric: ErrorMetric,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let params = LkParams::default();
        Self {
            spatial_derivative: params.derivative,
            pyramid_filter: params.pyramid_filter,
            win_size: [params.win_size.width, params.win_size.height],
            max_level: params.max_level,
            max_count: params.criteria.max_count,
            epsilon: params.criteria.epsilon,
            min_eig_threshold: params.min_eig_threshold,
            use_initial_flow: params.use_initial_flow,
            error_metric: params.error_metric,
        }
    }
}

impl TrackerConfig {
    /// The tracker parameters.
    pub fn lk_params(&self) -> LkParams {
        LkParams {
            win_size: ImageSize::from(self.win_size),
            max_level: self.max_level,
            criteria: TermCriteria {
                max_count: self.max_count,
                epsilon: self.epsilon,
            },
            min_eig_threshold: self.min_eig_threshold,
            derivative: self.spatial_derivative,
            pyramid_filter: self.pyramid_filter,
            use_initial_flow: self.use_initial_flow,
            error_metric: self.error_metric,
        }
    }
}

/// Configuration of the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SparseFlowConfig {
    /// Stage switches.
    pub guards: Guards,
    /// Preprocessing.
    pub temporal: TemporalConfig,
    /// Keypoint detection.
    pub detector: DetectorConfig,
    /// Optical flow.
    pub tracker: TrackerConfig,
}

impl SparseFlowConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Serialize the configuration as pretty JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the values that the types alone do not constrain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector
            .gftt_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("detector: {e}")))?;
        self.tracker
            .lk_params()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("tracker: {e}")))?;
        Ok(())
    }
}

impl fmt::Display for SparseFlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = &self.guards;
        writeln!(f, "enabled: {}", g.enabled)?;
        writeln!(
            f,
            "  denoiser: {} edge_filter: {} keypoint_detector: {} optical_flow: {}",
            g.denoiser, g.edge_filter, g.keypoint_detector, g.optical_flow
        )?;
        writeln!(
            f,
            "temporal: denoiser {} edge_threshold {}",
            self.temporal.denoiser, self.temporal.edge_threshold
        )?;

        let d = &self.detector;
        writeln!(
            f,
            "detector: {} max_corners {} quality {} min_distance {} block {} gradient {} harris {} k {}",
            d.corner_derivative,
            d.max_corners,
            d.quality_level,
            d.min_distance,
            d.block_size,
            d.gradient_size,
            d.use_harris,
            d.k
        )?;

        let t = &self.tracker;
        write!(
            f,
            "tracker: {} {} win {}x{} max_level {} criteria ({}, {}) min_eig {} initial_flow {} error {}",
            t.spatial_derivative,
            t.pyramid_filter,
            t.win_size[0],
            t.win_size[1],
            t.max_level,
            t.max_count,
            t.epsilon,
            t.min_eig_threshold,
            t.use_initial_flow,
            t.error_metric
        )
    }
}
