use std::time::Instant;

use sparseflow_image::Image;
use sparseflow_imgproc::features::{good_features_to_track, GfttParams, Keypoint};
use sparseflow_imgproc::filter::{denoise, edge_filter};
use sparseflow_imgproc::parallel::ExecutionStrategy;
use sparseflow_imgproc::pyramid::Pyramid;
use sparseflow_tracking::{PyrLkTracker, TrackPoint};

use crate::config::SparseFlowConfig;
use crate::error::SparseFlowError;

/// Runs the pipeline stages enabled by a [`SparseFlowConfig`].
///
/// Disabled stages leave the image untouched or return no results.
///
/// # Example
///
/// ```
/// use sparseflow::image::Image;
/// use sparseflow::{FrameProcessor, SparseFlowConfig};
///
/// let processor = FrameProcessor::new(SparseFlowConfig::default()).unwrap();
///
/// let mut frame = Image::<u8, 1>::from_size_val([64, 48].into(), 0).unwrap();
/// processor.preprocess(&mut frame).unwrap();
///
/// let keypoints = processor.detect_keypoints(&frame, None).unwrap();
/// assert!(keypoints.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    config: SparseFlowConfig,
    detector: GfttParams,
    tracker: PyrLkTracker,
    strategy: ExecutionStrategy,
}

impl FrameProcessor {
    /// Create a processor.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid.
    pub fn new(config: SparseFlowConfig) -> Result<Self, SparseFlowError> {
        config.validate()?;
        let tracker = PyrLkTracker::new(config.tracker.lk_params())?;
        log::debug!("frame processor configuration:\n{config}");
        Ok(Self {
            config,
            detector: config.detector.gftt_params(),
            tracker,
            strategy: ExecutionStrategy::default(),
        })
    }

    /// Create a processor with the default configuration and another edge threshold.
    pub fn with_edge_threshold(edge_threshold: i32) -> Result<Self, SparseFlowError> {
        let mut config = SparseFlowConfig::default();
        config.temporal.edge_threshold = edge_threshold;
        Self::new(config)
    }

    /// Use another execution strategy for every stage.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self.tracker = self.tracker.with_strategy(strategy);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SparseFlowConfig {
        &self.config
    }

    /// Denoise and edge filter a frame in place.
    pub fn preprocess(&self, image: &mut Image<u8, 1>) -> Result<(), SparseFlowError> {
        let guards = &self.config.guards;
        if !guards.denoiser_on() && !guards.edge_filter_on() {
            return Ok(());
        }

        let start = Instant::now();
        let mut scratch = Image::<u8, 1>::from_size_val(image.size(), 0)?;

        if guards.denoiser_on() {
            denoise(image, &mut scratch, self.config.temporal.denoiser, self.strategy)?;
            std::mem::swap(image, &mut scratch);
        }

        if guards.edge_filter_on() {
            edge_filter(
                image,
                &mut scratch,
                self.config.temporal.edge_threshold,
                self.strategy,
            )?;
            std::mem::swap(image, &mut scratch);
        }

        log::debug!("preprocess {}: {:?}", image.size(), start.elapsed());
        Ok(())
    }

    /// Detect keypoints on a frame.
    pub fn detect_keypoints(
        &self,
        image: &Image<u8, 1>,
        mask: Option<&Image<u8, 1>>,
    ) -> Result<Vec<Keypoint>, SparseFlowError> {
        if !self.config.guards.keypoint_detector_on() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let keypoints = good_features_to_track(image, mask, &self.detector, self.strategy)?;
        log::debug!(
            "detected {} keypoints in {:?}",
            keypoints.len(),
            start.elapsed()
        );
        Ok(keypoints)
    }

    /// Build a tracking pyramid for a frame.
    pub fn build_pyramid(
        &self,
        image: &Image<u8, 1>,
        with_gradients: bool,
    ) -> Result<Pyramid, SparseFlowError> {
        Ok(self.tracker.build_pyramid(image, with_gradients)?)
    }

    /// Track points from one frame to the next.
    ///
    /// Returns no results when optical flow is disabled.
    pub fn track_keypoints(
        &self,
        prev: &Image<u8, 1>,
        next: &Image<u8, 1>,
        prev_points: &[[f32; 2]],
        initial_points: Option<&[[f32; 2]]>,
    ) -> Result<Vec<TrackPoint>, SparseFlowError> {
        if !self.config.guards.optical_flow_on() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let tracked = self
            .tracker
            .track_images(prev, next, prev_points, initial_points)?;
        log::debug!(
            "tracked {} points in {:?}",
            tracked.len(),
            start.elapsed()
        );
        Ok(tracked)
    }

    /// Track points between prebuilt pyramids.
    pub fn track_pyramids(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        prev_points: &[[f32; 2]],
        initial_points: Option<&[[f32; 2]]>,
    ) -> Result<Vec<TrackPoint>, SparseFlowError> {
        if !self.config.guards.optical_flow_on() {
            return Ok(Vec::new());
        }
        Ok(self.tracker.track(prev, next, prev_points, initial_points)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Guards;

    fn blocks() -> Result<Image<u8, 1>, SparseFlowError> {
        let data = (0..48)
            .flat_map(|y| (0..64).map(move |x| if (x / 8 + y / 8) % 2 == 0 { 30 } else { 220 }))
            .collect();
        Ok(Image::new([64, 48].into(), data)?)
    }

    #[test]
    fn test_disabled_stages() -> Result<(), SparseFlowError> {
        let processor = FrameProcessor::new(SparseFlowConfig {
            guards: Guards::disabled(),
            ..Default::default()
        })?;

        let image = blocks()?;
        let mut frame = image.clone();
        processor.preprocess(&mut frame)?;
        assert_eq!(frame, image);

        assert!(processor.detect_keypoints(&image, None)?.is_empty());
        assert!(processor
            .track_keypoints(&image, &image, &[[32.0, 24.0]], None)?
            .is_empty());
        Ok(())
    }

    #[test]
    fn test_preprocess_edges() -> Result<(), SparseFlowError> {
        let processor = FrameProcessor::new(SparseFlowConfig::default())?;
        let mut frame = blocks()?;
        processor.preprocess(&mut frame)?;
        assert!(frame.as_slice().iter().all(|&v| v == 0 || v == 255));
        assert!(frame.as_slice().iter().any(|&v| v == 255));
        Ok(())
    }

    #[test]
    fn test_edge_threshold() -> Result<(), SparseFlowError> {
        // block edges differ by exactly 190
        let processor = FrameProcessor::with_edge_threshold(190)?;
        assert_eq!(processor.config().temporal.edge_threshold, 190);
        let mut frame = blocks()?;
        processor.preprocess(&mut frame)?;
        assert!(frame.as_slice().iter().any(|&v| v == 255));

        let processor = FrameProcessor::with_edge_threshold(191)?;
        let mut frame = blocks()?;
        processor.preprocess(&mut frame)?;
        assert!(frame.as_slice().iter().all(|&v| v == 0));
        Ok(())
    }

    #[test]
    fn test_detect_and_track() -> Result<(), SparseFlowError> {
        let mut config = SparseFlowConfig::default();
        config.detector.min_distance = 5.0;
        let processor =
            FrameProcessor::new(config)?.with_strategy(ExecutionStrategy::Serial);

        let image = blocks()?;
        let keypoints = processor.detect_keypoints(&image, None)?;
        assert!(!keypoints.is_empty());

        let points: Vec<[f32; 2]> = keypoints.iter().map(|k| k.position()).collect();
        let tracked = processor.track_keypoints(&image, &image, &points, None)?;
        assert_eq!(tracked.len(), points.len());
        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let mut config = SparseFlowConfig::default();
        config.tracker.win_size = [1, 1];
        assert!(matches!(
            FrameProcessor::new(config),
            Err(SparseFlowError::Config(_))
        ));
    }
}
