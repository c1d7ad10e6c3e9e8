use std::borrow::Cow;
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sparseflow_image::{BorderType, Image, ImageError, ImageSize};
use sparseflow_imgproc::derivative::SpatialDerivative;
use sparseflow_imgproc::parallel::{par_items_mut, ExecutionStrategy};
use sparseflow_imgproc::pyramid::{self, Pyramid, PyramidFilter, PyramidParams};

use crate::error::TrackingError;

/// Precision of the bilinear interpolation weights.
pub const W_BITS: u32 = 14;

// Window intensities keep 5 fractional bits.
const INTENSITY_SHIFT: u32 = W_BITS - 5;

// Tensor and mismatch sums back to float.
const FLT_SCALE: f32 = 1.0 / (1u32 << 20) as f32;

// Oscillation detector: consecutive steps that cancel within this amount.
const OSCILLATION_TOLERANCE: f32 = 0.01;

const MAX_ITERATIONS: usize = 100;
const MAX_EPSILON: f64 = 10.0;

#[inline]
fn descale(x: i32, n: u32) -> i32 {
    (x + (1 << (n - 1))) >> n
}

/// Termination criteria of the per-level refinement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    /// Maximum number of iterations per level.
    pub max_count: usize,
    /// Stop once the update is not longer than this, in pixels.
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_count: 30,
            epsilon: 0.01,
        }
    }
}

impl TermCriteria {
    /// The iteration count clamped to `[0, 100]` and the squared epsilon, with epsilon
    /// clamped to `[0, 10]`.
    pub fn normalized(&self) -> (usize, f32) {
        let eps = self.epsilon.clamp(0.0, MAX_EPSILON);
        (self.max_count.min(MAX_ITERATIONS), (eps * eps) as f32)
    }
}

/// The value reported in [`TrackPoint::error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum ErrorMetric {
    /// No error is reported.
    #[serde(rename = "NONE")]
    None,
    /// Mean absolute intensity difference between the two windows.
    #[default]
    #[serde(rename = "ABS_DIFFERENCE")]
    AbsDifference,
    /// Minimum eigenvalue of the normalized structure tensor.
    #[serde(rename = "MIN_EIGENVALUE")]
    MinEigenvalue,
}

impl ErrorMetric {
    /// The configuration name of the metric.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorMetric::None => "NONE",
            ErrorMetric::AbsDifference => "ABS_DIFFERENCE",
            ErrorMetric::MinEigenvalue => "MIN_EIGENVALUE",
        }
    }
}

impl fmt::Display for ErrorMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ErrorMetric {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ErrorMetric::None,
            ErrorMetric::AbsDifference,
            ErrorMetric::MinEigenvalue,
        ]
        .into_iter()
        .find(|m| m.name() == s)
        .ok_or_else(|| TrackingError::InvalidParameter(format!("unknown error metric: {s}")))
    }
}

/// Outcome of tracking one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TrackStatus {
    /// The point was found in the next frame.
    #[default]
    Tracked,
    /// The point left the image, sits on a flat patch or diverged.
    Lost,
}

impl TrackStatus {
    /// Whether the point was tracked.
    pub fn is_tracked(&self) -> bool {
        *self == TrackStatus::Tracked
    }
}

impl From<TrackStatus> for u8 {
    fn from(status: TrackStatus) -> u8 {
        match status {
            TrackStatus::Tracked => 1,
            TrackStatus::Lost => 0,
        }
    }
}

/// Result of tracking one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    /// Position in the next frame. A point lost because its window left the image at
    /// level 0 keeps its seed; other lost points keep the last estimate.
    pub position: [f32; 2],
    /// Whether the point was tracked.
    pub status: TrackStatus,
    /// Error value selected by [`LkParams::error_metric`], when one was computed.
    pub error: Option<f32>,
}

/// Parameters of [`PyrLkTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LkParams {
    /// Size of the search window at every level.
    pub win_size: ImageSize,
    /// Index of the coarsest pyramid level to use.
    pub max_level: usize,
    /// Per-level termination criteria.
    pub criteria: TermCriteria,
    /// Points whose normalized minimum eigenvalue falls below this are lost.
    pub min_eig_threshold: f64,
    /// Derivative used for the previous frame gradients.
    pub derivative: SpatialDerivative,
    /// Pre-filter used while building pyramids.
    pub pyramid_filter: PyramidFilter,
    /// Start from the caller's guesses instead of the previous positions.
    pub use_initial_flow: bool,
    /// Error reported per point.
    pub error_metric: ErrorMetric,
}

impl Default for LkParams {
    fn default() -> Self {
        Self {
            win_size: ImageSize {
                width: 21,
                height: 21,
            },
            max_level: 3,
            criteria: TermCriteria::default(),
            min_eig_threshold: 1e-4,
            derivative: SpatialDerivative::Binarized,
            pyramid_filter: PyramidFilter::Box2x2,
            use_initial_flow: true,
            error_metric: ErrorMetric::AbsDifference,
        }
    }
}

impl LkParams {
    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Fails when the window is not larger than 2x2 or a threshold is not finite.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.win_size.width <= 2 || self.win_size.height <= 2 {
            return Err(TrackingError::InvalidParameter(format!(
                "window must be larger than 2x2, got {}",
                self.win_size
            )));
        }
        if !self.min_eig_threshold.is_finite() || !self.criteria.epsilon.is_finite() {
            return Err(TrackingError::InvalidParameter(
                "thresholds must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

// Bilinear weights for a sub-pixel offset, summing to exactly 1 << W_BITS.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Weights {
    w00: i32,
    w01: i32,
    w10: i32,
    w11: i32,
}

impl Weights {
    fn new(a: f32, b: f32) -> Self {
        let one = (1 << W_BITS) as f32;
        let w00 = ((1.0 - a) * (1.0 - b) * one).round() as i32;
        let w01 = (a * (1.0 - b) * one).round() as i32;
        let w10 = ((1.0 - a) * b * one).round() as i32;
        let w11 = (1 << W_BITS) - w00 - w01 - w10;
        Self { w00, w01, w10, w11 }
    }

    #[inline]
    fn interpolate(&self, f: impl Fn(isize, isize) -> i32, shift: u32) -> i32 {
        descale(
            f(0, 0) * self.w00 + f(1, 0) * self.w01 + f(0, 1) * self.w10 + f(1, 1) * self.w11,
            shift,
        )
    }
}

// When `delta` undoes `prev_delta`, the position halfway back along `delta`.
#[inline]
fn back_off(position: [f32; 2], delta: [f32; 2], prev_delta: [f32; 2]) -> Option<[f32; 2]> {
    let oscillating = (delta[0] + prev_delta[0]).abs() < OSCILLATION_TOLERANCE
        && (delta[1] + prev_delta[1]).abs() < OSCILLATION_TOLERANCE;
    oscillating.then(|| [position[0] - delta[0] * 0.5, position[1] - delta[1] * 0.5])
}

// Integer part and weights of a window origin.
fn split(p: [f32; 2]) -> (isize, isize, Weights) {
    let (fx, fy) = (p[0].floor(), p[1].floor());
    (fx as isize, fy as isize, Weights::new(p[0] - fx, p[1] - fy))
}

// One pyramid level seen by every point.
struct LevelView<'a> {
    prev: &'a Image<u8, 1>,
    gradient: &'a Image<i16, 2>,
    next: &'a Image<u8, 1>,
    finest: bool,
}

impl LevelView<'_> {
    // Window origins tolerated: the window may hang off the image by up to its size.
    fn out_of_bounds(&self, ix: isize, iy: isize, win: ImageSize) -> bool {
        let (cols, rows) = (self.prev.cols() as isize, self.prev.rows() as isize);
        ix < -(win.width as isize) || ix >= cols || iy < -(win.height as isize) || iy >= rows
    }

    #[inline]
    fn prev_pixel(&self, x: isize, y: isize) -> i32 {
        self.prev.get_with_border(x, y, 0, BorderType::Reflect101, 0) as i32
    }

    #[inline]
    fn next_pixel(&self, x: isize, y: isize) -> i32 {
        self.next.get_with_border(x, y, 0, BorderType::Reflect101, 0) as i32
    }

    #[inline]
    fn gradient(&self, x: isize, y: isize, ch: usize) -> i32 {
        self.gradient.get_with_border(x, y, ch, BorderType::Constant, 0) as i32
    }
}

/// Pyramidal Lucas-Kanade sparse optical flow.
///
/// Points are refined from the coarsest level down to level 0. Levels run in sequence and
/// the points of one level are spread over the workers of the execution strategy.
///
/// # Example
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_tracking::{LkParams, PyrLkTracker};
///
/// let data = (0..64 * 64).map(|i| ((i % 64) * 3 + (i / 64) * 5) as u8).collect();
/// let image = Image::<u8, 1>::new([64, 64].into(), data).unwrap();
///
/// let tracker = PyrLkTracker::new(LkParams::default()).unwrap();
/// let tracked = tracker.track_images(&image, &image, &[[32.0, 32.0]], None).unwrap();
///
/// assert_eq!(tracked.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct PyrLkTracker {
    params: LkParams,
    strategy: ExecutionStrategy,
}

impl PyrLkTracker {
    /// Create a tracker.
    ///
    /// # Errors
    ///
    /// Fails when the parameters are invalid.
    pub fn new(params: LkParams) -> Result<Self, TrackingError> {
        params.validate()?;
        Ok(Self {
            params,
            strategy: ExecutionStrategy::default(),
        })
    }

    /// Use another execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The tracker parameters.
    pub fn params(&self) -> &LkParams {
        &self.params
    }

    /// Build a pyramid suited to this tracker.
    ///
    /// Previous frame pyramids should carry gradients; next frame pyramids do not need
    /// them.
    pub fn build_pyramid(
        &self,
        image: &Image<u8, 1>,
        with_gradients: bool,
    ) -> Result<Pyramid, TrackingError> {
        let params = PyramidParams {
            max_level: self.params.max_level,
            win_size: self.params.win_size,
            filter: self.params.pyramid_filter,
            derivative: with_gradients.then_some(self.params.derivative),
            border: BorderType::Reflect101,
        };
        Ok(pyramid::build_pyramid(image, &params, self.strategy)?)
    }

    /// Track points from one frame to the next.
    ///
    /// # Arguments
    ///
    /// * `prev` - Pyramid of the previous frame.
    /// * `next` - Pyramid of the next frame, with the same level sizes.
    /// * `prev_points` - Positions in the previous frame.
    /// * `initial_points` - Guesses in the next frame, used when
    ///   [`LkParams::use_initial_flow`] is set.
    ///
    /// # Returns
    ///
    /// One result per input point, in input order.
    ///
    /// # Errors
    ///
    /// Fails when the pyramids do not match or the guesses do not match the points.
    pub fn track(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        prev_points: &[[f32; 2]],
        initial_points: Option<&[[f32; 2]]>,
    ) -> Result<Vec<TrackPoint>, TrackingError> {
        if let Some(initial) = initial_points {
            if initial.len() != prev_points.len() {
                return Err(TrackingError::PointCountMismatch(
                    initial.len(),
                    prev_points.len(),
                ));
            }
        }

        if prev.is_empty() || next.is_empty() {
            return Err(TrackingError::EmptyPyramid);
        }
        if prev.len() != next.len() {
            return Err(TrackingError::LevelCountMismatch(prev.len(), next.len()));
        }
        for (level, (p, n)) in prev.levels.iter().zip(next.levels.iter()).enumerate() {
            if p.image.size() != n.image.size() {
                return Err(TrackingError::LevelSizeMismatch {
                    level,
                    prev: p.image.size(),
                    next: n.image.size(),
                });
            }
        }

        let mut points: Vec<TrackPoint> = prev_points
            .iter()
            .map(|&position| TrackPoint {
                position,
                status: TrackStatus::Tracked,
                error: None,
            })
            .collect();

        if points.is_empty() {
            return Ok(points);
        }

        let initial = initial_points.filter(|_| self.params.use_initial_flow);
        let max_level = self.params.max_level.min(prev.max_level());

        for level in (0..=max_level).rev() {
            let (prev_level, next_level) = (&prev.levels[level], &next.levels[level]);

            let gradient = match &prev_level.gradient {
                Some(gradient) => Cow::Borrowed(gradient),
                None => Cow::Owned(pyramid::level_gradient(
                    &prev_level.image,
                    self.params.derivative,
                    self.strategy,
                )?),
            };

            let view = LevelView {
                prev: &prev_level.image,
                gradient: gradient.as_ref(),
                next: &next_level.image,
                finest: level == 0,
            };
            let scale = 1.0 / (1u32 << level) as f32;

            par_items_mut(self.strategy, &mut points, |i, point| {
                let seed = initial.map_or(prev_points[i], |guess| guess[i]);
                point.position = if level == max_level {
                    [seed[0] * scale, seed[1] * scale]
                } else {
                    [point.position[0] * 2.0, point.position[1] * 2.0]
                };
                let prev_point = [prev_points[i][0] * scale, prev_points[i][1] * scale];
                self.refine(&view, prev_point, seed, point);
            })
            .map_err(ImageError::from)?;
        }

        log::debug!(
            "lk: {}/{} points tracked over {} levels",
            points.iter().filter(|p| p.status.is_tracked()).count(),
            points.len(),
            max_level + 1
        );

        Ok(points)
    }

    /// Build both pyramids and track points.
    pub fn track_images(
        &self,
        prev: &Image<u8, 1>,
        next: &Image<u8, 1>,
        prev_points: &[[f32; 2]],
        initial_points: Option<&[[f32; 2]]>,
    ) -> Result<Vec<TrackPoint>, TrackingError> {
        let prev_pyramid = self.build_pyramid(prev, true)?;
        let next_pyramid = self.build_pyramid(next, false)?;
        self.track(&prev_pyramid, &next_pyramid, prev_points, initial_points)
    }

    fn mark_lost(&self, view: &LevelView, point: &mut TrackPoint) {
        if view.finest {
            point.status = TrackStatus::Lost;
        }
    }

    // Refine one point on one level. `point.position` holds the seed in level
    // coordinates and receives the estimate. A point whose window leaves level 0 gets
    // `seed` back.
    fn refine(
        &self,
        view: &LevelView,
        prev_point: [f32; 2],
        seed: [f32; 2],
        point: &mut TrackPoint,
    ) {
        let win = self.params.win_size;
        let (ww, wh) = (win.width as isize, win.height as isize);
        let half_win = [(ww - 1) as f32 * 0.5, (wh - 1) as f32 * 0.5];
        let metric = self.params.error_metric;

        let (ix, iy, w) = split([prev_point[0] - half_win[0], prev_point[1] - half_win[1]]);
        if view.out_of_bounds(ix, iy, win) {
            if view.finest {
                point.position = seed;
                point.status = TrackStatus::Lost;
                if metric != ErrorMetric::None {
                    point.error = Some(0.0);
                }
            }
            return;
        }

        // previous window and its gradients
        let area = win.area();
        let mut iwin = Vec::with_capacity(area);
        let mut dwin = Vec::with_capacity(area);
        let (mut ia11, mut ia12, mut ia22) = (0i64, 0i64, 0i64);

        for y in 0..wh {
            for x in 0..ww {
                let (sx, sy) = (ix + x, iy + y);
                let ival = w.interpolate(|dx, dy| view.prev_pixel(sx + dx, sy + dy), INTENSITY_SHIFT);
                let ixval = w.interpolate(|dx, dy| view.gradient(sx + dx, sy + dy, 0), W_BITS);
                let iyval = w.interpolate(|dx, dy| view.gradient(sx + dx, sy + dy, 1), W_BITS);

                iwin.push(ival);
                dwin.push([ixval, iyval]);

                ia11 += ixval as i64 * ixval as i64;
                ia12 += ixval as i64 * iyval as i64;
                ia22 += iyval as i64 * iyval as i64;
            }
        }

        let a11 = ia11 as f32 * FLT_SCALE;
        let a12 = ia12 as f32 * FLT_SCALE;
        let a22 = ia22 as f32 * FLT_SCALE;

        let det = a11 * a22 - a12 * a12;
        let min_eig = (a22 + a11 - ((a11 - a22) * (a11 - a22) + 4.0 * a12 * a12).sqrt())
            / (2 * area) as f32;

        if metric == ErrorMetric::MinEigenvalue {
            point.error = Some(min_eig);
        }

        if (min_eig as f64) < self.params.min_eig_threshold || det < f32::EPSILON {
            self.mark_lost(view, point);
            return;
        }

        let inv_det = 1.0 / det;
        let (max_count, eps_sq) = self.params.criteria.normalized();

        let mut next = [point.position[0] - half_win[0], point.position[1] - half_win[1]];
        let mut prev_delta = [0.0f32; 2];

        for j in 0..max_count {
            let (jx, jy, w) = split(next);
            if view.out_of_bounds(jx, jy, win) {
                self.mark_lost(view, point);
                break;
            }

            let (mut ib1, mut ib2) = (0i64, 0i64);
            for y in 0..wh {
                for x in 0..ww {
                    let (sx, sy) = (jx + x, jy + y);
                    let k = (y * ww + x) as usize;
                    let jval =
                        w.interpolate(|dx, dy| view.next_pixel(sx + dx, sy + dy), INTENSITY_SHIFT);
                    let diff = jval - iwin[k];
                    ib1 += diff as i64 * dwin[k][0] as i64;
                    ib2 += diff as i64 * dwin[k][1] as i64;
                }
            }

            let b1 = ib1 as f32 * FLT_SCALE;
            let b2 = ib2 as f32 * FLT_SCALE;

            let delta = [
                (a12 * b2 - a22 * b1) * inv_det,
                (a12 * b1 - a11 * b2) * inv_det,
            ];

            next[0] += delta[0];
            next[1] += delta[1];
            point.position = [next[0] + half_win[0], next[1] + half_win[1]];

            if delta[0] * delta[0] + delta[1] * delta[1] <= eps_sq {
                break;
            }

            if j > 0 {
                if let Some(position) = back_off(point.position, delta, prev_delta) {
                    point.position = position;
                    break;
                }
            }

            prev_delta = delta;
        }

        if view.finest && point.status.is_tracked() && metric == ErrorMetric::AbsDifference {
            let (jx, jy, w) = split([
                point.position[0] - half_win[0],
                point.position[1] - half_win[1],
            ]);
            if view.out_of_bounds(jx, jy, win) {
                point.status = TrackStatus::Lost;
                return;
            }

            let mut residual = 0i64;
            for y in 0..wh {
                for x in 0..ww {
                    let (sx, sy) = (jx + x, jy + y);
                    let k = (y * ww + x) as usize;
                    let jval =
                        w.interpolate(|dx, dy| view.next_pixel(sx + dx, sy + dy), INTENSITY_SHIFT);
                    residual += (jval - iwin[k]).abs() as i64;
                }
            }
            point.error = Some(residual as f32 / (32 * area) as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum() {
        for (a, b) in [(0.0, 0.0), (0.5, 0.5), (0.3, 0.9), (0.999, 0.001)] {
            let w = Weights::new(a, b);
            assert_eq!(w.w00 + w.w01 + w.w10 + w.w11, 1 << W_BITS);
        }
        assert_eq!(
            Weights::new(0.0, 0.0),
            Weights {
                w00: 1 << W_BITS,
                w01: 0,
                w10: 0,
                w11: 0
            }
        );
    }

    #[test]
    fn test_interpolate_fixed_point() {
        // integer position: the sample itself with 5 fractional bits
        let w = Weights::new(0.0, 0.0);
        assert_eq!(w.interpolate(|_, _| 100, INTENSITY_SHIFT), 3200);

        // halfway between 100 and 200
        let w = Weights::new(0.5, 0.0);
        let v = w.interpolate(|dx, _| if dx == 0 { 100 } else { 200 }, INTENSITY_SHIFT);
        assert_eq!(v, 150 * 32);
    }

    #[test]
    fn test_descale_rounds() {
        assert_eq!(descale(3, 1), 2);
        assert_eq!(descale(2, 1), 1);
        assert_eq!(descale(-3, 1), -1);
        assert_eq!(descale(1 << 14, 14), 1);
    }

    #[test]
    fn test_back_off() {
        let position = [10.5, 20.0];
        assert_eq!(
            back_off(position, [0.5, -0.25], [-0.495, 0.245]),
            Some([10.25, 20.125])
        );
        assert_eq!(back_off(position, [0.5, -0.25], [-0.45, 0.25]), None);
        assert_eq!(back_off(position, [0.5, -0.25], [0.5, -0.25]), None);
    }

    #[test]
    fn test_term_criteria_normalized() {
        let (count, eps_sq) = TermCriteria {
            max_count: 500,
            epsilon: 20.0,
        }
        .normalized();
        assert_eq!(count, 100);
        assert_eq!(eps_sq, 100.0);

        let (count, eps_sq) = TermCriteria {
            max_count: 30,
            epsilon: -1.0,
        }
        .normalized();
        assert_eq!(count, 30);
        assert_eq!(eps_sq, 0.0);
    }

    #[test]
    fn test_params_validate() {
        assert!(LkParams::default().validate().is_ok());

        let params = LkParams {
            win_size: [2, 21].into(),
            ..Default::default()
        };
        assert!(params.validate().is_err());
        assert!(PyrLkTracker::new(params).is_err());

        let params = LkParams {
            min_eig_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_error_metric_names() -> Result<(), TrackingError> {
        for m in [
            ErrorMetric::None,
            ErrorMetric::AbsDifference,
            ErrorMetric::MinEigenvalue,
        ] {
            assert_eq!(m.name().parse::<ErrorMetric>()?, m);
        }
        assert!("L2".parse::<ErrorMetric>().is_err());
        Ok(())
    }

    #[test]
    fn test_status_byte() {
        assert_eq!(u8::from(TrackStatus::Tracked), 1);
        assert_eq!(u8::from(TrackStatus::Lost), 0);
    }
}
