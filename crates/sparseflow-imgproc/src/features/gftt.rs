use std::cmp::Ordering;

use sparseflow_image::{Image, ImageError};

use crate::corners::{corner_response, validate_aperture, CornerDerivative, CornerResponse};
use crate::filter::check_same_size;
use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// A detected corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Column of the corner in pixels.
    pub x: f32,
    /// Row of the corner in pixels.
    pub y: f32,
    /// Corner response at the source pixel.
    pub quality: f32,
}

impl Keypoint {
    /// The position as `[x, y]`.
    pub fn position(&self) -> [f32; 2] {
        [self.x, self.y]
    }
}

/// Parameters of [`good_features_to_track`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GfttParams {
    /// Maximum number of corners to return, 0 for no limit.
    pub max_corners: usize,
    /// Fraction of the strongest response a corner must exceed.
    pub quality_level: f64,
    /// Minimum Euclidean distance between returned corners.
    pub min_distance: f64,
    /// Side of the neighborhood summed into the structure tensor.
    pub block_size: usize,
    /// Sobel aperture or -1 for Scharr.
    pub aperture_size: i32,
    /// Use the Harris score instead of the minimum eigenvalue.
    pub use_harris: bool,
    /// Harris free parameter.
    pub harris_k: f64,
    /// Gradient flavour.
    pub derivative: CornerDerivative,
}

impl Default for GfttParams {
    fn default() -> Self {
        Self {
            max_corners: 1000,
            quality_level: 0.01,
            min_distance: 1.0,
            block_size: 3,
            aperture_size: 3,
            use_harris: false,
            harris_k: 0.04,
            derivative: CornerDerivative::Binarized,
        }
    }
}

impl GfttParams {
    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Fails for a non-positive quality level, a negative minimum distance, an empty block
    /// or, with [`CornerDerivative::Original`], an unsupported aperture.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.quality_level <= 0.0 || !self.quality_level.is_finite() {
            return Err(ImageError::InvalidParameter(format!(
                "quality level must be positive, got {}",
                self.quality_level
            )));
        }
        if self.min_distance < 0.0 || !self.min_distance.is_finite() {
            return Err(ImageError::InvalidParameter(format!(
                "min distance must be non-negative, got {}",
                self.min_distance
            )));
        }
        if self.block_size == 0 {
            return Err(ImageError::InvalidKernelSize(0));
        }
        if self.derivative == CornerDerivative::Original {
            validate_aperture(self.aperture_size)?;
        }
        Ok(())
    }

    /// The tensor reduction selected by the parameters.
    pub fn response(&self) -> CornerResponse {
        if self.use_harris {
            CornerResponse::Harris {
                k: self.harris_k as f32,
            }
        } else {
            CornerResponse::MinEigenvalue
        }
    }
}

#[derive(Clone, Copy)]
struct Candidate {
    value: f32,
    x: usize,
    y: usize,
    offset: usize,
}

// Stronger first; equal responses fall back to the larger buffer offset.
fn by_strength(a: &Candidate, b: &Candidate) -> Ordering {
    b.value
        .partial_cmp(&a.value)
        .unwrap_or(Ordering::Equal)
        .then(b.offset.cmp(&a.offset))
}

/// Select corners from a response map.
///
/// Responses not strictly above `quality_level` times the strongest response under the
/// mask are discarded. The survivors that are 3x3 local maxima away from the one pixel
/// image border are sorted by decreasing response and accepted greedily, skipping any
/// candidate closer than `min_distance` to an accepted one.
///
/// # Arguments
///
/// * `response` - The response map.
/// * `mask` - Optional mask; zero pixels are never selected.
/// * `max_corners` - Maximum number of corners, 0 for no limit.
/// * `quality_level` - Relative response threshold.
/// * `min_distance` - Minimum distance between corners; below 1 no spacing is enforced.
/// * `strategy` - The execution strategy of the candidate scan.
///
/// # Returns
///
/// The corners in acceptance order.
pub fn select_corners(
    response: &Image<f32, 1>,
    mask: Option<&Image<u8, 1>>,
    max_corners: usize,
    quality_level: f64,
    min_distance: f64,
    strategy: ExecutionStrategy,
) -> Result<Vec<Keypoint>, ImageError> {
    if let Some(mask) = mask {
        check_same_size(response, mask)?;
    }

    let (cols, rows) = (response.cols(), response.rows());
    let masked = |x: usize, y: usize| mask.map_or(true, |m| m.row(y)[x] != 0);

    let mut max_val = f32::MIN;
    for y in 0..rows {
        for (x, &v) in response.row(y).iter().enumerate() {
            if masked(x, y) && v > max_val {
                max_val = v;
            }
        }
    }
    if max_val == f32::MIN {
        max_val = 0.0;
    }

    let threshold = (max_val as f64 * quality_level) as f32;
    let value = |x: usize, y: usize| {
        let v = response.row(y)[x];
        if v > threshold {
            v
        } else {
            0.0
        }
    };

    // one candidate list per row, filled by the row's worker
    let stride = response.stride();
    let mut found: Vec<Vec<Candidate>> = (0..rows).map(|_| Vec::new()).collect();
    par_rows_mut(strategy, &mut found, 1, cols * rows, |y, slot| {
        if y == 0 || y + 1 >= rows {
            return;
        }
        slot[0].extend((1..cols.saturating_sub(1)).filter_map(|x| {
            let v = value(x, y);
            if v == 0.0 || !masked(x, y) {
                return None;
            }
            let is_max =
                (y - 1..=y + 1).all(|ny| (x - 1..=x + 1).all(|nx| value(nx, ny) <= v));
            is_max.then_some(Candidate {
                value: v,
                x,
                y,
                offset: y * stride + x,
            })
        }));
    })?;
    let mut candidates: Vec<Candidate> = found.into_iter().flatten().collect();

    candidates.sort_by(by_strength);

    let limit = if max_corners == 0 {
        usize::MAX
    } else {
        max_corners
    };
    let keypoint = |c: &Candidate| Keypoint {
        x: c.x as f32,
        y: c.y as f32,
        quality: c.value,
    };

    if min_distance < 1.0 {
        return Ok(candidates.iter().take(limit).map(keypoint).collect());
    }

    let cell_size = min_distance.round() as usize;
    let grid_width = cols.div_ceil(cell_size);
    let grid_height = rows.div_ceil(cell_size);
    let mut grid: Vec<Vec<[f32; 2]>> = vec![Vec::new(); grid_width * grid_height];
    let min_dist_sq = (min_distance * min_distance) as f32;

    let mut corners = Vec::new();
    for c in &candidates {
        let (cx, cy) = (c.x / cell_size, c.y / cell_size);
        let x1 = cx.saturating_sub(1);
        let y1 = cy.saturating_sub(1);
        let x2 = (cx + 1).min(grid_width - 1);
        let y2 = (cy + 1).min(grid_height - 1);

        let (px, py) = (c.x as f32, c.y as f32);
        let too_close = (y1..=y2).any(|gy| {
            (x1..=x2).any(|gx| {
                grid[gy * grid_width + gx].iter().any(|p| {
                    let dx = px - p[0];
                    let dy = py - p[1];
                    dx * dx + dy * dy < min_dist_sq
                })
            })
        });

        if too_close {
            continue;
        }

        grid[cy * grid_width + cx].push([px, py]);
        corners.push(keypoint(c));
        if corners.len() >= limit {
            break;
        }
    }

    Ok(corners)
}

/// Detect good features to track.
///
/// # Arguments
///
/// * `image` - The grayscale image.
/// * `mask` - Optional mask with the image size; zero pixels are never selected.
/// * `params` - Detector parameters.
/// * `strategy` - The execution strategy.
///
/// # Returns
///
/// The corners in acceptance order; empty for an empty image.
///
/// # Example
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_imgproc::features::{good_features_to_track, GfttParams};
/// use sparseflow_imgproc::parallel::ExecutionStrategy;
///
/// let mut image = Image::<u8, 1>::from_size_val([32, 32].into(), 0).unwrap();
/// for y in 8..24 {
///     for x in 8..24 {
///         image.set(x, y, 0, 255).unwrap();
///     }
/// }
///
/// let corners =
///     good_features_to_track(&image, None, &GfttParams::default(), ExecutionStrategy::Serial)
///         .unwrap();
///
/// assert!(!corners.is_empty());
/// assert!(corners.iter().all(|k| (4.0..=27.0).contains(&k.x)));
/// ```
pub fn good_features_to_track(
    image: &Image<u8, 1>,
    mask: Option<&Image<u8, 1>>,
    params: &GfttParams,
    strategy: ExecutionStrategy,
) -> Result<Vec<Keypoint>, ImageError> {
    params.validate()?;

    if let Some(mask) = mask {
        check_same_size(image, mask)?;
    }

    if image.is_empty() {
        return Ok(Vec::new());
    }

    let mut response = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
    corner_response(
        image,
        &mut response,
        params.block_size,
        params.aperture_size,
        params.derivative,
        params.response(),
        strategy,
    )?;

    let corners = select_corners(
        &response,
        mask,
        params.max_corners,
        params.quality_level,
        params.min_distance,
        strategy,
    )?;

    log::debug!(
        "gftt: {} corners on {} ({}, quality {})",
        corners.len(),
        image.size(),
        params.derivative,
        params.quality_level
    );

    Ok(corners)
}
