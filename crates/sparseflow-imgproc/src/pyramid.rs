use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sparseflow_image::{border_interpolate, BorderType, Image, ImageError, ImageSize};

use crate::derivative::{spatial_derivative, SpatialDerivative};
use crate::filter::{box_blur_u8, gaussian_blur3_u8, median_blur3_u8};
use crate::parallel::{par_rows_mut, ExecutionStrategy};

/// Filter applied to a level before it is decimated into the next one.
///
/// Only [`PyramidFilter::Gaussian5x5`] reproduces the classic low-pass pyramid; the rest
/// trade accuracy for fewer operations per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum PyramidFilter {
    /// Keep every second pixel without blurring.
    #[serde(rename = "DIRECT_SUBSAMPLE")]
    DirectSubsample,
    /// 2x2 box blur, then subsample.
    #[default]
    #[serde(rename = "BOX_2x2")]
    Box2x2,
    /// 3x3 box blur, then subsample.
    #[serde(rename = "BOX_3x3")]
    Box3x3,
    /// 3x3 median, then subsample.
    #[serde(rename = "MEDIAN_3x3")]
    Median3x3,
    /// 3x3 binomial blur, then subsample.
    #[serde(rename = "GAUSSIAN_3x3")]
    Gaussian3x3,
    /// Fused 5x5 binomial blur and decimation.
    #[serde(rename = "GAUSSIAN_5x5")]
    Gaussian5x5,
}

impl PyramidFilter {
    /// All the filters, in declaration order.
    pub const ALL: [PyramidFilter; 6] = [
        PyramidFilter::DirectSubsample,
        PyramidFilter::Box2x2,
        PyramidFilter::Box3x3,
        PyramidFilter::Median3x3,
        PyramidFilter::Gaussian3x3,
        PyramidFilter::Gaussian5x5,
    ];

    /// The configuration name of the filter.
    pub fn name(&self) -> &'static str {
        match self {
            PyramidFilter::DirectSubsample => "DIRECT_SUBSAMPLE",
            PyramidFilter::Box2x2 => "BOX_2x2",
            PyramidFilter::Box3x3 => "BOX_3x3",
            PyramidFilter::Median3x3 => "MEDIAN_3x3",
            PyramidFilter::Gaussian3x3 => "GAUSSIAN_3x3",
            PyramidFilter::Gaussian5x5 => "GAUSSIAN_5x5",
        }
    }
}

impl fmt::Display for PyramidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PyramidFilter {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PyramidFilter::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| ImageError::InvalidParameter(format!("unknown pyramid filter: {s}")))
    }
}

/// Downsample an image by two.
///
/// The destination must be `((w + 1) / 2, (h + 1) / 2)`. Each destination pixel `(x, y)`
/// takes the pre-filtered source pixel `(2x, 2y)`, except for
/// [`PyramidFilter::Gaussian5x5`], which blurs and decimates in one pass with 8-bit
/// fixed-point rounding.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image.
/// * `filter` - The pre-filter.
/// * `border` - Border mode of the 5x5 pass. [`BorderType::Constant`] is rejected.
/// * `strategy` - The execution strategy.
///
/// # Example
///
/// ```
/// use sparseflow_image::{BorderType, Image};
/// use sparseflow_imgproc::parallel::ExecutionStrategy;
/// use sparseflow_imgproc::pyramid::{pyrdown, PyramidFilter};
///
/// let src = Image::<u8, 1>::new([3, 3].into(), (0..9).collect()).unwrap();
/// let mut dst = Image::<u8, 1>::from_size_val([2, 2].into(), 0).unwrap();
///
/// pyrdown(
///     &src,
///     &mut dst,
///     PyramidFilter::DirectSubsample,
///     BorderType::Reflect101,
///     ExecutionStrategy::Serial,
/// )
/// .unwrap();
///
/// assert_eq!(dst.as_slice(), &[0, 2, 6, 8]);
/// ```
pub fn pyrdown(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    filter: PyramidFilter,
    border: BorderType,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    if border == BorderType::Constant {
        return Err(ImageError::UnsupportedBorder(border));
    }

    let expected = src.size().half();
    if dst.size() != expected {
        return Err(ImageError::InvalidImageSize(
            expected.width,
            expected.height,
            dst.width(),
            dst.height(),
        ));
    }

    if src.is_empty() {
        return Ok(());
    }

    let mut filtered = match filter {
        PyramidFilter::Gaussian5x5 => return gaussian5x5_decimate(src, dst, border, strategy),
        PyramidFilter::DirectSubsample => None,
        _ => Some(Image::<u8, 1>::from_size_val(src.size(), 0)?),
    };

    if let Some(buf) = filtered.as_mut() {
        match filter {
            PyramidFilter::Box2x2 => box_blur_u8(src, buf, 2, strategy)?,
            PyramidFilter::Box3x3 => box_blur_u8(src, buf, 3, strategy)?,
            PyramidFilter::Median3x3 => median_blur3_u8(src, buf, strategy)?,
            PyramidFilter::Gaussian3x3 => gaussian_blur3_u8(src, buf, strategy)?,
            PyramidFilter::DirectSubsample | PyramidFilter::Gaussian5x5 => {}
        }
    }

    let source = filtered.as_ref().unwrap_or(src);
    let (cols, rows) = (dst.cols(), dst.rows());
    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        let srow = source.row(2 * y);
        drow[..cols]
            .iter_mut()
            .enumerate()
            .for_each(|(x, v)| *v = srow[2 * x]);
    })?;

    Ok(())
}

fn gaussian5x5_decimate(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    border: BorderType,
    strategy: ExecutionStrategy,
) -> Result<(), ImageError> {
    const WEIGHTS: [u32; 5] = [1, 4, 6, 4, 1];

    let (scols, srows) = (src.cols(), src.rows());
    let (cols, rows) = (dst.cols(), dst.rows());

    let taps_x: Vec<[usize; 5]> = (0..cols)
        .map(|x| {
            std::array::from_fn(|j| {
                border_interpolate((2 * x + j) as isize - 2, scols, border).unwrap_or(0)
            })
        })
        .collect();

    let stride = dst.stride();

    par_rows_mut(strategy, dst.as_slice_mut(), stride, cols * rows, |y, drow| {
        let mut column = vec![0u32; scols];
        for (i, w) in WEIGHTS.iter().enumerate() {
            let sy = border_interpolate((2 * y + i) as isize - 2, srows, border).unwrap_or(0);
            column
                .iter_mut()
                .zip(src.row(sy))
                .for_each(|(acc, &v)| *acc += w * v as u32);
        }

        for (out, taps) in drow[..cols].iter_mut().zip(taps_x.iter()) {
            let sum: u32 = WEIGHTS
                .iter()
                .zip(taps.iter())
                .map(|(w, &sx)| w * column[sx])
                .sum();
            *out = ((sum + 128) >> 8) as u8;
        }
    })?;

    Ok(())
}

/// One level of a [`Pyramid`].
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidLevel {
    /// The level image.
    pub image: Image<u8, 1>,
    /// The `(dx, dy)` gradient of the level image, if it was requested.
    pub gradient: Option<Image<i16, 2>>,
}

/// An image pyramid, finest level first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pyramid {
    /// The levels; level `k + 1` is `((w + 1) / 2, (h + 1) / 2)` of level `k`.
    pub levels: Vec<PyramidLevel>,
}

impl Pyramid {
    /// The index of the coarsest level that was built.
    ///
    /// Construction may stop before the requested depth, so use this value as the working
    /// maximum level.
    pub fn max_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the pyramid has no levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get a level by index.
    pub fn level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    /// Whether every level carries a gradient.
    pub fn has_gradients(&self) -> bool {
        self.levels.iter().all(|l| l.gradient.is_some())
    }
}

/// Parameters of [`build_pyramid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidParams {
    /// Requested index of the coarsest level.
    pub max_level: usize,
    /// Tracking window; no level is built whose width or height does not exceed it.
    pub win_size: ImageSize,
    /// Pre-filter applied before each decimation.
    pub filter: PyramidFilter,
    /// Derivative attached to every level, if any.
    pub derivative: Option<SpatialDerivative>,
    /// Border mode used while decimating.
    pub border: BorderType,
}

impl Default for PyramidParams {
    fn default() -> Self {
        Self {
            max_level: 3,
            win_size: ImageSize {
                width: 21,
                height: 21,
            },
            filter: PyramidFilter::default(),
            derivative: None,
            border: BorderType::Reflect101,
        }
    }
}

/// Compute the gradient of one level.
pub fn level_gradient(
    image: &Image<u8, 1>,
    derivative: SpatialDerivative,
    strategy: ExecutionStrategy,
) -> Result<Image<i16, 2>, ImageError> {
    let mut gradient = Image::<i16, 2>::from_size_val(image.size(), 0)?;
    spatial_derivative(image, &mut gradient, derivative, strategy)?;
    Ok(gradient)
}

/// Build an image pyramid.
///
/// Level 0 is a copy of `image`. Construction stops at `params.max_level`, or earlier at
/// the last level whose half size would no longer exceed the window in both axes.
///
/// # Errors
///
/// Returns [`ImageError::UnsupportedBorder`] for a constant border.
///
/// # Example
///
/// ```
/// use sparseflow_image::Image;
/// use sparseflow_imgproc::parallel::ExecutionStrategy;
/// use sparseflow_imgproc::pyramid::{build_pyramid, PyramidParams};
///
/// let image = Image::<u8, 1>::from_size_val([100, 80].into(), 0).unwrap();
/// let pyramid = build_pyramid(&image, &PyramidParams::default(), ExecutionStrategy::Serial)
///     .unwrap();
///
/// // 25x20 would not exceed the 21x21 window
/// assert_eq!(pyramid.max_level(), 1);
/// ```
pub fn build_pyramid(
    image: &Image<u8, 1>,
    params: &PyramidParams,
    strategy: ExecutionStrategy,
) -> Result<Pyramid, ImageError> {
    if params.border == BorderType::Constant {
        return Err(ImageError::UnsupportedBorder(params.border));
    }

    let mut levels: Vec<PyramidLevel> = Vec::with_capacity(params.max_level + 1);
    let mut current = image.clone();

    for level in 0..=params.max_level {
        let gradient = params
            .derivative
            .map(|d| level_gradient(&current, d, strategy))
            .transpose()?;

        let next_size = current.size().half();
        let stop = level == params.max_level
            || next_size.width <= params.win_size.width
            || next_size.height <= params.win_size.height;

        let next = if stop {
            None
        } else {
            let mut next = Image::<u8, 1>::from_size_val(next_size, 0)?;
            pyrdown(&current, &mut next, params.filter, params.border, strategy)?;
            Some(next)
        };

        levels.push(PyramidLevel {
            image: current,
            gradient,
        });

        match next {
            Some(next) => current = next,
            None => break,
        }
    }

    log::debug!(
        "built {} pyramid levels from {} (requested {}, filter {})",
        levels.len(),
        image.size(),
        params.max_level + 1,
        params.filter
    );

    Ok(Pyramid { levels })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(size: ImageSize) -> Result<Image<u8, 1>, ImageError> {
        let data = (0..size.height)
            .flat_map(|y| (0..size.width).map(move |x| if (x + y) % 2 == 0 { 200 } else { 10 }))
            .collect();
        Image::new(size, data)
    }

    #[test]
    fn test_direct_subsample_checkerboard() -> Result<(), ImageError> {
        let src = checkerboard([9, 7].into())?;
        let mut dst = Image::<u8, 1>::from_size_val(src.size().half(), 0)?;
        pyrdown(
            &src,
            &mut dst,
            PyramidFilter::DirectSubsample,
            BorderType::Reflect101,
            ExecutionStrategy::Serial,
        )?;

        assert_eq!(dst.size(), ImageSize { width: 5, height: 4 });
        for y in 0..dst.height() {
            for x in 0..dst.width() {
                assert_eq!(dst.get(x, y, 0), src.get(2 * x, 2 * y, 0));
            }
        }
        Ok(())
    }

    #[test]
    fn test_pyrdown_sizes() -> Result<(), ImageError> {
        for (w, h) in [(1, 1), (2, 3), (17, 10), (64, 33)] {
            let src = checkerboard([w, h].into())?;
            let mut dst = Image::<u8, 1>::from_size_val(src.size().half(), 0)?;
            for filter in PyramidFilter::ALL {
                pyrdown(&src, &mut dst, filter, BorderType::Reflect101, Default::default())?;
            }
            assert_eq!(dst.width(), (w + 1) / 2);
            assert_eq!(dst.height(), (h + 1) / 2);
        }
        Ok(())
    }

    #[test]
    fn test_pyrdown_rejects_constant_border() -> Result<(), ImageError> {
        let src = checkerboard([4, 4].into())?;
        let mut dst = Image::<u8, 1>::from_size_val([2, 2].into(), 0)?;
        let res = pyrdown(
            &src,
            &mut dst,
            PyramidFilter::Gaussian5x5,
            BorderType::Constant,
            ExecutionStrategy::Serial,
        );
        assert_eq!(res, Err(ImageError::UnsupportedBorder(BorderType::Constant)));

        let mut wrong = Image::<u8, 1>::from_size_val([3, 2].into(), 0)?;
        let res = pyrdown(
            &src,
            &mut wrong,
            PyramidFilter::Box2x2,
            BorderType::Reflect101,
            ExecutionStrategy::Serial,
        );
        assert_eq!(res, Err(ImageError::InvalidImageSize(2, 2, 3, 2)));
        Ok(())
    }

    #[test]
    fn test_gaussian5x5() -> Result<(), ImageError> {
        let src = Image::<u8, 1>::from_size_val([8, 6].into(), 93)?;
        let mut dst = Image::<u8, 1>::from_size_val([4, 3].into(), 0)?;
        pyrdown(
            &src,
            &mut dst,
            PyramidFilter::Gaussian5x5,
            BorderType::Reflect101,
            ExecutionStrategy::Serial,
        )?;
        assert!(dst.as_slice().iter().all(|&v| v == 93));

        // a single bright pixel under the center tap gets 36 / 256 of its value
        let mut src = Image::<u8, 1>::from_size_val([8, 8].into(), 0)?;
        src.set(4, 4, 0, 255)?;
        let mut dst = Image::<u8, 1>::from_size_val([4, 4].into(), 0)?;
        pyrdown(
            &src,
            &mut dst,
            PyramidFilter::Gaussian5x5,
            BorderType::Reflect101,
            ExecutionStrategy::Serial,
        )?;
        assert_eq!(dst.get(2, 2, 0), Some(&36));
        assert_eq!(dst.get(1, 2, 0), Some(&6));
        Ok(())
    }

    #[test]
    fn test_box2x2_then_subsample() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let src = Image::<u8, 1>::new(
            [4, 4].into(),
            vec![
                0, 0, 0, 0,
                0, 40, 80, 0,
                0, 120, 160, 0,
                0, 0, 0, 0,
            ],
        )?;
        let mut dst = Image::<u8, 1>::from_size_val([2, 2].into(), 0)?;
        pyrdown(
            &src,
            &mut dst,
            PyramidFilter::Box2x2,
            BorderType::Reflect101,
            ExecutionStrategy::Serial,
        )?;
        // the 2x2 box at (2, 2) covers rows 1..=2 and columns 1..=2
        assert_eq!(dst.get(1, 1, 0), Some(&100));
        // at (0, 0) the window reflects onto (1, 1)
        assert_eq!(dst.get(0, 0, 0), Some(&10));
        Ok(())
    }

    #[test]
    fn test_build_pyramid_levels() -> Result<(), ImageError> {
        let image = checkerboard([200, 150].into())?;
        let params = PyramidParams {
            max_level: 5,
            derivative: Some(SpatialDerivative::Binarized),
            ..Default::default()
        };
        let pyramid = build_pyramid(&image, &params, ExecutionStrategy::Serial)?;

        // 200x150 -> 100x75 -> 50x38 -> 25x19 stops
        assert_eq!(pyramid.max_level(), 2);
        assert!(pyramid.has_gradients());
        assert_eq!(pyramid.levels[0].image, image);
        for pair in pyramid.levels.windows(2) {
            assert_eq!(pair[1].image.size(), pair[0].image.size().half());
        }
        for level in &pyramid.levels {
            let gradient = level.gradient.as_ref().map(|g| g.size());
            assert_eq!(gradient, Some(level.image.size()));
        }
        Ok(())
    }

    #[test]
    fn test_build_pyramid_requested_depth() -> Result<(), ImageError> {
        let image = checkerboard([640, 480].into())?;
        let params = PyramidParams {
            max_level: 2,
            ..Default::default()
        };
        let pyramid = build_pyramid(&image, &params, ExecutionStrategy::Serial)?;
        assert_eq!(pyramid.len(), 3);
        assert!(pyramid.levels.iter().all(|l| l.gradient.is_none()));
        assert_eq!(pyramid.levels[2].image.size(), ImageSize { width: 160, height: 120 });
        Ok(())
    }

    #[test]
    fn test_filter_names() -> Result<(), ImageError> {
        for filter in PyramidFilter::ALL {
            assert_eq!(filter.name().parse::<PyramidFilter>()?, filter);
        }
        assert!("BOX_4x4".parse::<PyramidFilter>().is_err());
        Ok(())
    }
}
