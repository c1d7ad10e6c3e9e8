/// Border handling modes used when an operation reads outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderType {
    /// Fill all out-of-bounds pixels with a constant value.
    /// `iiii|abcd|iiii`
    Constant,

    /// Replicate the value of the nearest border pixel.
    /// `aaaa|abcd|dddd`
    Replicate,

    /// Reflect the image across the border, including the border pixel.
    /// `dcba|abcd|dcba`
    Reflect,

    /// Reflect the image across the border, excluding the border pixel.
    /// `dcb|abcd|cba`, the edge pixel is not repeated.
    #[default]
    Reflect101,
}

/// Map a possibly out-of-range coordinate onto a valid index.
///
/// # Arguments
///
/// * `p` - The coordinate along one axis, may be negative or past the end.
/// * `len` - The length of the axis.
/// * `border` - The border extrapolation mode.
///
/// # Returns
///
/// The index to read from, or `None` when the coordinate falls outside the image and
/// the border is [`BorderType::Constant`] (or the axis is empty).
///
/// # Example
///
/// ```
/// use sparseflow_image::{border_interpolate, BorderType};
///
/// assert_eq!(border_interpolate(-1, 5, BorderType::Reflect101), Some(1));
/// assert_eq!(border_interpolate(-1, 5, BorderType::Reflect), Some(0));
/// assert_eq!(border_interpolate(7, 5, BorderType::Replicate), Some(4));
/// assert_eq!(border_interpolate(-1, 5, BorderType::Constant), None);
/// ```
#[inline]
pub fn border_interpolate(p: isize, len: usize, border: BorderType) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let n = len as isize;
    if p >= 0 && p < n {
        return Some(p as usize);
    }

    match border {
        BorderType::Constant => None,
        BorderType::Replicate => Some(p.clamp(0, n - 1) as usize),
        BorderType::Reflect | BorderType::Reflect101 => {
            if n == 1 {
                return Some(0);
            }
            let delta = if border == BorderType::Reflect101 { 1 } else { 0 };
            let mut q = p;
            // fold repeatedly so coordinates more than one image away still land inside
            loop {
                if q < 0 {
                    q = -q - 1 + delta;
                } else if q >= n {
                    q = n - 1 - (q - n) - delta;
                } else {
                    break;
                }
            }
            Some(q as usize)
        }
    }
}
