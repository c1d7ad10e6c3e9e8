use num_traits::NumCast;

use crate::border::{border_interpolate, BorderType};
use crate::error::ImageError;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use sparseflow_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels covered by the size.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Size of the next pyramid level, `((w + 1) / 2, (h + 1) / 2)`.
    pub fn half(&self) -> ImageSize {
        ImageSize {
            width: (self.width + 1) / 2,
            height: (self.height + 1) / 2,
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// The storage depth of a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleDepth {
    /// 8-bit unsigned intensity.
    U8,
    /// 16-bit signed fixed point, used for gradients.
    S16,
    /// 32-bit float, used for response maps.
    F32,
}

/// Trait for image sample types.
///
/// Send and Sync are required to split rows across rayon workers.
pub trait Sample: Copy + Default + PartialOrd + Send + Sync + NumCast + 'static {
    /// The depth tag of the sample type.
    const DEPTH: SampleDepth;
}

impl Sample for u8 {
    const DEPTH: SampleDepth = SampleDepth::U8;
}

impl Sample for i16 {
    const DEPTH: SampleDepth = SampleDepth::S16;
}

impl Sample for f32 {
    const DEPTH: SampleDepth = SampleDepth::F32;
}

/// Represents an image with pixel data.
///
/// The samples are stored row-major with `CHANNELS` interleaved values per pixel. Each row
/// starts `stride` elements after the previous one, so `stride >= width * CHANNELS`.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const CHANNELS: usize> {
    size: ImageSize,
    stride: usize,
    data: Vec<T>,
}

impl<T: Sample, const CHANNELS: usize> Image<T, CHANNELS> {
    /// Create a new image from pixel data.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `data` - The pixel data of the image, tightly packed.
    ///
    /// # Returns
    ///
    /// A new image with the given pixel data.
    ///
    /// # Errors
    ///
    /// If the length of the pixel data does not match the image size, an error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use sparseflow_image::{Image, ImageSize};
    ///
    /// let image = Image::<u8, 2>::new(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     vec![0u8; 10 * 20 * 2],
    /// ).unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// assert_eq!(image.num_channels(), 2);
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        Self::with_stride(size, size.width * CHANNELS, data)
    }

    /// Create a new image whose rows are `stride` elements apart.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidStride`] if a row does not fit in the stride and
    /// [`ImageError::InvalidChannelShape`] if `data.len() != stride * height`.
    pub fn with_stride(size: ImageSize, stride: usize, data: Vec<T>) -> Result<Self, ImageError> {
        let row_len = size.width * CHANNELS;
        if stride < row_len {
            return Err(ImageError::InvalidStride(stride, row_len));
        }

        if data.len() != stride * size.height {
            return Err(ImageError::InvalidChannelShape(
                data.len(),
                stride * size.height,
            ));
        }

        Ok(Self { size, stride, data })
    }

    /// Create a new image with the given size and every sample set to `val`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sparseflow_image::{Image, ImageSize};
    ///
    /// let image = Image::<i16, 2>::from_size_val([4, 3].into(), 7).unwrap();
    ///
    /// assert_eq!(image.get(3, 2, 1), Some(&7));
    /// ```
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError> {
        let data = vec![val; size.width * size.height * CHANNELS];
        Self::new(size, data)
    }

    /// Create a new image by copying a tightly packed slice.
    pub fn from_size_slice(size: ImageSize, data: &[T]) -> Result<Self, ImageError> {
        Self::new(size, data.to_vec())
    }

    /// Get the size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the number of columns of the image.
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// Get the number of rows of the image.
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// Distance in elements between the start of two consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the number of channels in the image.
    pub fn num_channels(&self) -> usize {
        CHANNELS
    }

    /// Get the sample depth of the image.
    pub fn depth(&self) -> SampleDepth {
        T::DEPTH
    }

    /// Whether the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    /// Whether the rows are stored without padding.
    pub fn is_continuous(&self) -> bool {
        self.stride == self.size.width * CHANNELS
    }

    /// The `width * CHANNELS` samples of row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.stride;
        &self.data[start..start + self.size.width * CHANNELS]
    }

    /// Mutable access to the samples of row `y`.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let start = y * self.stride;
        let len = self.size.width * CHANNELS;
        &mut self.data[start..start + len]
    }

    /// The raw storage including any row padding.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable raw storage including any row padding.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the image and return its storage.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    #[inline]
    fn offset(&self, x: usize, y: usize, ch: usize) -> usize {
        y * self.stride + x * CHANNELS + ch
    }

    /// Get a sample, or `None` when the index is outside the image.
    #[inline]
    pub fn get(&self, x: usize, y: usize, ch: usize) -> Option<&T> {
        if x >= self.size.width || y >= self.size.height || ch >= CHANNELS {
            return None;
        }
        self.data.get(self.offset(x, y, ch))
    }

    /// Set a sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel or the channel is outside the image.
    pub fn set(&mut self, x: usize, y: usize, ch: usize, val: T) -> Result<(), ImageError> {
        if x >= self.size.width || y >= self.size.height {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.size.width,
                self.size.height,
            ));
        }
        if ch >= CHANNELS {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, CHANNELS));
        }
        let offset = self.offset(x, y, ch);
        self.data[offset] = val;
        Ok(())
    }

    /// Read a sample at a possibly out-of-image location.
    ///
    /// Coordinates outside the image are mapped back according to `border`; with
    /// [`BorderType::Constant`] the `border_value` is returned instead.
    ///
    /// # Examples
    ///
    /// ```
    /// use sparseflow_image::{BorderType, Image, ImageSize};
    ///
    /// let image = Image::<u8, 1>::new([3, 1].into(), vec![1, 2, 3]).unwrap();
    ///
    /// assert_eq!(image.get_with_border(-1, 0, 0, BorderType::Reflect101, 0), 2);
    /// assert_eq!(image.get_with_border(-1, 0, 0, BorderType::Replicate, 0), 1);
    /// assert_eq!(image.get_with_border(3, 0, 0, BorderType::Constant, 9), 9);
    /// ```
    #[inline]
    pub fn get_with_border(
        &self,
        x: isize,
        y: isize,
        ch: usize,
        border: BorderType,
        border_value: T,
    ) -> T {
        let xi = border_interpolate(x, self.size.width, border);
        let yi = border_interpolate(y, self.size.height, border);
        match (xi, yi) {
            (Some(xi), Some(yi)) if ch < CHANNELS => self.data[self.offset(xi, yi, ch)],
            _ => border_value,
        }
    }

    /// Extract one channel into a new single channel image.
    ///
    /// # Errors
    ///
    /// Returns an error if `ch` is not a valid channel.
    pub fn channel(&self, ch: usize) -> Result<Image<T, 1>, ImageError> {
        if ch >= CHANNELS {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, CHANNELS));
        }

        let mut data = Vec::with_capacity(self.size.area());
        for y in 0..self.size.height {
            data.extend(self.row(y).iter().skip(ch).step_by(CHANNELS).copied());
        }

        Image::new(self.size, data)
    }

    /// Cast every sample into another sample type.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::CastError`] when a sample does not fit the target type.
    pub fn cast<U: Sample>(&self) -> Result<Image<U, CHANNELS>, ImageError> {
        let mut data = Vec::with_capacity(self.size.area() * CHANNELS);
        for y in 0..self.size.height {
            for &v in self.row(y) {
                data.push(U::from(v).ok_or(ImageError::CastError)?);
            }
        }
        Image::new(self.size, data)
    }
}
