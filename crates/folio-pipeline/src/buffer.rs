//! Pixel storage.
//!
//! An [`ImageBuffer`] pairs an [`ImageFormat`] with an interleaved,
//! row-major sample store. Storage is reference counted: [`ImageBuffer::view`]
//! (and `clone`) share it instead of copying, and the first write through
//! any holder detaches that holder with a private copy. A view therefore
//! never observes writes made through another holder after it was taken.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use siphasher::sip::SipHasher13;

use crate::format::{ChannelSemantics, ImageFormat, PixelType};
use crate::types::{Dimensions, PipelineError};

/// Typed sample store.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// Unsigned 8-bit samples.
    U8(Vec<u8>),
    /// Unsigned 16-bit samples.
    U16(Vec<u16>),
    /// Signed 16-bit samples.
    I16(Vec<i16>),
    /// 32-bit float samples.
    F32(Vec<f32>),
    /// 64-bit float samples.
    F64(Vec<f64>),
}

/// Apply `$body` to the vector inside any [`Samples`] variant.
macro_rules! with_samples {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => $body,
            Samples::U16($v) => $body,
            Samples::I16($v) => $body,
            Samples::F32($v) => $body,
            Samples::F64($v) => $body,
        }
    };
}

/// Apply `$body` to the vector inside any [`Samples`] variant and wrap the
/// resulting vector in the same variant.
macro_rules! map_samples {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => Samples::U8($body),
            Samples::U16($v) => Samples::U16($body),
            Samples::I16($v) => Samples::I16($body),
            Samples::F32($v) => Samples::F32($body),
            Samples::F64($v) => Samples::F64($body),
        }
    };
}

pub(crate) use map_samples;

impl Samples {
    /// `len` zero samples of type `pixel_type`.
    #[must_use]
    pub fn zeroed(pixel_type: PixelType, len: usize) -> Self {
        match pixel_type {
            PixelType::U8 => Self::U8(vec![0; len]),
            PixelType::U16 => Self::U16(vec![0; len]),
            PixelType::I16 => Self::I16(vec![0; len]),
            PixelType::F32 => Self::F32(vec![0.0; len]),
            PixelType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    /// Build samples of type `pixel_type` from `f64` values, rounding and
    /// saturating for integer types.
    #[must_use]
    pub fn from_f64(pixel_type: PixelType, values: impl IntoIterator<Item = f64>) -> Self {
        let values = values.into_iter();
        match pixel_type {
            PixelType::U8 => Self::U8(values.map(u8::from_f64).collect()),
            PixelType::U16 => Self::U16(values.map(u16::from_f64).collect()),
            PixelType::I16 => Self::I16(values.map(i16::from_f64).collect()),
            PixelType::F32 => Self::F32(values.map(f32::from_f64).collect()),
            PixelType::F64 => Self::F64(values.collect()),
        }
    }

    /// Sample type of the store.
    #[must_use]
    pub const fn pixel_type(&self) -> PixelType {
        match self {
            Self::U8(_) => PixelType::U8,
            Self::U16(_) => PixelType::U16,
            Self::I16(_) => PixelType::I16,
            Self::F32(_) => PixelType::F32,
            Self::F64(_) => PixelType::F64,
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        with_samples!(self, v => v.len())
    }

    /// Whether the store holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `index` widened to `f64`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        with_samples!(self, v => v.get(index).map(|s| s.to_f64()))
    }

    /// All samples widened to `f64`.
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_samples!(self, v => v.iter().map(|s| s.to_f64()).collect())
    }
}

/// A numeric type that can be stored in [`Samples`].
pub trait Sample: Copy + Default + PartialOrd + Send + Sync + 'static {
    /// The matching [`PixelType`].
    const PIXEL_TYPE: PixelType;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;

    /// Narrow from `f64`, rounding and saturating for integer types.
    fn from_f64(value: f64) -> Self;

    /// Borrow the samples if they are of this type.
    fn slice(samples: &Samples) -> Option<&[Self]>;

    /// Mutably borrow the samples if they are of this type.
    fn slice_mut(samples: &mut Samples) -> Option<&mut [Self]>;
}

macro_rules! impl_integer_sample {
    ($t:ty, $variant:ident) => {
        impl Sample for $t {
            const PIXEL_TYPE: PixelType = PixelType::$variant;

            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            fn from_f64(value: f64) -> Self {
                // `as` saturates at the type bounds and maps NaN to zero.
                value.round() as Self
            }

            fn slice(samples: &Samples) -> Option<&[Self]> {
                match samples {
                    Samples::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(samples: &mut Samples) -> Option<&mut [Self]> {
                match samples {
                    Samples::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_integer_sample!(u8, U8);
impl_integer_sample!(u16, U16);
impl_integer_sample!(i16, I16);

impl Sample for f32 {
    const PIXEL_TYPE: PixelType = PixelType::F32;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(value: f64) -> Self {
        value as Self
    }

    fn slice(samples: &Samples) -> Option<&[Self]> {
        match samples {
            Samples::F32(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(samples: &mut Samples) -> Option<&mut [Self]> {
        match samples {
            Samples::F32(v) => Some(v),
            _ => None,
        }
    }
}

impl Sample for f64 {
    const PIXEL_TYPE: PixelType = PixelType::F64;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn slice(samples: &Samples) -> Option<&[Self]> {
        match samples {
            Samples::F64(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(samples: &mut Samples) -> Option<&mut [Self]> {
        match samples {
            Samples::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// An image: format descriptor plus pixel samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    format: ImageFormat,
    samples: Arc<Samples>,
}

fn check_shape(format: &ImageFormat, samples: &Samples) -> Result<(), PipelineError> {
    if samples.pixel_type() != format.pixel_type() || samples.len() != format.sample_count() {
        return Err(PipelineError::ShapeMismatch {
            expected: format!("{} samples of {}", format.sample_count(), format.pixel_type()),
            found: format!("{} samples of {}", samples.len(), samples.pixel_type()),
        });
    }
    Ok(())
}

impl ImageBuffer {
    /// Allocate a zero-initialised buffer for `format`.
    ///
    /// Formats are validated on construction, so allocation itself cannot
    /// fail.
    #[must_use]
    pub fn new(format: ImageFormat) -> Self {
        let samples = Samples::zeroed(format.pixel_type(), format.sample_count());
        Self {
            format,
            samples: Arc::new(samples),
        }
    }

    /// Wrap existing samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if the sample type or
    /// sample count disagrees with `format`.
    pub fn from_samples(format: ImageFormat, samples: Samples) -> Result<Self, PipelineError> {
        check_shape(&format, &samples)?;
        Ok(Self {
            format,
            samples: Arc::new(samples),
        })
    }

    /// Check that the sample store still matches the format.
    ///
    /// [`samples_mut`](Self::samples_mut) can replace the whole store, so
    /// code handing a buffer to a filter re-checks it afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if the sample type or
    /// sample count disagrees with the format.
    pub fn check_shape(&self) -> Result<(), PipelineError> {
        check_shape(&self.format, &self.samples)
    }

    /// Build a buffer by evaluating `f(x, y, channel)` for every sample.
    #[must_use]
    pub fn from_fn(format: ImageFormat, mut f: impl FnMut(u32, u32, u32) -> f64) -> Self {
        let (width, height, channels) = (format.width(), format.height(), format.channel_count());
        let values = (0..height).flat_map(|y| {
            (0..width).flat_map(move |x| (0..channels).map(move |c| (x, y, c)))
        });
        let samples = Samples::from_f64(
            format.pixel_type(),
            values.map(|(x, y, c)| f(x, y, c)).collect::<Vec<_>>(),
        );
        Self {
            format,
            samples: Arc::new(samples),
        }
    }

    /// Share the storage of `other` under a different but compatible
    /// format.
    ///
    /// The new format must use the same sample type and describe the same
    /// number of bytes; everything else (dimensions, channel split,
    /// semantics) may differ.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if the formats are not
    /// compatible.
    pub fn view(other: &Self, format: ImageFormat) -> Result<Self, PipelineError> {
        if format.pixel_type() != other.format.pixel_type()
            || format.byte_size() != other.format.byte_size()
        {
            return Err(PipelineError::ShapeMismatch {
                expected: other.format.to_string(),
                found: format.to_string(),
            });
        }
        Ok(Self {
            format,
            samples: Arc::clone(&other.samples),
        })
    }

    /// Whether `self` and `other` currently share storage.
    #[must_use]
    pub fn shares_storage_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }

    /// The format descriptor.
    #[must_use]
    pub const fn format(&self) -> &ImageFormat {
        &self.format
    }

    /// Width and height.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.format.dimensions()
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.format.width()
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.format.height()
    }

    /// The sample store.
    #[must_use]
    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    /// The sample store, detached from any other holder first.
    pub fn samples_mut(&mut self) -> &mut Samples {
        Arc::make_mut(&mut self.samples)
    }

    /// Typed view of the samples, `None` if they are not of type `T`.
    #[must_use]
    pub fn as_slice<T: Sample>(&self) -> Option<&[T]> {
        T::slice(&self.samples)
    }

    /// Typed mutable view of the samples, `None` if they are not of type
    /// `T`.
    pub fn as_mut_slice<T: Sample>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(self.samples_mut())
    }

    /// Typed view of the samples for an operation that requires type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedPixelType`] naming `operation`
    /// if the samples are of another type.
    pub fn typed<T: Sample>(&self, operation: &'static str) -> Result<&[T], PipelineError> {
        let pixel_type = self.format.pixel_type();
        T::slice(&self.samples).ok_or(PipelineError::UnsupportedPixelType {
            operation,
            pixel_type,
        })
    }

    /// Typed mutable view of the samples for an operation that requires
    /// type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedPixelType`] naming `operation`
    /// if the samples are of another type.
    pub fn typed_mut<T: Sample>(
        &mut self,
        operation: &'static str,
    ) -> Result<&mut [T], PipelineError> {
        let pixel_type = self.format.pixel_type();
        T::slice_mut(self.samples_mut()).ok_or(PipelineError::UnsupportedPixelType {
            operation,
            pixel_type,
        })
    }

    /// Sample at column `x`, row `y`, channel `channel`, widened to `f64`.
    #[must_use]
    pub fn sample(&self, x: u32, y: u32, channel: u32) -> Option<f64> {
        if x >= self.width() || y >= self.height() || channel >= self.format.channel_count() {
            return None;
        }
        let channels = self.format.channel_count() as usize;
        let index = (y as usize * self.width() as usize + x as usize) * channels + channel as usize;
        self.samples.get(index)
    }

    /// Consume the buffer and return its samples, copying only if the
    /// storage is shared.
    #[must_use]
    pub fn into_samples(self) -> Samples {
        Arc::unwrap_or_clone(self.samples)
    }

    /// Set every sample to `value` (rounded and saturated for integer
    /// types).
    pub fn fill(&mut self, value: f64) {
        let len = self.format.sample_count();
        let pixel_type = self.format.pixel_type();
        *self.samples_mut() = Samples::from_f64(pixel_type, std::iter::repeat_n(value, len));
    }

    /// Set every sample to zero.
    pub fn clear(&mut self) {
        self.fill(0.0);
    }

    /// Rescale samples into the normalised float range.
    ///
    /// Integer samples are divided by the format's maximum value;
    /// normalised float samples are only converted to the requested
    /// precision.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedPixelType`] for float samples
    /// that are not normalised (they have no defined maximum).
    pub fn to_normalized_float(&self, double_precision: bool) -> Result<Self, PipelineError> {
        let Some(max) = self.format.max_value() else {
            return Err(PipelineError::UnsupportedPixelType {
                operation: "normalisation",
                pixel_type: self.format.pixel_type(),
            });
        };
        let pixel_type = if double_precision {
            PixelType::F64
        } else {
            PixelType::F32
        };
        let scale = if self.format.is_normalized() { 1.0 } else { max.recip() };
        let format = self.format.clone().with_pixel_type(pixel_type).normalized(true);
        let samples = Samples::from_f64(
            pixel_type,
            self.samples.to_f64_vec().into_iter().map(|v| v * scale),
        );
        Self::from_samples(format, samples)
    }

    /// Convert to other channel semantics.
    ///
    /// See [`crate::color`] for the supported conversions.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedConversion`] when no conversion
    /// exists from the current semantics to `target`.
    pub fn convert_color(&self, target: &ChannelSemantics) -> Result<Self, PipelineError> {
        let format = crate::color::conversion_format(&self.format, target)?;
        let mut output = Self::new(format);
        crate::color::convert_into(self, &mut output)?;
        Ok(output)
    }

    /// Convert into an existing destination buffer, whose format must be
    /// the conversion format for its channel semantics.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedConversion`] when no conversion
    /// exists, or [`PipelineError::ShapeMismatch`] when `destination` has
    /// the wrong format.
    pub fn convert_color_into(&self, destination: &mut Self) -> Result<(), PipelineError> {
        crate::color::convert_into(self, destination)
    }

    /// Reorder channels between RGB and BGR.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedConversion`] unless the buffer is
    /// RGB and `target` is BGR or vice versa.
    pub fn swap_channels(&self, target: &ChannelSemantics) -> Result<Self, PipelineError> {
        self.convert_color(target)
    }

    /// One single-channel buffer per channel, each tagged with its channel
    /// name when semantics are declared.
    #[must_use]
    pub fn split_channels(&self) -> Vec<Self> {
        let channels = self.format.channel_count() as usize;
        let names = self.format.channels().map(ChannelSemantics::names);
        let plain = self.format.clone().single_channel();
        (0..channels)
            .map(|c| {
                let samples = map_samples!(&*self.samples, v => v
                    .iter()
                    .skip(c)
                    .step_by(channels)
                    .copied()
                    .collect());
                let format = match &names {
                    Some(names) => plain
                        .clone()
                        .with_channels(ChannelSemantics::Custom(vec![names[c].to_owned()]))
                        .unwrap_or_else(|_| plain.clone()),
                    None => plain.clone(),
                };
                Self {
                    format,
                    samples: Arc::new(samples),
                }
            })
            .collect()
    }

    /// Swap rows and columns.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let (height, width, channels) = self.format.shape();
        let samples = map_samples!(&*self.samples, v => {
            let mut out = Vec::with_capacity(v.len());
            for x in 0..width {
                for y in 0..height {
                    let start = (y * width + x) * channels;
                    out.extend_from_slice(&v[start..start + channels]);
                }
            }
            out
        });
        Self {
            format: self.format.clone().transposed(),
            samples: Arc::new(samples),
        }
    }

    /// Mirror rows in place (top becomes bottom).
    pub fn flip_vertically(&mut self) {
        let (height, width, channels) = self.format.shape();
        let row = width * channels;
        with_samples!(self.samples_mut(), v => {
            for y in 0..height / 2 {
                let (top, bottom) = v.split_at_mut((height - 1 - y) * row);
                top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
            }
        });
    }

    /// Mirror columns in place (left becomes right).
    pub fn flip_horizontally(&mut self) {
        let (_, width, channels) = self.format.shape();
        let row = width * channels;
        with_samples!(self.samples_mut(), v => {
            for line in v.chunks_exact_mut(row) {
                for x in 0..width / 2 {
                    let mirror = width - 1 - x;
                    for c in 0..channels {
                        line.swap(x * channels + c, mirror * channels + c);
                    }
                }
            }
        });
    }

    /// Histogram of one channel over the format's value range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedPixelType`] for un-normalised
    /// float samples, and [`PipelineError::InvalidInput`] for an
    /// out-of-range channel or zero bins.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn histogram(&self, channel: u32, bins: usize) -> Result<Vec<u64>, PipelineError> {
        let Some((min, max)) = self.format.value_range() else {
            return Err(PipelineError::UnsupportedPixelType {
                operation: "histogram",
                pixel_type: self.format.pixel_type(),
            });
        };
        if channel >= self.format.channel_count() || bins == 0 {
            return Err(PipelineError::InvalidInput {
                filter: "histogram".to_owned(),
                reason: format!(
                    "channel {channel} with {bins} bins on {} channels",
                    self.format.channel_count()
                ),
            });
        }
        let channels = self.format.channel_count() as usize;
        let span = max - min;
        let mut histogram = vec![0_u64; bins];
        for value in self
            .samples
            .to_f64_vec()
            .into_iter()
            .skip(channel as usize)
            .step_by(channels)
        {
            let bin = (((value - min) / span) * bins as f64) as usize;
            histogram[bin.min(bins - 1)] += 1;
        }
        Ok(histogram)
    }

    /// Content hash of format and samples.
    ///
    /// Equal buffers have equal fingerprints; used to compare results
    /// across runs without keeping pixel data around.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = SipHasher13::new();
        self.format.hash(&mut hasher);
        with_samples!(&*self.samples, v => {
            for s in v {
                hasher.write(&s.to_le_bytes());
            }
        });
        hasher.finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn ramp_rgb(width: u32, height: u32) -> ImageBuffer {
        let format = ImageFormat::rgb8(width, height).unwrap();
        ImageBuffer::from_fn(format, |x, y, c| f64::from(x * 10 + y * 3 + c))
    }

    #[test]
    fn new_is_zeroed_and_sized() {
        let buffer = ImageBuffer::new(ImageFormat::rgb8(4, 3).unwrap());
        assert_eq!(buffer.samples().len(), 36);
        assert!(buffer.as_slice::<u8>().unwrap().iter().all(|&v| v == 0));
    }

    #[test]
    fn from_samples_checks_length_and_type() {
        let format = ImageFormat::gray8(2, 2).unwrap();
        assert!(ImageBuffer::from_samples(format.clone(), Samples::U8(vec![1, 2, 3, 4])).is_ok());
        assert!(matches!(
            ImageBuffer::from_samples(format.clone(), Samples::U8(vec![1, 2, 3])),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            ImageBuffer::from_samples(format, Samples::U16(vec![1, 2, 3, 4])),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn check_shape_catches_replaced_store() {
        let mut buffer = ImageBuffer::new(ImageFormat::gray8(2, 2).unwrap());
        assert!(buffer.check_shape().is_ok());
        *buffer.samples_mut() = Samples::F32(vec![0.0; 4]);
        assert!(matches!(buffer.check_shape(), Err(PipelineError::ShapeMismatch { .. })));
        *buffer.samples_mut() = Samples::U8(vec![0; 5]);
        assert!(buffer.check_shape().is_err());
    }

    #[test]
    fn view_shares_storage_under_new_semantics() {
        let rgb = ramp_rgb(4, 2);
        let bgr_format = rgb.format().clone().with_channels(ChannelSemantics::Bgr).unwrap();
        let view = ImageBuffer::view(&rgb, bgr_format).unwrap();
        assert!(view.shares_storage_with(&rgb));
        assert_eq!(view.samples(), rgb.samples());
    }

    #[test]
    fn view_may_reshape_with_same_byte_size() {
        let gray = ImageBuffer::new(ImageFormat::gray8(6, 2).unwrap());
        let reshaped = ImageBuffer::view(&gray, ImageFormat::new(2, 2, 3, PixelType::U8).unwrap());
        assert!(reshaped.is_ok());
    }

    #[test]
    fn view_rejects_incompatible_format() {
        let rgb = ramp_rgb(4, 2);
        let wrong_size = ImageFormat::rgb8(4, 3).unwrap();
        assert!(matches!(
            ImageBuffer::view(&rgb, wrong_size),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        let wrong_type = ImageFormat::new(4, 2, 3, PixelType::U16).unwrap();
        assert!(ImageBuffer::view(&rgb, wrong_type).is_err());
    }

    #[test]
    fn writes_detach_views() {
        let original = ramp_rgb(2, 2);
        let mut view = ImageBuffer::view(&original, original.format().clone()).unwrap();
        view.fill(7.0);
        assert!(!view.shares_storage_with(&original));
        assert_eq!(original.sample(0, 0, 0), Some(0.0));
        assert_eq!(view.sample(0, 0, 0), Some(7.0));
    }

    #[test]
    fn sample_indexing_is_row_major_interleaved() {
        let buffer = ramp_rgb(5, 4);
        assert_eq!(buffer.sample(2, 3, 1), Some(f64::from(2 * 10 + 3 * 3 + 1)));
        assert_eq!(buffer.sample(5, 0, 0), None);
        assert_eq!(buffer.sample(0, 0, 3), None);
    }

    #[test]
    fn to_normalized_float_scales_by_max() {
        let format = ImageFormat::gray8(2, 1).unwrap();
        let gray = ImageBuffer::from_samples(format, Samples::U8(vec![0, 255])).unwrap();
        let float = gray.to_normalized_float(false).unwrap();
        assert_eq!(float.format().pixel_type(), PixelType::F32);
        assert!(float.format().is_normalized());
        assert_eq!(float.as_slice::<f32>().unwrap(), &[0.0, 1.0]);

        let double = gray.to_normalized_float(true).unwrap();
        assert_eq!(double.as_slice::<f64>().unwrap(), &[0.0, 1.0]);
    }

    #[test]
    fn to_normalized_float_rejects_unnormalized_float() {
        let format = ImageFormat::gray8(1, 1).unwrap().with_pixel_type(PixelType::F32);
        let float = ImageBuffer::new(format);
        assert!(matches!(
            float.to_normalized_float(false),
            Err(PipelineError::UnsupportedPixelType { .. })
        ));
    }

    #[test]
    fn split_channels_tags_names() {
        let rgb = ramp_rgb(3, 2);
        let planes = rgb.split_channels();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[1].format().channel_count(), 1);
        assert_eq!(planes[1].format().channel_index("green"), Some(0));
        assert_eq!(planes[2].sample(1, 1, 0), rgb.sample(1, 1, 2));
    }

    #[test]
    fn transpose_swaps_axes() {
        let rgb = ramp_rgb(4, 3);
        let t = rgb.transpose();
        assert_eq!(t.width(), 3);
        assert_eq!(t.height(), 4);
        for c in 0..3 {
            assert_eq!(t.sample(2, 1, c), rgb.sample(1, 2, c));
        }
    }

    #[test]
    fn flips_mirror_in_place() {
        let rgb = ramp_rgb(4, 3);
        let mut v = rgb.clone();
        v.flip_vertically();
        assert_eq!(v.sample(1, 0, 2), rgb.sample(1, 2, 2));
        assert_eq!(v.sample(1, 1, 2), rgb.sample(1, 1, 2));

        let mut h = rgb.clone();
        h.flip_horizontally();
        assert_eq!(h.sample(0, 1, 0), rgb.sample(3, 1, 0));
        assert_eq!(h.sample(1, 1, 1), rgb.sample(2, 1, 1));
    }

    #[test]
    fn histogram_counts_full_range() {
        let format = ImageFormat::gray8(4, 1).unwrap();
        let gray = ImageBuffer::from_samples(format, Samples::U8(vec![0, 0, 128, 255])).unwrap();
        let histogram = gray.histogram(0, 2).unwrap();
        assert_eq!(histogram, vec![2, 2]);
        assert!(gray.histogram(1, 2).is_err());
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = ramp_rgb(3, 3);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.as_mut_slice::<u8>().unwrap()[0] = 99;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn integer_narrowing_rounds_and_saturates() {
        assert_eq!(u8::from_f64(254.6), 255);
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-4.0), 0);
        assert_eq!(i16::from_f64(-40000.0), i16::MIN);
    }
}
