//! Image format descriptors.
//!
//! An [`ImageFormat`] describes everything about an image except its
//! pixel values: dimensions, channel count, sample type, whether float
//! samples are normalised to `[0, 1]`, and optionally what each channel
//! means. The information phase of a pipeline update propagates formats
//! only, so every filter can decide its output shape before any pixel is
//! computed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError};

/// Numeric type of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 16-bit integer.
    I16,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl PixelType {
    /// Size of one sample in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Size of one sample in bits.
    #[must_use]
    pub const fn bits(self) -> usize {
        8 * self.bytes()
    }

    /// Whether the type is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        self.is_unsigned_integer() || self.is_signed_integer()
    }

    /// Whether the type is an unsigned integer type.
    #[must_use]
    pub const fn is_unsigned_integer(self) -> bool {
        matches!(self, Self::U8 | Self::U16)
    }

    /// Whether the type is a signed integer type.
    #[must_use]
    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::I16)
    }

    /// Whether the type is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

/// What the channels of an image mean, in storage order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSemantics {
    /// Red, green, blue.
    Rgb,
    /// Blue, green, red.
    Bgr,
    /// Hue, luminosity, saturation.
    Hls,
    /// A single intensity channel.
    Gray,
    /// A single label channel (unsigned integer labels).
    Label,
    /// A single mask channel (boolean interpretation).
    Binary,
    /// Arbitrary named channels.
    Custom(Vec<String>),
}

impl ChannelSemantics {
    /// Channel names in storage order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Rgb => vec!["red", "green", "blue"],
            Self::Bgr => vec!["blue", "green", "red"],
            Self::Hls => vec!["hue", "luminosity", "saturation"],
            Self::Gray => vec!["intensity"],
            Self::Label => vec!["label"],
            Self::Binary => vec!["mask"],
            Self::Custom(names) => names.iter().map(String::as_str).collect(),
        }
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Rgb | Self::Bgr | Self::Hls => 3,
            Self::Gray | Self::Label | Self::Binary => 1,
            Self::Custom(names) => names.len(),
        }
    }

    /// Whether there are no channels (only possible for `Custom`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the channel called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names().iter().position(|n| *n == name)
    }
}

impl fmt::Display for ChannelSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.names().join(", "))
    }
}

/// Shape, sample type and channel meaning of an image.
///
/// Construct with [`ImageFormat::new`] and refine with the `with_*`
/// methods; every constructor validates the invariants, so an
/// `ImageFormat` in hand always has non-zero dimensions and channel
/// semantics matching its channel count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawImageFormat", into = "RawImageFormat")]
pub struct ImageFormat {
    width: u32,
    height: u32,
    channel_count: u32,
    pixel_type: PixelType,
    normalized: bool,
    channels: Option<ChannelSemantics>,
}

/// Unvalidated serde mirror of [`ImageFormat`].
#[derive(Serialize, Deserialize)]
struct RawImageFormat {
    width: u32,
    height: u32,
    channel_count: u32,
    pixel_type: PixelType,
    #[serde(default)]
    normalized: bool,
    #[serde(default)]
    channels: Option<ChannelSemantics>,
}

impl TryFrom<RawImageFormat> for ImageFormat {
    type Error = PipelineError;

    fn try_from(raw: RawImageFormat) -> Result<Self, Self::Error> {
        let format = Self::new(raw.width, raw.height, raw.channel_count, raw.pixel_type)?
            .normalized(raw.normalized);
        match raw.channels {
            Some(channels) => format.with_channels(channels),
            None => Ok(format),
        }
    }
}

impl From<ImageFormat> for RawImageFormat {
    fn from(format: ImageFormat) -> Self {
        Self {
            width: format.width,
            height: format.height,
            channel_count: format.channel_count,
            pixel_type: format.pixel_type,
            normalized: format.normalized,
            channels: format.channels,
        }
    }
}

impl ImageFormat {
    /// Create a format without channel semantics.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if `width`, `height` or
    /// `channel_count` is zero.
    pub fn new(
        width: u32,
        height: u32,
        channel_count: u32,
        pixel_type: PixelType,
    ) -> Result<Self, PipelineError> {
        for (value, what) in [
            (width, "width"),
            (height, "height"),
            (channel_count, "channel count"),
        ] {
            if value < 1 {
                return Err(PipelineError::InvalidFormat(format!("{what} must be >= 1")));
            }
        }
        Ok(Self {
            width,
            height,
            channel_count,
            pixel_type,
            normalized: false,
            channels: None,
        })
    }

    /// Create a format whose channel count is implied by `channels`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if a dimension is zero or
    /// `channels` is an empty custom list.
    pub fn with_semantics(
        width: u32,
        height: u32,
        pixel_type: PixelType,
        channels: ChannelSemantics,
    ) -> Result<Self, PipelineError> {
        let count = u32::try_from(channels.len())
            .map_err(|_| PipelineError::InvalidFormat("too many channels".to_owned()))?;
        Self::new(width, height, count, pixel_type)?.with_channels(channels)
    }

    /// 8-bit RGB format.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if a dimension is zero.
    pub fn rgb8(width: u32, height: u32) -> Result<Self, PipelineError> {
        Self::with_semantics(width, height, PixelType::U8, ChannelSemantics::Rgb)
    }

    /// 8-bit single channel gray format.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if a dimension is zero.
    pub fn gray8(width: u32, height: u32) -> Result<Self, PipelineError> {
        Self::with_semantics(width, height, PixelType::U8, ChannelSemantics::Gray)
    }

    /// Copy with new channel semantics.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if the semantics do not
    /// name exactly `channel_count` channels.
    pub fn with_channels(mut self, channels: ChannelSemantics) -> Result<Self, PipelineError> {
        if channels.len() != self.channel_count as usize {
            return Err(PipelineError::InvalidFormat(format!(
                "channels {channels} don't match channel count {}",
                self.channel_count
            )));
        }
        self.channels = Some(channels);
        Ok(self)
    }

    /// Copy with a new channel count and semantics implied by it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if `channels` is empty.
    pub fn with_channel_layout(
        mut self,
        channels: ChannelSemantics,
    ) -> Result<Self, PipelineError> {
        let count = u32::try_from(channels.len())
            .map_err(|_| PipelineError::InvalidFormat("too many channels".to_owned()))?;
        if count < 1 {
            return Err(PipelineError::InvalidFormat(
                "channel count must be >= 1".to_owned(),
            ));
        }
        self.channel_count = count;
        self.channels = Some(channels);
        Ok(self)
    }

    /// Copy with a single channel and no semantics.
    #[must_use]
    pub fn single_channel(mut self) -> Self {
        self.channel_count = 1;
        self.channels = None;
        self
    }

    /// Copy without channel semantics.
    #[must_use]
    pub fn without_channels(mut self) -> Self {
        self.channels = None;
        self
    }

    /// Copy with new dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidFormat`] if a dimension is zero.
    pub fn with_size(self, width: u32, height: u32) -> Result<Self, PipelineError> {
        let mut resized = Self::new(width, height, self.channel_count, self.pixel_type)?;
        resized.normalized = self.normalized;
        resized.channels = self.channels;
        Ok(resized)
    }

    /// Copy with a new sample type.
    #[must_use]
    pub const fn with_pixel_type(mut self, pixel_type: PixelType) -> Self {
        self.pixel_type = pixel_type;
        self
    }

    /// Copy with the normalisation flag set to `normalized`.
    ///
    /// Only meaningful for float sample types.
    #[must_use]
    pub const fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// Copy with width and height swapped.
    #[must_use]
    pub fn transposed(mut self) -> Self {
        std::mem::swap(&mut self.width, &mut self.height);
        self
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Width and height.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Number of interleaved channels.
    #[must_use]
    pub const fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Sample type.
    #[must_use]
    pub const fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Whether float samples are normalised to `[0, 1]`.
    #[must_use]
    pub const fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Channel semantics, if declared.
    #[must_use]
    pub const fn channels(&self) -> Option<&ChannelSemantics> {
        self.channels.as_ref()
    }

    /// Whether the channel semantics are exactly `channels`.
    #[must_use]
    pub fn has_channels(&self, channels: &ChannelSemantics) -> bool {
        self.channels.as_ref() == Some(channels)
    }

    /// Position of the channel called `name`, if semantics are declared.
    #[must_use]
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.as_ref().and_then(|c| c.index_of(name))
    }

    /// `(height, width, channel_count)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channel_count as usize,
        )
    }

    /// Number of pixels (`width * height`).
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of samples (`pixel_count * channel_count`).
    #[must_use]
    pub const fn sample_count(&self) -> usize {
        self.pixel_count() * self.channel_count as usize
    }

    /// Size of the pixel store in bytes.
    #[must_use]
    pub const fn byte_size(&self) -> usize {
        self.sample_count() * self.pixel_type.bytes()
    }

    /// Smallest representable sample value.
    ///
    /// `None` for float types that are not normalised, which have no
    /// defined range.
    #[must_use]
    pub fn min_value(&self) -> Option<f64> {
        self.value_range().map(|(min, _)| min)
    }

    /// Largest representable sample value.
    ///
    /// `None` for float types that are not normalised.
    #[must_use]
    pub fn max_value(&self) -> Option<f64> {
        self.value_range().map(|(_, max)| max)
    }

    /// `(min, max)` sample range.
    #[must_use]
    pub fn value_range(&self) -> Option<(f64, f64)> {
        match self.pixel_type {
            PixelType::U8 => Some((0.0, f64::from(u8::MAX))),
            PixelType::U16 => Some((0.0, f64::from(u16::MAX))),
            PixelType::I16 => Some((f64::from(i16::MIN), f64::from(i16::MAX))),
            PixelType::F32 | PixelType::F64 if self.normalized => Some((0.0, 1.0)),
            PixelType::F32 | PixelType::F64 => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} {}",
            self.width, self.height, self.channel_count, self.pixel_type
        )?;
        if self.normalized {
            f.write_str(" normalized")?;
        }
        if let Some(channels) = &self.channels {
            write!(f, " {channels}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            ImageFormat::new(0, 10, 1, PixelType::U8),
            Err(PipelineError::InvalidFormat(_))
        ));
        assert!(matches!(
            ImageFormat::new(10, 0, 1, PixelType::U8),
            Err(PipelineError::InvalidFormat(_))
        ));
        assert!(matches!(
            ImageFormat::new(10, 10, 0, PixelType::U8),
            Err(PipelineError::InvalidFormat(_))
        ));
    }

    #[test]
    fn channels_must_match_count() {
        let format = ImageFormat::new(4, 4, 1, PixelType::U8).unwrap();
        assert!(format.clone().with_channels(ChannelSemantics::Gray).is_ok());
        assert!(matches!(
            format.with_channels(ChannelSemantics::Rgb),
            Err(PipelineError::InvalidFormat(_))
        ));
    }

    #[test]
    fn derived_sizes() {
        let format = ImageFormat::new(640, 480, 3, PixelType::U16).unwrap();
        assert_eq!(format.shape(), (480, 640, 3));
        assert_eq!(format.pixel_count(), 640 * 480);
        assert_eq!(format.sample_count(), 640 * 480 * 3);
        assert_eq!(format.byte_size(), 640 * 480 * 3 * 2);
    }

    #[test]
    fn value_ranges() {
        let u8f = ImageFormat::gray8(1, 1).unwrap();
        assert_eq!(u8f.value_range(), Some((0.0, 255.0)));
        let i16f = u8f.clone().with_pixel_type(PixelType::I16);
        assert_eq!(i16f.value_range(), Some((-32768.0, 32767.0)));
        let float = u8f.with_pixel_type(PixelType::F32);
        assert_eq!(float.value_range(), None);
        assert_eq!(float.normalized(true).value_range(), Some((0.0, 1.0)));
    }

    #[test]
    fn channel_lookup_by_name() {
        let format = ImageFormat::rgb8(2, 2).unwrap();
        assert_eq!(format.channel_index("green"), Some(1));
        assert_eq!(format.channel_index("alpha"), None);
        let bgr = format.with_channels(ChannelSemantics::Bgr).unwrap();
        assert_eq!(bgr.channel_index("red"), Some(2));
    }

    #[test]
    fn with_size_keeps_everything_else() {
        let format = ImageFormat::rgb8(640, 480).unwrap();
        let half = format.clone().with_size(320, 240).unwrap();
        assert_eq!(half.dimensions(), Dimensions { width: 320, height: 240 });
        assert_eq!(half.channels(), format.channels());
        assert!(half.clone().with_size(0, 240).is_err());
    }

    #[test]
    fn transposed_swaps_dimensions() {
        let format = ImageFormat::gray8(30, 10).unwrap().transposed();
        assert_eq!(format.width(), 10);
        assert_eq!(format.height(), 30);
    }

    #[test]
    fn display_mentions_shape_and_channels() {
        let format = ImageFormat::rgb8(3, 2).unwrap();
        assert_eq!(format.to_string(), "3x2x3 u8 (red, green, blue)");
    }

    #[test]
    fn serde_round_trip() {
        let format = ImageFormat::rgb8(8, 4).unwrap();
        let json = serde_json::to_string(&format).unwrap();
        let back: ImageFormat = serde_json::from_str(&json).unwrap();
        assert_eq!(format, back);
    }

    #[test]
    fn serde_rejects_invalid_format() {
        let json = r#"{"width":0,"height":4,"channel_count":1,"pixel_type":"u8"}"#;
        assert!(serde_json::from_str::<ImageFormat>(json).is_err());
    }
}
