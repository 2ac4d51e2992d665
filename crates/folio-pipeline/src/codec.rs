//! Decoding encoded images into buffers and encoding buffers as PNG.
//!
//! Accepts whatever the `image` crate can decode (PNG, JPEG, BMP, TIFF,
//! WebP). Gray images keep a single channel; everything else becomes RGB
//! with channels in red, green, blue order. 16-bit sources keep 16 bits.

use std::io::Cursor;

use image::{ColorType, DynamicImage};

use crate::buffer::{ImageBuffer, Samples};
use crate::format::{ChannelSemantics, ImageFormat, PixelType};
use crate::types::PipelineError;

/// Decode encoded image bytes.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty and
/// [`PipelineError::ImageDecode`] if the format is unrecognized or the
/// data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<ImageBuffer, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let img = image::load_from_memory(bytes)?;
    from_dynamic(&img)
}

/// Convert a decoded [`DynamicImage`] into a buffer.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidFormat`] for an image with a zero
/// dimension.
pub fn from_dynamic(img: &DynamicImage) -> Result<ImageBuffer, PipelineError> {
    let (width, height) = (img.width(), img.height());
    let (channels, pixel_type, samples) = match img.color() {
        ColorType::L8 | ColorType::La8 => (
            ChannelSemantics::Gray,
            PixelType::U8,
            Samples::U8(img.to_luma8().into_raw()),
        ),
        ColorType::L16 | ColorType::La16 => (
            ChannelSemantics::Gray,
            PixelType::U16,
            Samples::U16(img.to_luma16().into_raw()),
        ),
        ColorType::Rgb16 | ColorType::Rgba16 | ColorType::Rgb32F | ColorType::Rgba32F => (
            ChannelSemantics::Rgb,
            PixelType::U16,
            Samples::U16(img.to_rgb16().into_raw()),
        ),
        _ => (
            ChannelSemantics::Rgb,
            PixelType::U8,
            Samples::U8(img.to_rgb8().into_raw()),
        ),
    };
    let format = ImageFormat::with_semantics(width, height, pixel_type, channels)?;
    ImageBuffer::from_samples(format, samples)
}

/// Encode a buffer as PNG.
///
/// One-channel buffers are written as gray, three-channel buffers as RGB
/// (BGR buffers are reordered first). Normalised float samples are
/// rescaled to 8 bits.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedPixelType`] for signed or
/// un-normalised float samples and [`PipelineError::ImageEncode`] for
/// other channel counts or if encoding fails.
pub fn encode_png(buffer: &ImageBuffer) -> Result<Vec<u8>, PipelineError> {
    let buffer = if buffer.format().has_channels(&ChannelSemantics::Bgr) {
        buffer.swap_channels(&ChannelSemantics::Rgb)?
    } else {
        buffer.clone()
    };
    let format = buffer.format().clone();
    let (width, height) = (format.width(), format.height());
    let channels = format.channel_count();

    let samples = match format.pixel_type() {
        PixelType::F32 | PixelType::F64 if format.is_normalized() => Samples::from_f64(
            PixelType::U8,
            buffer
                .samples()
                .to_f64_vec()
                .into_iter()
                .map(|v| v * 255.0),
        ),
        PixelType::U8 | PixelType::U16 => buffer.into_samples(),
        pixel_type => {
            return Err(PipelineError::UnsupportedPixelType {
                operation: "PNG encoding",
                pixel_type,
            });
        }
    };

    let shape_error = || PipelineError::ImageEncode(format!("cannot encode {format} as PNG"));
    let img = match (samples, channels) {
        (Samples::U8(v), 1) => DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(width, height, v).ok_or_else(shape_error)?,
        ),
        (Samples::U8(v), 3) => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, v).ok_or_else(shape_error)?,
        ),
        (Samples::U16(v), 1) => DynamicImage::ImageLuma16(
            image::ImageBuffer::from_raw(width, height, v).ok_or_else(shape_error)?,
        ),
        (Samples::U16(v), 3) => DynamicImage::ImageRgb16(
            image::ImageBuffer::from_raw(width, height, v).ok_or_else(shape_error)?,
        ),
        _ => return Err(shape_error()),
    };

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| PipelineError::ImageEncode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use super::*;

    /// Encode an RGBA image as PNG with the `image` crate directly.
    fn rgba_png(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn rgba_decodes_to_rgb_u8() {
        let img = image::RgbaImage::from_fn(17, 31, |x, _| image::Rgba([x as u8, 64, 32, 255]));
        let buffer = decode(&rgba_png(&img)).unwrap();
        let format = buffer.format();
        assert_eq!((format.width(), format.height()), (17, 31));
        assert_eq!(format.pixel_type(), PixelType::U8);
        assert!(format.has_channels(&ChannelSemantics::Rgb));
        assert_eq!(buffer.sample(5, 3, 0), Some(5.0));
        assert_eq!(buffer.sample(5, 3, 2), Some(32.0));
    }

    #[test]
    fn gray_png_decodes_to_single_channel() {
        let gray = image::GrayImage::from_fn(4, 2, |x, y| image::Luma([(x + y * 4) as u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(gray)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let buffer = decode(&buf).unwrap();
        assert!(buffer.format().has_channels(&ChannelSemantics::Gray));
        assert_eq!(buffer.as_slice::<u8>().unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn png_round_trip_preserves_rgb_samples() {
        let format = ImageFormat::rgb8(3, 2).unwrap();
        let original = ImageBuffer::from_fn(format, |x, y, c| f64::from(x * 40 + y * 7 + c));
        let decoded = decode(&encode_png(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn bgr_is_written_in_rgb_order() {
        let format =
            ImageFormat::with_semantics(1, 1, PixelType::U8, ChannelSemantics::Bgr).unwrap();
        let bgr = ImageBuffer::from_samples(format, Samples::U8(vec![1, 2, 3])).unwrap();
        let decoded = decode(&encode_png(&bgr).unwrap()).unwrap();
        assert_eq!(decoded.as_slice::<u8>().unwrap(), &[3, 2, 1]);
    }

    #[test]
    fn normalised_float_is_rescaled_to_u8() {
        let format = ImageFormat::gray8(2, 1)
            .unwrap()
            .with_pixel_type(PixelType::F32)
            .normalized(true);
        let float = ImageBuffer::from_samples(format, Samples::F32(vec![0.0, 1.0])).unwrap();
        let decoded = decode(&encode_png(&float).unwrap()).unwrap();
        assert_eq!(decoded.as_slice::<u8>().unwrap(), &[0, 255]);
    }

    #[test]
    fn signed_samples_are_rejected() {
        let format = ImageFormat::gray8(1, 1).unwrap().with_pixel_type(PixelType::I16);
        assert!(matches!(
            encode_png(&ImageBuffer::new(format)),
            Err(PipelineError::UnsupportedPixelType { .. })
        ));
    }

    #[test]
    fn two_channel_buffers_are_rejected() {
        let format = ImageFormat::new(1, 1, 2, PixelType::U8).unwrap();
        assert!(matches!(
            encode_png(&ImageBuffer::new(format)),
            Err(PipelineError::ImageEncode(_))
        ));
    }
}
