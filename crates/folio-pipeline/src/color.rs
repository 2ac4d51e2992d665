//! Color conversions between channel semantics.
//!
//! Supported conversions:
//!
//! | from      | to    | output                                          |
//! |-----------|-------|-------------------------------------------------|
//! | RGB, BGR  | Gray  | same sample type, `0.299*R + 0.587*G + 0.114*B` |
//! | RGB       | HLS   | normalised `f32`, hue scaled from degrees to 0..1 |
//! | RGB       | BGR   | channels reordered                              |
//! | BGR       | RGB   | channels reordered                              |
//!
//! Anything else is rejected with [`PipelineError::UnsupportedConversion`].
//!
//! [`GrayFilter`] and [`HlsFilter`] expose the conversions as pipeline
//! steps.

use crate::buffer::{ImageBuffer, Samples};
use crate::filter::{Filter, first_format, unary};
use crate::format::{ChannelSemantics, ImageFormat, PixelType};
use crate::types::PipelineError;

/// Luma weights for red, green and blue (ITU-R BT.601).
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

fn unsupported(format: &ImageFormat, target: &ChannelSemantics) -> PipelineError {
    PipelineError::UnsupportedConversion {
        from: format
            .channels()
            .map_or_else(|| "undeclared channels".to_owned(), ToString::to_string),
        to: target.to_string(),
    }
}

/// Format produced by converting an image of `format` to `target`.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedConversion`] if no conversion
/// exists, or [`PipelineError::UnsupportedPixelType`] for an HLS
/// conversion of un-normalised float samples.
pub fn conversion_format(
    format: &ImageFormat,
    target: &ChannelSemantics,
) -> Result<ImageFormat, PipelineError> {
    use ChannelSemantics::{Bgr, Gray, Hls, Rgb};

    match (format.channels(), target) {
        (Some(Rgb | Bgr), Gray) => format.clone().with_channel_layout(Gray),
        (Some(Rgb), Bgr) | (Some(Bgr), Rgb) => format.clone().with_channels(target.clone()),
        (Some(Rgb), Hls) => {
            if format.max_value().is_none() {
                return Err(PipelineError::UnsupportedPixelType {
                    operation: "HLS conversion",
                    pixel_type: format.pixel_type(),
                });
            }
            Ok(format
                .clone()
                .with_pixel_type(PixelType::F32)
                .normalized(true)
                .with_channels(Hls)?)
        }
        _ => Err(unsupported(format, target)),
    }
}

/// Convert `source` into `destination`, whose format must be the
/// [`conversion_format`] for its own channel semantics.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedConversion`] if no conversion
/// exists and [`PipelineError::ShapeMismatch`] if `destination` has the
/// wrong format.
pub fn convert_into(
    source: &ImageBuffer,
    destination: &mut ImageBuffer,
) -> Result<(), PipelineError> {
    let Some(target) = destination.format().channels().cloned() else {
        return Err(PipelineError::UnsupportedConversion {
            from: source.format().to_string(),
            to: "undeclared channels".to_owned(),
        });
    };
    let expected = conversion_format(source.format(), &target)?;
    if &expected != destination.format() {
        return Err(PipelineError::ShapeMismatch {
            expected: expected.to_string(),
            found: destination.format().to_string(),
        });
    }

    let samples = match target {
        ChannelSemantics::Gray => to_gray(source),
        ChannelSemantics::Hls => to_hls(source)?,
        _ => swap_rgb_bgr(source),
    };
    *destination.samples_mut() = samples;
    Ok(())
}

fn rgb_order(format: &ImageFormat) -> [usize; 3] {
    match format.channels() {
        Some(ChannelSemantics::Bgr) => [2, 1, 0],
        _ => [0, 1, 2],
    }
}

fn to_gray(source: &ImageBuffer) -> Samples {
    let [r, g, b] = rgb_order(source.format());
    let values = source.samples().to_f64_vec();
    let gray = values.chunks_exact(3).map(|px| {
        LUMA_WEIGHTS[0].mul_add(px[r], LUMA_WEIGHTS[1].mul_add(px[g], LUMA_WEIGHTS[2] * px[b]))
    });
    Samples::from_f64(source.format().pixel_type(), gray.collect::<Vec<_>>())
}

fn to_hls(source: &ImageBuffer) -> Result<Samples, PipelineError> {
    let normalized = source.to_normalized_float(false)?;
    let values = normalized.samples().to_f64_vec();
    let hls = values
        .chunks_exact(3)
        .flat_map(|px| rgb_to_hls(px[0], px[1], px[2]))
        .collect::<Vec<_>>();
    Ok(Samples::from_f64(PixelType::F32, hls))
}

/// Convert one normalised RGB triple to normalised HLS.
///
/// Hue is returned in 0..1 (degrees divided by 360); lightness and
/// saturation are already in 0..1.
#[must_use]
pub fn rgb_to_hls(r: f64, g: f64, b: f64) -> [f64; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;
    let diff = max - min;
    if diff <= f64::EPSILON {
        return [0.0, lightness, 0.0];
    }
    let saturation = if lightness < 0.5 {
        diff / (max + min)
    } else {
        diff / (2.0 - max - min)
    };
    #[allow(clippy::float_cmp)]
    let mut hue = if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        60.0f64.mul_add((b - r) / diff, 120.0)
    } else {
        60.0f64.mul_add((r - g) / diff, 240.0)
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    [hue / 360.0, lightness, saturation]
}

fn swap_rgb_bgr(source: &ImageBuffer) -> Samples {
    crate::buffer::map_samples!(source.samples(), v => v
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect())
}

// ───────────────────────────── Filters ─────────────────────────────

/// Converts RGB or BGR input to a single gray channel.
///
/// Gray input is passed through unchanged, so the filter can sit at the
/// head of a recipe regardless of how the page was scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrayFilter;

impl Filter for GrayFilter {
    fn name(&self) -> &str {
        "gray"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["gray_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        let input = first_format(self.name(), inputs)?;
        if input.has_channels(&ChannelSemantics::Gray) {
            return Ok(input.clone());
        }
        conversion_format(input, &ChannelSemantics::Gray)
    }

    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let (input, output) = unary(self.name(), inputs, outputs)?;
        if input.format().has_channels(&ChannelSemantics::Gray) {
            *output = input.clone();
            return Ok(());
        }
        convert_into(input, output)
    }
}

/// Converts RGB input to normalised `f32` HLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HlsFilter;

impl Filter for HlsFilter {
    fn name(&self) -> &str {
        "hls"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["hls_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        conversion_format(first_format(self.name(), inputs)?, &ChannelSemantics::Hls)
    }

    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let (input, output) = unary(self.name(), inputs, outputs)?;
        convert_into(input, output)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn rgb_pixel(r: u8, g: u8, b: u8) -> ImageBuffer {
        let format = ImageFormat::rgb8(1, 1).unwrap();
        ImageBuffer::from_samples(format, Samples::U8(vec![r, g, b])).unwrap()
    }

    #[test]
    fn rgb_to_gray_uses_luma_weights() {
        let gray = rgb_pixel(255, 0, 0).convert_color(&ChannelSemantics::Gray).unwrap();
        assert_eq!(gray.format().channel_count(), 1);
        assert!(gray.format().has_channels(&ChannelSemantics::Gray));
        // 0.299 * 255 = 76.245
        assert_eq!(gray.as_slice::<u8>().unwrap(), &[76]);
    }

    #[test]
    fn green_is_brightest_in_gray() {
        let value = |r, g, b| {
            rgb_pixel(r, g, b)
                .convert_color(&ChannelSemantics::Gray)
                .unwrap()
                .sample(0, 0, 0)
                .unwrap()
        };
        let (r, g, b) = (value(255, 0, 0), value(0, 255, 0), value(0, 0, 255));
        assert!(g > r && r > b, "R={r} G={g} B={b}");
    }

    #[test]
    fn bgr_to_gray_reads_reversed_order() {
        let format =
            ImageFormat::with_semantics(1, 1, PixelType::U8, ChannelSemantics::Bgr).unwrap();
        let bgr = ImageBuffer::from_samples(format, Samples::U8(vec![0, 0, 255])).unwrap();
        let gray = bgr.convert_color(&ChannelSemantics::Gray).unwrap();
        assert_eq!(gray.as_slice::<u8>().unwrap(), &[76]);
    }

    #[test]
    fn rgb_bgr_swap_reverses_triples() {
        let bgr = rgb_pixel(1, 2, 3).swap_channels(&ChannelSemantics::Bgr).unwrap();
        assert_eq!(bgr.as_slice::<u8>().unwrap(), &[3, 2, 1]);
        let back = bgr.swap_channels(&ChannelSemantics::Rgb).unwrap();
        assert_eq!(back, rgb_pixel(1, 2, 3));
    }

    #[test]
    fn hls_of_primaries() {
        assert_eq!(rgb_to_hls(1.0, 0.0, 0.0), [0.0, 0.5, 1.0]);
        let [h, l, s] = rgb_to_hls(0.0, 1.0, 0.0);
        assert!((h - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!((l, s), (0.5, 1.0));
        let [h, _, _] = rgb_to_hls(0.0, 0.0, 1.0);
        assert!((h - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(rgb_to_hls(0.5, 0.5, 0.5), [0.0, 0.5, 0.0]);
    }

    #[test]
    fn hls_conversion_normalises_integer_input() {
        let hls = rgb_pixel(255, 0, 0).convert_color(&ChannelSemantics::Hls).unwrap();
        let format = hls.format();
        assert_eq!(format.pixel_type(), PixelType::F32);
        assert!(format.is_normalized());
        assert!(format.has_channels(&ChannelSemantics::Hls));
        assert_eq!(hls.as_slice::<f32>().unwrap(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn unsupported_conversions_fail() {
        let gray = ImageBuffer::new(ImageFormat::gray8(1, 1).unwrap());
        assert!(matches!(
            gray.convert_color(&ChannelSemantics::Rgb),
            Err(PipelineError::UnsupportedConversion { .. })
        ));
        assert!(matches!(
            rgb_pixel(0, 0, 0).convert_color(&ChannelSemantics::Label),
            Err(PipelineError::UnsupportedConversion { .. })
        ));
        let undeclared = ImageBuffer::new(ImageFormat::new(1, 1, 3, PixelType::U8).unwrap());
        assert!(undeclared.convert_color(&ChannelSemantics::Gray).is_err());
    }

    #[test]
    fn convert_into_checks_destination_format() {
        let mut wrong = ImageBuffer::new(ImageFormat::gray8(2, 2).unwrap());
        assert!(matches!(
            rgb_pixel(1, 2, 3).convert_color_into(&mut wrong),
            Err(PipelineError::ShapeMismatch { .. })
        ));
        let mut right = ImageBuffer::new(ImageFormat::gray8(1, 1).unwrap());
        rgb_pixel(10, 10, 10).convert_color_into(&mut right).unwrap();
        assert_eq!(right.sample(0, 0, 0), Some(10.0));
    }

    #[test]
    fn gray_filter_passes_gray_through() {
        let format = ImageFormat::gray8(2, 1).unwrap();
        let input = ImageBuffer::from_samples(format.clone(), Samples::U8(vec![9, 200])).unwrap();
        let mut filter = GrayFilter;
        assert_eq!(filter.output_format(0, &[&format]).unwrap(), format);
        let mut outputs = vec![ImageBuffer::new(format)];
        filter.compute(&[&input], &mut outputs).unwrap();
        assert_eq!(outputs[0], input);
    }

    #[test]
    fn hls_filter_format_is_normalised_f32() {
        let format = ImageFormat::rgb8(4, 4).unwrap();
        let out = HlsFilter.output_format(0, &[&format]).unwrap();
        assert_eq!(out.pixel_type(), PixelType::F32);
        assert_eq!(out.dimensions(), format.dimensions());
    }
}
