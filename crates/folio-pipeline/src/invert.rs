//! Gray level inversion.
//!
//! Maps each sample `v` to `max + min - v` over the range of the sample
//! type, so dark ink on light paper becomes light on dark and vice versa.

use crate::buffer::{ImageBuffer, Samples};
use crate::filter::{Filter, first_format, unary};
use crate::format::ImageFormat;
use crate::types::PipelineError;

/// Inverts single-channel images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InverseFilter;

/// Invert every sample of a buffer over its format's value range.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedPixelType`] for un-normalised float
/// samples, which have no range.
pub fn invert(input: &ImageBuffer) -> Result<Samples, PipelineError> {
    let Some((min, max)) = input.format().value_range() else {
        return Err(PipelineError::UnsupportedPixelType {
            operation: "inversion",
            pixel_type: input.format().pixel_type(),
        });
    };
    if let Some(bytes) = input.as_slice::<u8>() {
        return Ok(Samples::U8(bytes.iter().map(|v| !v).collect()));
    }
    let values = input.samples().to_f64_vec();
    Ok(Samples::from_f64(
        input.format().pixel_type(),
        values.into_iter().map(|v| max + min - v),
    ))
}

impl Filter for InverseFilter {
    fn name(&self) -> &str {
        "inverse"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["inverse_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        let input = first_format(self.name(), inputs)?;
        if input.channel_count() != 1 {
            return Err(PipelineError::InvalidInput {
                filter: self.name().to_owned(),
                reason: format!("expected a gray image, got {input}"),
            });
        }
        if input.value_range().is_none() {
            return Err(PipelineError::UnsupportedPixelType {
                operation: "inversion",
                pixel_type: input.pixel_type(),
            });
        }
        Ok(input.clone())
    }

    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let (input, output) = unary(self.name(), inputs, outputs)?;
        *output.samples_mut() = invert(input)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::format::PixelType;

    #[test]
    fn inverts_u8() {
        let format = ImageFormat::gray8(3, 1).unwrap();
        let input = ImageBuffer::from_samples(format, Samples::U8(vec![0, 100, 255])).unwrap();
        assert_eq!(invert(&input).unwrap(), Samples::U8(vec![255, 155, 0]));
    }

    #[test]
    fn inverts_signed_over_full_range() {
        let format = ImageFormat::gray8(2, 1).unwrap().with_pixel_type(PixelType::I16);
        let input = ImageBuffer::from_samples(format, Samples::I16(vec![i16::MIN, 0])).unwrap();
        // max + min - v with max = 32767, min = -32768
        assert_eq!(invert(&input).unwrap(), Samples::I16(vec![i16::MAX, -1]));
    }

    #[test]
    fn inverts_normalised_float() {
        let format = ImageFormat::gray8(2, 1)
            .unwrap()
            .with_pixel_type(PixelType::F32)
            .normalized(true);
        let input = ImageBuffer::from_samples(format, Samples::F32(vec![0.25, 1.0])).unwrap();
        assert_eq!(invert(&input).unwrap(), Samples::F32(vec![0.75, 0.0]));
    }

    #[test]
    fn rejects_color_input() {
        let rgb = ImageFormat::rgb8(1, 1).unwrap();
        assert!(matches!(
            InverseFilter.output_format(0, &[&rgb]),
            Err(PipelineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn double_inversion_is_identity() {
        let format = ImageFormat::gray8(4, 4).unwrap();
        let input = ImageBuffer::from_fn(format.clone(), |x, y, _| f64::from(x * 16 + y));
        let mut filter = InverseFilter;
        let mut once = vec![ImageBuffer::new(format.clone())];
        filter.compute(&[&input], &mut once).unwrap();
        let mut twice = vec![ImageBuffer::new(format)];
        filter.compute(&[&once[0]], &mut twice).unwrap();
        assert_eq!(twice[0], input);
    }
}
