//! Rescaling by a constant factor.
//!
//! Output dimensions are `round(dimension * scale)`. Each channel plane is
//! resampled independently with [`image::imageops::resize`], which keeps
//! the sample type, so 16-bit and float pages stay at full precision.

use std::fmt;

use image::Primitive;
use serde::{Deserialize, Serialize};

use crate::buffer::{ImageBuffer, Sample};
use crate::filter::{Filter, Plane, first_format, merge_planes, split_planes, unary};
use crate::format::{ImageFormat, PixelType};
use crate::types::PipelineError;

const OPERATION: &str = "resize";

/// Resampling filter.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    #[default]
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl Interpolation {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// `round(dimension * scale)`, or `None` when it does not fit a `u32`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_dimension(dimension: u32, scale: f64) -> Option<u32> {
    let scaled = (f64::from(dimension) * scale).round();
    (scaled.is_finite() && scaled >= 0.0 && scaled <= f64::from(u32::MAX)).then_some(scaled as u32)
}

/// Scale both axes by the same factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResizeFilter {
    /// Scale factor; must be positive and finite.
    pub scale: f64,
    /// Resampling filter.
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ResizeFilter {
    /// Scale by `scale` with the default interpolation.
    #[must_use]
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            interpolation: Interpolation::default(),
        }
    }

    /// Use `interpolation` instead of the default.
    #[must_use]
    pub const fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

fn resize_planes<T: Sample + Primitive>(
    input: &ImageBuffer,
    output: &mut ImageBuffer,
    interpolation: Interpolation,
) -> Result<(), PipelineError> {
    let (width, height) = (output.width(), output.height());
    let filter = interpolation.to_image_filter();
    let resized: Vec<Plane<T>> = split_planes::<T>(input, OPERATION)?
        .iter()
        .map(|plane| image::imageops::resize(plane, width, height, filter))
        .collect();
    merge_planes(&resized, output, OPERATION)
}

impl Filter for ResizeFilter {
    fn name(&self) -> &str {
        "resize"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["resized_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        let input = first_format(self.name(), inputs)?;
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(PipelineError::InvalidInput {
                filter: self.name().to_owned(),
                reason: format!("scale must be positive and finite, got {}", self.scale),
            });
        }
        // Resampling clamps float samples to 0..1.
        if input.value_range().is_none() {
            return Err(PipelineError::UnsupportedPixelType {
                operation: OPERATION,
                pixel_type: input.pixel_type(),
            });
        }
        let scaled = |dimension| {
            scaled_dimension(dimension, self.scale).ok_or_else(|| {
                PipelineError::InvalidFormat(format!(
                    "{dimension} scaled by {} overflows",
                    self.scale
                ))
            })
        };
        input
            .clone()
            .with_size(scaled(input.width())?, scaled(input.height())?)
    }

    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let (input, output) = unary(self.name(), inputs, outputs)?;
        match input.format().pixel_type() {
            PixelType::U8 => resize_planes::<u8>(input, output, self.interpolation),
            PixelType::U16 => resize_planes::<u16>(input, output, self.interpolation),
            PixelType::I16 => resize_planes::<i16>(input, output, self.interpolation),
            PixelType::F32 => resize_planes::<f32>(input, output, self.interpolation),
            PixelType::F64 => resize_planes::<f64>(input, output, self.interpolation),
        }
    }
}
