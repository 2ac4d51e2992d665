//! Binarisation.
//!
//! [`ThresholdFilter`] applies a fixed level to any sample type, either
//! binarising ([`ThresholdMode::Binary`]) or zeroing the samples at or
//! below the level ([`ThresholdMode::ToZero`]).
//! [`OtsuThresholdFilter`] picks the level from the image histogram with
//! [`imageproc::contrast::otsu_level`] and is limited to 8-bit gray input.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::buffer::{ImageBuffer, Samples};
use crate::filter::{Filter, first_format, split_planes, unary};
use crate::format::{ImageFormat, PixelType};
use crate::types::PipelineError;

/// Default fixed threshold level.
pub const DEFAULT_LEVEL: f64 = 128.0;

/// Default value written for samples above the level.
pub const DEFAULT_MAX_VALUE: f64 = 255.0;

/// What a sample strictly above the level becomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// `max_value`.
    #[default]
    Binary,
    /// Itself. `max_value` is ignored.
    ToZero,
}

/// Apply `mode` at `level` to every sample; samples at or below the level
/// become 0.
#[must_use]
pub fn threshold(input: &ImageBuffer, level: f64, max_value: f64, mode: ThresholdMode) -> Samples {
    let values = input.samples().to_f64_vec();
    let above = |v: f64| match mode {
        ThresholdMode::Binary => max_value,
        ThresholdMode::ToZero => v,
    };
    Samples::from_f64(
        input.format().pixel_type(),
        values
            .into_iter()
            .map(|v| if v > level { above(v) } else { 0.0 }),
    )
}

/// Threshold with a fixed level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdFilter {
    /// Samples at or below this become 0.
    pub level: f64,
    /// Value written for samples above `level` in binary mode.
    pub max_value: f64,
    /// Binary or to-zero.
    #[serde(default)]
    pub mode: ThresholdMode,
}

impl Default for ThresholdFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL, DEFAULT_MAX_VALUE)
    }
}

impl ThresholdFilter {
    /// Binarise at `level`, writing `max_value` above it.
    #[must_use]
    pub const fn new(level: f64, max_value: f64) -> Self {
        Self {
            level,
            max_value,
            mode: ThresholdMode::Binary,
        }
    }

    /// Keep samples above `level` and zero the rest.
    #[must_use]
    pub const fn to_zero(level: f64) -> Self {
        Self {
            level,
            max_value: DEFAULT_MAX_VALUE,
            mode: ThresholdMode::ToZero,
        }
    }

    /// Same level with another mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ThresholdMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Filter for ThresholdFilter {
    fn name(&self) -> &str {
        "threshold"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["threshold_image"]
    }

    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let (input, output) = unary(self.name(), inputs, outputs)?;
        *output.samples_mut() = threshold(input, self.level, self.max_value, self.mode);
        Ok(())
    }
}

/// Binarise 8-bit gray images at the Otsu level.
///
/// The level chosen by the last compute is kept for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OtsuThresholdFilter {
    last_level: Option<u8>,
}

impl OtsuThresholdFilter {
    /// A filter that has not computed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_level: None }
    }

    /// The level chosen by the last successful compute.
    #[must_use]
    pub const fn last_level(&self) -> Option<u8> {
        self.last_level
    }
}

const OTSU: &str = "otsu threshold";

impl Filter for OtsuThresholdFilter {
    fn name(&self) -> &str {
        "otsu_threshold"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["threshold_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        let input = first_format(self.name(), inputs)?;
        if input.pixel_type() != PixelType::U8 {
            return Err(PipelineError::UnsupportedPixelType {
                operation: OTSU,
                pixel_type: input.pixel_type(),
            });
        }
        if input.channel_count() != 1 {
            return Err(PipelineError::InvalidInput {
                filter: self.name().to_owned(),
                reason: format!("expected one channel, got {}", input.channel_count()),
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
        let planes = split_planes::<u8>(input, OTSU)?;
        let Some(plane) = planes.first() else {
            return Err(PipelineError::InvalidInput {
                filter: self.name().to_owned(),
                reason: "no channels".to_owned(),
            });
        };
        let level = imageproc::contrast::otsu_level(plane);
        info!(level, "otsu level");
        *output.samples_mut() =
            threshold(input, f64::from(level), DEFAULT_MAX_VALUE, ThresholdMode::Binary);
        self.last_level = Some(level);
        Ok(())
    }
}
