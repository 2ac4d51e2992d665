//! Gaussian blur for noise reduction before binarisation.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which only accepts
//! single-channel images, so multi-channel buffers are split into planes,
//! blurred independently and reassembled. The result is equivalent to
//! blurring in color space (Gaussian blur is a linear, per-channel
//! operation).

use serde::{Deserialize, Serialize};

use crate::buffer::ImageBuffer;
use crate::filter::{Filter, Plane, first_format, merge_planes, split_planes, unary};
use crate::format::{ImageFormat, PixelType};
use crate::types::PipelineError;

/// Default kernel size.
pub const DEFAULT_KERNEL_SIZE: u32 = 3;

const OPERATION: &str = "gaussian blur";

/// Sigma implied by a kernel size when none is given:
/// `0.3 * ((k - 1) * 0.5 - 1) + 0.8`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3f32.mul_add((kernel_size as f32 - 1.0).mul_add(0.5, -1.0), 0.8)
}

/// Gaussian blur of 8-bit images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianBlurFilter {
    /// Odd kernel size, used to derive sigma when `sigma <= 0`.
    pub kernel_size: u32,
    /// Standard deviation; non-positive values derive it from
    /// `kernel_size`.
    pub sigma: f32,
}

impl Default for GaussianBlurFilter {
    fn default() -> Self {
        Self::new(DEFAULT_KERNEL_SIZE, 0.0)
    }
}

impl GaussianBlurFilter {
    /// Blur with the given kernel size and sigma.
    #[must_use]
    pub const fn new(kernel_size: u32, sigma: f32) -> Self {
        Self { kernel_size, sigma }
    }

    /// The sigma actually applied.
    #[must_use]
    pub fn effective_sigma(&self) -> f32 {
        if self.sigma > 0.0 {
            self.sigma
        } else {
            sigma_for_kernel(self.kernel_size)
        }
    }
}

/// Blur each plane independently.
#[must_use = "returns the blurred planes"]
pub fn gaussian_blur_planes(planes: &[Plane<u8>], sigma: f32) -> Vec<Plane<u8>> {
    planes
        .iter()
        .map(|plane| imageproc::filter::gaussian_blur_f32(plane, sigma))
        .collect()
}

impl Filter for GaussianBlurFilter {
    fn name(&self) -> &str {
        "gaussian_blur"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["blur_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        let input = first_format(self.name(), inputs)?;
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidInput {
                filter: self.name().to_owned(),
                reason: format!("kernel size must be odd, got {}", self.kernel_size),
            });
        }
        if input.pixel_type() != PixelType::U8 {
            return Err(PipelineError::UnsupportedPixelType {
                operation: OPERATION,
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
        let planes = split_planes::<u8>(input, OPERATION)?;
        let blurred = gaussian_blur_planes(&planes, self.effective_sigma());
        merge_planes(&blurred, output, OPERATION)
    }
}
