//! The [`Filter`] capability interface.
//!
//! A filter describes one processing step: which inputs it reads, which
//! outputs it produces, how output formats follow from input formats and
//! how output pixels follow from input pixels. It knows nothing about
//! timestamps or wiring; the [`Pipeline`](crate::Pipeline) decides when a
//! filter runs and lends it the buffers it needs for the duration of a
//! call.

use std::any::Any;

use image::{Luma, Primitive};

use crate::buffer::{ImageBuffer, Sample};
use crate::format::ImageFormat;
use crate::types::PipelineError;

/// Conventional name of the single input of a one-in, one-out filter.
pub const DEFAULT_INPUT: &str = "input";

/// A processing step that can be placed in a [`Pipeline`](crate::Pipeline).
pub trait Filter: Any + Send {
    /// Short display name used in logs and errors.
    fn name(&self) -> &str;

    /// Declared input names, in the order inputs are passed to
    /// [`compute`](Self::compute).
    fn input_names(&self) -> &'static [&'static str] {
        &[DEFAULT_INPUT]
    }

    /// Declared output names, in the order outputs are passed to
    /// [`compute`](Self::compute).
    fn output_names(&self) -> &'static [&'static str];

    /// Format of output `output` given the formats of all inputs.
    ///
    /// The default copies the first input's format.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs are not acceptable to the filter;
    /// the error aborts the information pass before anything is committed.
    fn output_format(
        &self,
        output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        let _ = output;
        first_format(self.name(), inputs).cloned()
    }

    /// Read `inputs` and write `outputs` in place.
    ///
    /// Output buffers are already allocated with the formats returned by
    /// [`output_format`](Self::output_format) and must keep them.
    ///
    /// # Errors
    ///
    /// Returns an error if the input pixels cannot be processed.
    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError>;
}

/// The first input format, or [`PipelineError::InvalidInput`] when the
/// filter received none.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] if `inputs` is empty.
pub fn first_format<'a>(
    filter: &str,
    inputs: &[&'a ImageFormat],
) -> Result<&'a ImageFormat, PipelineError> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| PipelineError::InvalidInput {
            filter: filter.to_owned(),
            reason: "no input format".to_owned(),
        })
}

/// Destructure the buffers of a one-in, one-out filter.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] unless there is exactly one
/// input and one output.
pub fn unary<'i, 'o>(
    filter: &str,
    inputs: &[&'i ImageBuffer],
    outputs: &'o mut [ImageBuffer],
) -> Result<(&'i ImageBuffer, &'o mut ImageBuffer), PipelineError> {
    match (inputs, outputs) {
        ([input], [output]) => Ok((*input, output)),
        (inputs, outputs) => Err(PipelineError::InvalidInput {
            filter: filter.to_owned(),
            reason: format!(
                "expected 1 input and 1 output, got {} and {}",
                inputs.len(),
                outputs.len()
            ),
        }),
    }
}

// ───────────────────────────── Channel planes ────────────────────────────
//
// Most `image`/`imageproc` operators work on single-channel rasters, so
// multi-channel buffers are processed one plane at a time.

/// A single-channel raster of the `image` crate.
pub(crate) type Plane<T> = image::ImageBuffer<Luma<T>, Vec<T>>;

/// De-interleave `buffer` into one plane per channel.
pub(crate) fn split_planes<T: Sample + Primitive>(
    buffer: &ImageBuffer,
    operation: &'static str,
) -> Result<Vec<Plane<T>>, PipelineError> {
    let samples = buffer.typed::<T>(operation)?;
    let channels = buffer.format().channel_count() as usize;
    (0..channels)
        .map(|c| {
            let plane: Vec<T> = samples.iter().skip(c).step_by(channels).copied().collect();
            Plane::from_raw(buffer.width(), buffer.height(), plane).ok_or_else(|| {
                PipelineError::ShapeMismatch {
                    expected: buffer.format().to_string(),
                    found: format!("{} samples in channel {c}", samples.len() / channels),
                }
            })
        })
        .collect()
}

/// Interleave `planes` into `output`, whose dimensions and channel count
/// must match.
pub(crate) fn merge_planes<T: Sample + Primitive>(
    planes: &[Plane<T>],
    output: &mut ImageBuffer,
    operation: &'static str,
) -> Result<(), PipelineError> {
    let (width, height) = (output.width(), output.height());
    let channels = output.format().channel_count() as usize;
    if planes.len() != channels
        || planes
            .iter()
            .any(|p| p.width() != width || p.height() != height)
    {
        return Err(PipelineError::ShapeMismatch {
            expected: output.format().to_string(),
            found: format!("{} planes", planes.len()),
        });
    }
    let samples = output.typed_mut::<T>(operation)?;
    for (c, plane) in planes.iter().enumerate() {
        for (dst, src) in samples.iter_mut().skip(c).step_by(channels).zip(plane.as_raw()) {
            *dst = *src;
        }
    }
    Ok(())
}

/// Upcast to `dyn Any` for typed access.
pub(crate) fn as_any(filter: &dyn Filter) -> &dyn Any {
    filter
}

/// Mutable upcast to `dyn Any` for typed access.
pub(crate) fn as_any_mut(filter: &mut dyn Filter) -> &mut dyn Any {
    filter
}
