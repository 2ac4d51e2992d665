//! folio-pipeline: Lazy, demand-driven image processing for scanned pages
//! (sans-IO).
//!
//! Filters are wired into a [`Pipeline`] through output ports. Asking for
//! a port with [`Pipeline::update`] recomputes exactly the upstream nodes
//! whose inputs or parameters changed since their last run, ordered by a
//! shared [`LogicalClock`]. See the [`pipeline`] module for the update
//! protocol.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and buffers. Reading and writing files lives in
//! `folio-bench`.

pub mod blur;
pub mod buffer;
pub mod clock;
pub mod codec;
pub mod color;
pub mod config;
pub mod diagnostics;
pub mod filter;
pub mod format;
pub mod invert;
pub mod morphology;
mod node;
pub mod pipeline;
pub mod port;
pub mod resize;
pub mod source;
pub mod threshold;
pub mod types;

pub use blur::GaussianBlurFilter;
pub use buffer::{ImageBuffer, Sample, Samples};
pub use clock::{LogicalClock, Timestamp};
pub use color::{GrayFilter, HlsFilter};
pub use config::{PipelineConfig, StageConfig};
pub use diagnostics::{ExecutionLog, FormatUpdate, NodeRun};
pub use filter::Filter;
pub use format::{ChannelSemantics, ImageFormat, PixelType};
pub use invert::InverseFilter;
pub use morphology::{
    AsfFilter, CloseFilter, ElementShape, GradientFilter, OpenFilter, StructuringElement,
};
pub use node::NodeStatus;
pub use pipeline::{CycleMode, Pipeline};
pub use port::{OutputPort, PortStatus};
pub use resize::{Interpolation, ResizeFilter};
pub use source::Loader;
pub use threshold::{OtsuThresholdFilter, ThresholdFilter, ThresholdMode};
pub use types::{Dimensions, NodeId, PipelineError, PortId};

/// Result of [`process`]: the final image plus what the pipeline did to
/// produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    /// Output of the last stage.
    pub image: ImageBuffer,
    /// Dimensions of the decoded source page.
    pub source_dimensions: Dimensions,
    /// Node runs and format updates of the single update.
    pub log: ExecutionLog,
}

/// Decode an image and run a recipe over it once.
///
/// Takes raw image bytes (PNG, JPEG, BMP, TIFF, WebP) and a
/// configuration, builds a fresh pipeline (loader followed by the
/// recipe's stages) and updates its last port.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty,
/// [`PipelineError::ImageDecode`] if the image format is unrecognized,
/// [`PipelineError::InvalidConfig`] if the recipe does not validate, and
/// any error raised by a stage during the update.
pub fn process(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<ProcessResult, PipelineError> {
    let page = codec::decode(image_bytes)?;
    let source_dimensions = page.dimensions();

    let mut pipeline = Pipeline::new();
    pipeline.set_cycle_mode(config.cycle_mode);
    let loader = pipeline.add(Loader::with_image(page));
    let head = pipeline.output(loader)?;
    let tail = config.build(&mut pipeline, head)?;

    pipeline.update(tail)?;
    let image = pipeline
        .buffer(tail)?
        .cloned()
        .ok_or_else(|| PipelineError::FormatUnavailable {
            node: tail.to_string(),
            input: pipeline.port(tail).map_or("", OutputPort::name).to_owned(),
        })?;

    Ok(ProcessResult {
        image,
        source_dimensions,
        log: pipeline.take_execution_log(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png_bytes(buffer: &ImageBuffer) -> Vec<u8> {
        codec::encode_png(buffer).unwrap()
    }

    #[test]
    fn process_empty_input_returns_error() {
        let result = process(&[], &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_invalid_image_returns_decode_error() {
        let result = process(&[0xFF, 0x00, 0x42], &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn process_default_recipe_binarises() {
        // Left half dark, right half light.
        let page = ImageBuffer::from_fn(ImageFormat::rgb8(8, 4).unwrap(), |x, _, _| {
            if x < 4 { 20.0 } else { 230.0 }
        });
        let result = process(&png_bytes(&page), &PipelineConfig::default()).unwrap();

        assert_eq!(result.source_dimensions, Dimensions { width: 8, height: 4 });
        assert_eq!(result.image.format().channel_count(), 1);
        assert_eq!(result.image.sample(0, 0, 0), Some(0.0));
        assert_eq!(result.image.sample(7, 3, 0), Some(255.0));
        // loader, gray, threshold
        assert_eq!(result.log.runs().len(), 3);
    }

    #[test]
    fn process_empty_recipe_returns_source() {
        let page = ImageBuffer::from_fn(ImageFormat::gray8(3, 3).unwrap(), |x, y, _| {
            f64::from(x * 3 + y)
        });
        let config = PipelineConfig {
            stages: Vec::new(),
            cycle_mode: CycleMode::Strict,
        };
        let result = process(&png_bytes(&page), &config).unwrap();
        assert_eq!(result.image.samples(), page.samples());
    }

    #[test]
    fn process_invalid_recipe_is_rejected() {
        let page = ImageBuffer::new(ImageFormat::gray8(2, 2).unwrap());
        let config = PipelineConfig {
            stages: vec![StageConfig::Blur {
                kernel_size: 2,
                sigma: 0.0,
            }],
            cycle_mode: CycleMode::Lenient,
        };
        assert!(matches!(
            process(&png_bytes(&page), &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
