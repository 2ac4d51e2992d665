//! Source nodes.

use crate::buffer::ImageBuffer;
use crate::filter::Filter;
use crate::format::ImageFormat;
use crate::types::PipelineError;

/// A zero-input node that provides an in-memory image.
///
/// The output is a view of the held image, so no pixels are copied.
/// Replace the image through
/// [`Pipeline::modify_filter`](crate::Pipeline::modify_filter) so the
/// pipeline notices the change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loader {
    image: Option<ImageBuffer>,
}

impl Loader {
    /// A loader without an image; updating it fails until one is set.
    #[must_use]
    pub const fn new() -> Self {
        Self { image: None }
    }

    /// A loader holding `image`.
    #[must_use]
    pub const fn with_image(image: ImageBuffer) -> Self {
        Self { image: Some(image) }
    }

    /// A loader holding the decoded `bytes`.
    ///
    /// # Errors
    ///
    /// Fails like [`codec::decode`](crate::codec::decode).
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, PipelineError> {
        Ok(Self::with_image(crate::codec::decode(bytes)?))
    }

    /// Replace the image, returning the previous one.
    pub fn set_image(&mut self, image: ImageBuffer) -> Option<ImageBuffer> {
        self.image.replace(image)
    }

    /// Drop the image.
    pub fn clear(&mut self) -> Option<ImageBuffer> {
        self.image.take()
    }

    /// The held image.
    #[must_use]
    pub const fn image(&self) -> Option<&ImageBuffer> {
        self.image.as_ref()
    }

    fn require_image(&self) -> Result<&ImageBuffer, PipelineError> {
        self.image.as_ref().ok_or_else(|| PipelineError::EmptySource {
            node: self.name().to_owned(),
        })
    }
}

impl Filter for Loader {
    fn name(&self) -> &str {
        "loader"
    }

    fn input_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["image"]
    }

    fn output_format(
        &self,
        _output: usize,
        _inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        Ok(self.require_image()?.format().clone())
    }

    fn compute(
        &mut self,
        _inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let image = self.require_image()?;
        for output in outputs {
            *output = ImageBuffer::view(image, output.format().clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_loader_has_no_format() {
        let loader = Loader::new();
        assert!(matches!(
            loader.output_format(0, &[]),
            Err(PipelineError::EmptySource { .. })
        ));
    }

    #[test]
    fn output_is_a_view_of_the_image() {
        let image = ImageBuffer::from_fn(ImageFormat::rgb8(3, 2).unwrap(), |x, _, _| f64::from(x));
        let mut loader = Loader::with_image(image.clone());
        let format = loader.output_format(0, &[]).unwrap();
        assert_eq!(&format, image.format());

        let mut outputs = vec![ImageBuffer::new(format)];
        loader.compute(&[], &mut outputs).unwrap();
        assert!(outputs[0].shares_storage_with(loader.image().unwrap()));
        assert_eq!(outputs[0], image);
    }

    #[test]
    fn set_image_returns_previous() {
        let first = ImageBuffer::new(ImageFormat::gray8(1, 1).unwrap());
        let second = ImageBuffer::new(ImageFormat::gray8(2, 2).unwrap());
        let mut loader = Loader::with_image(first.clone());
        assert_eq!(loader.set_image(second), Some(first));
        assert_eq!(loader.image().map(ImageBuffer::width), Some(2));
        assert!(loader.clear().is_some());
        assert!(loader.image().is_none());
    }

    #[test]
    fn from_encoded_rejects_empty_bytes() {
        assert!(matches!(
            Loader::from_encoded(&[]),
            Err(PipelineError::EmptyInput)
        ));
    }
}
