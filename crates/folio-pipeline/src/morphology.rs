//! Gray-level mathematical morphology on 8-bit images.
//!
//! Wraps the `imageproc` gray-level operators, which only accept
//! single-channel images, so each channel plane is processed
//! independently.
//!
//! Structuring elements are balls of a given radius under one of three
//! norms: [`ElementShape::Square`] (L∞), [`ElementShape::Diamond`] (L1) and
//! [`ElementShape::Disk`] (L2). A square may be stretched into a rectangle
//! with an independent vertical radius. [`ElementShape::Horizontal`] and
//! [`ElementShape::Vertical`] are one pixel thick lines, used to isolate
//! rules and text lines on scanned pages.

use std::fmt;

use image::{GrayImage, Luma};
use imageproc::morphology::{
    Mask, grayscale_close, grayscale_dilate, grayscale_erode, grayscale_open,
};
use serde::{Deserialize, Serialize};

use crate::buffer::ImageBuffer;
use crate::filter::{Filter, Plane, first_format, merge_planes, split_planes, unary};
use crate::format::{ImageFormat, PixelType};
use crate::types::PipelineError;

const OPERATION: &str = "morphology";

/// Norm defining the neighbourhood of a structuring element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementShape {
    /// Chebyshev ball: a `(2r+1)²` square.
    #[default]
    Square,
    /// Manhattan ball.
    Diamond,
    /// Euclidean ball.
    Disk,
    /// Horizontal line of `2r + 1` pixels.
    Horizontal,
    /// Vertical line of `2r + 1` pixels.
    Vertical,
}

impl fmt::Display for ElementShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Square => f.write_str("square"),
            Self::Diamond => f.write_str("diamond"),
            Self::Disk => f.write_str("disk"),
            Self::Horizontal => f.write_str("horizontal"),
            Self::Vertical => f.write_str("vertical"),
        }
    }
}

/// A structuring element: shape plus radius in pixels.
///
/// Defaults to a 3x3 square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuringElement {
    /// Neighbourhood shape.
    pub shape: ElementShape,
    /// Radius in pixels; zero is the single centre pixel. Horizontal
    /// radius of a rectangle.
    pub radius: u8,
    /// Vertical radius of a [`ElementShape::Square`] element, turning it
    /// into a `(2 * radius + 1) x (2 * vertical_radius + 1)` rectangle.
    /// Only squares accept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertical_radius: Option<u8>,
}

impl Default for StructuringElement {
    fn default() -> Self {
        Self::square(1)
    }
}

impl StructuringElement {
    /// Square of side `2 * radius + 1`.
    #[must_use]
    pub const fn square(radius: u8) -> Self {
        Self {
            shape: ElementShape::Square,
            radius,
            vertical_radius: None,
        }
    }

    /// Diamond of the given radius.
    #[must_use]
    pub const fn diamond(radius: u8) -> Self {
        Self {
            shape: ElementShape::Diamond,
            radius,
            vertical_radius: None,
        }
    }

    /// Disk of the given radius.
    #[must_use]
    pub const fn disk(radius: u8) -> Self {
        Self {
            shape: ElementShape::Disk,
            radius,
            vertical_radius: None,
        }
    }

    /// Rectangle `2 * horizontal + 1` pixels wide and `2 * vertical + 1`
    /// pixels tall.
    #[must_use]
    pub const fn rect(horizontal: u8, vertical: u8) -> Self {
        Self {
            shape: ElementShape::Square,
            radius: horizontal,
            vertical_radius: Some(vertical),
        }
    }

    /// Horizontal line of `2 * radius + 1` pixels.
    #[must_use]
    pub const fn horizontal(radius: u8) -> Self {
        Self {
            shape: ElementShape::Horizontal,
            radius,
            vertical_radius: None,
        }
    }

    /// Vertical line of `2 * radius + 1` pixels.
    #[must_use]
    pub const fn vertical(radius: u8) -> Self {
        Self {
            shape: ElementShape::Vertical,
            radius,
            vertical_radius: None,
        }
    }

    /// Check that the vertical radius is only set on a square.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem.
    pub fn validate(self) -> Result<(), String> {
        match (self.shape, self.vertical_radius) {
            (ElementShape::Square, _) | (_, None) => Ok(()),
            (shape, Some(_)) => Err(format!("a {shape} element takes no vertical radius")),
        }
    }

    fn mask(self) -> Mask {
        match (self.shape, self.vertical_radius) {
            (ElementShape::Square, Some(vertical)) if vertical != self.radius => {
                rectangle(self.radius, vertical)
            }
            (ElementShape::Square, _) => Mask::square(self.radius),
            (ElementShape::Diamond, _) => Mask::diamond(self.radius),
            (ElementShape::Disk, _) => Mask::disk(self.radius),
            (ElementShape::Horizontal, _) => rectangle(self.radius, 0),
            (ElementShape::Vertical, _) => rectangle(0, self.radius),
        }
    }
}

/// Full rectangular mask centred on the origin.
fn rectangle(horizontal: u8, vertical: u8) -> Mask {
    let kernel = GrayImage::from_pixel(
        2 * u32::from(horizontal) + 1,
        2 * u32::from(vertical) + 1,
        Luma([u8::MAX]),
    );
    Mask::from_image(&kernel, horizontal, vertical)
}

impl fmt::Display for StructuringElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vertical_radius {
            Some(vertical) => write!(f, "{}({}x{})", self.shape, self.radius, vertical),
            None => write!(f, "{}({})", self.shape, self.radius),
        }
    }
}

/// Apply `op` to every plane of `input` and write the result to `output`.
fn per_plane(
    input: &ImageBuffer,
    output: &mut ImageBuffer,
    mut op: impl FnMut(&Plane<u8>) -> Plane<u8>,
) -> Result<(), PipelineError> {
    let planes = split_planes::<u8>(input, OPERATION)?;
    let processed: Vec<Plane<u8>> = planes.iter().map(&mut op).collect();
    merge_planes(&processed, output, OPERATION)
}

fn require_u8(filter: &str, inputs: &[&ImageFormat]) -> Result<ImageFormat, PipelineError> {
    let input = first_format(filter, inputs)?;
    if input.pixel_type() != PixelType::U8 {
        return Err(PipelineError::UnsupportedPixelType {
            operation: OPERATION,
            pixel_type: input.pixel_type(),
        });
    }
    Ok(input.clone())
}

/// Morphological gradient of one plane: dilation minus erosion.
#[must_use]
pub fn gradient(plane: &Plane<u8>, mask: &Mask) -> Plane<u8> {
    let dilated = grayscale_dilate(plane, mask);
    let eroded = grayscale_erode(plane, mask);
    Plane::from_fn(plane.width(), plane.height(), |x, y| {
        Luma([dilated.get_pixel(x, y).0[0].saturating_sub(eroded.get_pixel(x, y).0[0])])
    })
}

/// Alternate sequential filter of one plane: for each radius from 1 to
/// `max_radius`, an opening and a closing with a growing element.
#[must_use]
pub fn alternate_sequential(
    plane: &Plane<u8>,
    shape: ElementShape,
    max_radius: u8,
    open_first: bool,
) -> Plane<u8> {
    let mut current = plane.clone();
    for radius in 1..=max_radius {
        let mask = StructuringElement {
            shape,
            radius,
            vertical_radius: None,
        }
        .mask();
        current = if open_first {
            grayscale_close(&grayscale_open(&current, &mask), &mask)
        } else {
            grayscale_open(&grayscale_close(&current, &mask), &mask)
        };
    }
    current
}

macro_rules! element_filter {
    ($(#[$doc:meta])* $ty:ident, $name:literal, $output:literal, $op:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $ty {
            /// Structuring element.
            pub element: StructuringElement,
        }

        impl $ty {
            /// Filter using `element`.
            #[must_use]
            pub const fn new(element: StructuringElement) -> Self {
                Self { element }
            }
        }

        impl Filter for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn output_names(&self) -> &'static [&'static str] {
                &[$output]
            }

            fn output_format(
                &self,
                _output: usize,
                inputs: &[&ImageFormat],
            ) -> Result<ImageFormat, PipelineError> {
                self.element
                    .validate()
                    .map_err(|reason| PipelineError::InvalidInput {
                        filter: self.name().to_owned(),
                        reason,
                    })?;
                require_u8(self.name(), inputs)
            }

            fn compute(
                &mut self,
                inputs: &[&ImageBuffer],
                outputs: &mut [ImageBuffer],
            ) -> Result<(), PipelineError> {
                let (input, output) = unary(self.name(), inputs, outputs)?;
                let mask = self.element.mask();
                let op: fn(&Plane<u8>, &Mask) -> Plane<u8> = $op;
                per_plane(input, output, |plane| op(plane, &mask))
            }
        }
    };
}

element_filter!(
    /// Morphological opening: erosion followed by dilation. Removes bright
    /// specks smaller than the element.
    OpenFilter,
    "open",
    "open_image",
    grayscale_open
);

element_filter!(
    /// Morphological closing: dilation followed by erosion. Fills dark
    /// gaps smaller than the element.
    CloseFilter,
    "close",
    "close_image",
    grayscale_close
);

element_filter!(
    /// Morphological gradient: dilation minus erosion. Highlights edges.
    GradientFilter,
    "gradient",
    "gradient_image",
    gradient
);

/// Alternate sequential filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsfFilter {
    /// Largest element radius; must be at least 1.
    pub max_radius: u8,
    /// Element shape used at every radius.
    pub shape: ElementShape,
    /// Open before closing at each radius (otherwise close first).
    pub open_first: bool,
}

impl Default for AsfFilter {
    fn default() -> Self {
        Self::new(2, ElementShape::Square, true)
    }
}

impl AsfFilter {
    /// ASF up to `max_radius`.
    #[must_use]
    pub const fn new(max_radius: u8, shape: ElementShape, open_first: bool) -> Self {
        Self {
            max_radius,
            shape,
            open_first,
        }
    }
}

impl Filter for AsfFilter {
    fn name(&self) -> &str {
        "asf"
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["asf_image"]
    }

    fn output_format(
        &self,
        _output: usize,
        inputs: &[&ImageFormat],
    ) -> Result<ImageFormat, PipelineError> {
        if self.max_radius == 0 {
            return Err(PipelineError::InvalidInput {
                filter: self.name().to_owned(),
                reason: "max radius must be >= 1".to_owned(),
            });
        }
        require_u8(self.name(), inputs)
    }

    fn compute(
        &mut self,
        inputs: &[&ImageBuffer],
        outputs: &mut [ImageBuffer],
    ) -> Result<(), PipelineError> {
        let (input, output) = unary(self.name(), inputs, outputs)?;
        let Self {
            max_radius,
            shape,
            open_first,
        } = *self;
        per_plane(input, output, |plane| {
            alternate_sequential(plane, shape, max_radius, open_first)
        })
    }
}
