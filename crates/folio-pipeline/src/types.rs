//! Shared types for the folio image processing pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::PixelType;

/// Handle to a node stored in a [`Pipeline`](crate::Pipeline).
///
/// Handles are never reused: once a node is removed, its id keeps
/// referring to nothing and every lookup fails with
/// [`PipelineError::UnknownNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in creation order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Handle to an output port stored in a [`Pipeline`](crate::Pipeline).
///
/// A port outlives the node that owns it: after the node is removed the
/// port is detached and every use fails with
/// [`PipelineError::DetachedPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub(crate) usize);

impl PortId {
    /// Position of the port in creation order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors that can occur while building or updating a pipeline.
///
/// Every error aborts the update that raised it. Timestamps are only
/// advanced after a successful step, so retrying after fixing the cause
/// (rewiring, loading an image, changing a parameter) recomputes exactly
/// what failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A declared input has no upstream port bound to it.
    #[error("input `{input}` of {node} is required")]
    MissingInput {
        /// Display name of the node.
        node: String,
        /// Name of the unbound input.
        input: String,
    },

    /// An image format violates its invariants.
    #[error("invalid image format: {0}")]
    InvalidFormat(String),

    /// A buffer does not have the shape its format (or a caller) requires.
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// The required shape.
        expected: String,
        /// The shape that was supplied.
        found: String,
    },

    /// No color conversion exists between the two channel semantics.
    #[error("unsupported color conversion from {from} to {to}")]
    UnsupportedConversion {
        /// Source channel semantics.
        from: String,
        /// Requested channel semantics.
        to: String,
    },

    /// An operation is not defined for the buffer's sample type.
    #[error("{operation} does not support {pixel_type} samples")]
    UnsupportedPixelType {
        /// The operation that was attempted.
        operation: &'static str,
        /// The offending sample type.
        pixel_type: PixelType,
    },

    /// A filter's input does not satisfy the filter's preconditions.
    #[error("invalid input for {filter}: {reason}")]
    InvalidInput {
        /// Display name of the filter.
        filter: String,
        /// What was wrong with the input.
        reason: String,
    },

    /// The port's owning node was removed from the pipeline.
    #[error("{0} is detached from its node")]
    DetachedPort(PortId),

    /// The node id does not refer to a node of this pipeline.
    #[error("{0} does not exist")]
    UnknownNode(NodeId),

    /// The node declares no input with this name.
    #[error("{node} has no input named `{input}`")]
    UnknownInput {
        /// Display name of the node.
        node: String,
        /// The requested input name.
        input: String,
    },

    /// The node declares no output with this name.
    #[error("{node} has no output named `{output}`")]
    UnknownOutput {
        /// Display name of the node.
        node: String,
        /// The requested output name.
        output: String,
    },

    /// The node's filter is not of the requested concrete type.
    #[error("{node} is not a {expected}")]
    FilterType {
        /// Display name of the node.
        node: String,
        /// The requested filter type.
        expected: &'static str,
    },

    /// A source node has no image to provide.
    #[error("{node} has no image")]
    EmptySource {
        /// Display name of the node.
        node: String,
    },

    /// An input has no format although no wiring loop was traversed.
    #[error("input `{input}` of {node} has no format")]
    FormatUnavailable {
        /// Display name of the node.
        node: String,
        /// Name of the input without format.
        input: String,
    },

    /// A wiring loop was found while the pipeline is in strict cycle mode.
    #[error("wiring loop through {node}")]
    CycleDetected {
        /// Display name of a node on the loop.
        node: String,
    },

    /// Failed to decode encoded image bytes.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode a buffer.
    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    /// The encoded image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
