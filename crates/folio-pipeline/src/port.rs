//! Output ports: where a node's results live.

use serde::Serialize;

use crate::buffer::ImageBuffer;
use crate::clock::Timestamp;
use crate::format::ImageFormat;
use crate::types::{NodeId, PortId};

/// One named output of a node.
///
/// A port carries two logical times: `modified_time`, stamped when its
/// buffer was last filled, and `pipeline_time`, the newest upstream change
/// its format reflects. The port is stale (its pixels must be recomputed)
/// while `modified_time < pipeline_time`.
#[derive(Debug)]
pub struct OutputPort {
    name: &'static str,
    owner: Option<NodeId>,
    pub(crate) modified: Timestamp,
    pub(crate) pipeline_time: u64,
    pub(crate) buffer: Option<ImageBuffer>,
}

impl OutputPort {
    pub(crate) const fn new(owner: NodeId, name: &'static str) -> Self {
        Self {
            name,
            owner: Some(owner),
            modified: Timestamp::new(),
            pipeline_time: 0,
            buffer: None,
        }
    }

    /// Declared output name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Owning node, `None` once the node was removed.
    #[must_use]
    pub const fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Logical time the buffer was last filled.
    #[must_use]
    pub const fn modified_time(&self) -> u64 {
        self.modified.get()
    }

    /// Logical time of the newest upstream change the format reflects.
    #[must_use]
    pub const fn pipeline_time(&self) -> u64 {
        self.pipeline_time
    }

    /// Whether the pixels lag behind the format.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.modified.get() < self.pipeline_time
    }

    /// Current format, once the information pass ran.
    #[must_use]
    pub fn format(&self) -> Option<&ImageFormat> {
        self.buffer.as_ref().map(ImageBuffer::format)
    }

    /// Release the buffer and forget the owner.
    pub(crate) fn disconnect_from_owner(&mut self) {
        self.owner = None;
        self.buffer = None;
    }

    /// Serializable snapshot of the port.
    #[must_use]
    pub fn status(&self, id: PortId) -> PortStatus {
        PortStatus {
            port: id,
            name: self.name.to_owned(),
            owner: self.owner,
            modified_time: self.modified_time(),
            pipeline_time: self.pipeline_time,
            stale: self.is_stale(),
            format: self.format().map(ToString::to_string),
        }
    }
}

/// Snapshot of an [`OutputPort`] for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortStatus {
    /// The port.
    pub port: PortId,
    /// Declared output name.
    pub name: String,
    /// Owning node, if still attached.
    pub owner: Option<NodeId>,
    /// Logical time the buffer was last filled.
    pub modified_time: u64,
    /// Logical time the format reflects.
    pub pipeline_time: u64,
    /// Whether the pixels lag behind the format.
    pub stale: bool,
    /// Current format, rendered for display.
    pub format: Option<String>,
}
