//! Pipeline nodes: a filter plus its wiring and propagation state.

use serde::Serialize;

use crate::clock::Timestamp;
use crate::filter::Filter;
use crate::types::{NodeId, PortId};

pub(crate) struct Node {
    pub(crate) filter: Box<dyn Filter>,
    /// One slot per declared input.
    pub(crate) inputs: Vec<Option<PortId>>,
    /// One port per declared output.
    pub(crate) outputs: Vec<PortId>,
    pub(crate) modified: Timestamp,
    pub(crate) output_info_time: u64,
    pub(crate) executing: bool,
}

impl Node {
    pub(crate) fn new(filter: Box<dyn Filter>, outputs: Vec<PortId>) -> Self {
        let inputs = vec![None; filter.input_names().len()];
        Self {
            filter,
            inputs,
            outputs,
            modified: Timestamp::new(),
            output_info_time: 0,
            executing: false,
        }
    }

    /// Name used in errors and logs, e.g. `gray (node#2)`.
    pub(crate) fn display_name(&self, id: NodeId) -> String {
        format!("{} ({id})", self.filter.name())
    }

    pub(crate) fn input_index(&self, input: &str) -> Option<usize> {
        self.filter.input_names().iter().position(|n| *n == input)
    }

    pub(crate) fn status(&self, id: NodeId) -> NodeStatus {
        NodeStatus {
            node: id,
            name: self.filter.name().to_owned(),
            modified_time: self.modified.get(),
            output_info_time: self.output_info_time,
            inputs: self
                .filter
                .input_names()
                .iter()
                .zip(&self.inputs)
                .map(|(name, port)| ((*name).to_owned(), *port))
                .collect(),
            outputs: self.outputs.clone(),
        }
    }
}

/// Snapshot of a node for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    /// The node.
    pub node: NodeId,
    /// Filter name.
    pub name: String,
    /// Logical time of the last parameter change or rewiring.
    pub modified_time: u64,
    /// Logical time the output formats were last derived for.
    pub output_info_time: u64,
    /// Declared inputs and the ports bound to them.
    pub inputs: Vec<(String, Option<PortId>)>,
    /// Output ports.
    pub outputs: Vec<PortId>,
}
