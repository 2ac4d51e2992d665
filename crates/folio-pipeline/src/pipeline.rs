//! Demand-driven pipeline: nodes are wired into a graph and only
//! recompute when something upstream of the requested output changed.
//!
//! ```rust
//! # use folio_pipeline::{
//! #     GrayFilter, ImageBuffer, ImageFormat, Loader, Pipeline, PipelineError, ThresholdFilter,
//! # };
//! # fn run() -> Result<(), PipelineError> {
//! let mut pipeline = Pipeline::new();
//! let page = ImageBuffer::new(ImageFormat::rgb8(64, 48)?);
//! let loader = pipeline.add(Loader::with_image(page));
//! let gray = pipeline.add(GrayFilter);
//! let binary = pipeline.add(ThresholdFilter::new(128.0, 255.0));
//! pipeline.connect(pipeline.output(loader)?, gray)?;
//! pipeline.connect(pipeline.output(gray)?, binary)?;
//!
//! let out = pipeline.output(binary)?;
//! pipeline.update(out)?;
//! assert_eq!(pipeline.buffer(out)?.map(|b| b.format().channel_count()), Some(1));
//!
//! // Nothing changed: the second update is free.
//! pipeline.update(out)?;
//! assert_eq!(pipeline.execution_log().run_count(gray), 1);
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! # Update protocol
//!
//! [`Pipeline::update`] runs two passes over the upstream graph of the
//! requested port.
//!
//! The *information pass* walks upstream depth-first and derives a
//! candidate time for each node: the newest of its own modification time
//! and, for every bound input, the upstream node's `output_info_time`, the
//! input port's `pipeline_time` and its `modified_time`. A node whose
//! candidate is newer than its `output_info_time` re-derives its output
//! formats, records the candidate as every output's `pipeline_time` and
//! reallocates buffers whose format changed.
//!
//! The *data pass* then recomputes exactly the ports whose
//! `modified_time` lags their `pipeline_time`, upstream first, and stamps
//! each recomputed port with a fresh clock value.
//!
//! # Wiring loops
//!
//! Each node carries an `executing` flag while one of its passes is on
//! the stack. Reaching a node whose flag is set means the walk went
//! around a loop. In [`CycleMode::Lenient`] the information pass marks
//! the node stale and returns, and the data pass returns without work:
//! updates terminate but looped nodes never converge. In
//! [`CycleMode::Strict`] loops are reported as
//! [`PipelineError::CycleDetected`], both when wiring them and when
//! updating.

use std::any::type_name;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use web_time::Instant;

use crate::buffer::ImageBuffer;
use crate::clock::LogicalClock;
use crate::diagnostics::{ExecutionLog, FormatUpdate, NodeRun};
use crate::filter::{Filter, as_any, as_any_mut};
use crate::format::ImageFormat;
use crate::node::{Node, NodeStatus};
use crate::port::{OutputPort, PortStatus};
use crate::types::{NodeId, PipelineError, PortId};

/// How re-entering a node during an update is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    /// Loops are tolerated: the walk stops at the re-entered node.
    #[default]
    Lenient,
    /// Loops are errors.
    Strict,
}

/// A graph of filters connected through output ports.
///
/// Nodes and ports live in arenas indexed by [`NodeId`] and [`PortId`].
/// Ids are never reused, so a handle to a removed node or to a port of a
/// removed node keeps failing instead of silently aliasing a newer one.
pub struct Pipeline {
    clock: LogicalClock,
    nodes: Vec<Option<Node>>,
    ports: Vec<OutputPort>,
    cycle_mode: CycleMode,
    log: ExecutionLog,
    /// Set when the current update re-entered a node.
    cycle_hit: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("clock", &self.clock.current())
            .field("nodes", &self.node_ids().count())
            .field("ports", &self.ports.len())
            .field("cycle_mode", &self.cycle_mode)
            .finish_non_exhaustive()
    }
}

fn slot(nodes: &[Option<Node>], id: NodeId) -> Result<&Node, PipelineError> {
    nodes
        .get(id.0)
        .and_then(Option::as_ref)
        .ok_or(PipelineError::UnknownNode(id))
}

fn slot_mut(nodes: &mut [Option<Node>], id: NodeId) -> Result<&mut Node, PipelineError> {
    nodes
        .get_mut(id.0)
        .and_then(Option::as_mut)
        .ok_or(PipelineError::UnknownNode(id))
}

fn port_ref(ports: &[OutputPort], id: PortId) -> Result<&OutputPort, PipelineError> {
    ports.get(id.0).ok_or(PipelineError::DetachedPort(id))
}

impl Pipeline {
    /// Empty pipeline with its own clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(LogicalClock::new())
    }

    /// Empty pipeline stamping with `clock`.
    ///
    /// Pipelines built from clones of one clock agree on the order of
    /// their changes.
    #[must_use]
    pub fn with_clock(clock: LogicalClock) -> Self {
        Self {
            clock,
            nodes: Vec::new(),
            ports: Vec::new(),
            cycle_mode: CycleMode::default(),
            log: ExecutionLog::default(),
            cycle_hit: false,
        }
    }

    /// The clock used for stamps.
    #[must_use]
    pub const fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// Current loop policy.
    #[must_use]
    pub const fn cycle_mode(&self) -> CycleMode {
        self.cycle_mode
    }

    /// Change the loop policy.
    pub const fn set_cycle_mode(&mut self, mode: CycleMode) {
        self.cycle_mode = mode;
    }

    // ───────────────────────────── Nodes ─────────────────────────────

    /// Add a filter as a new node.
    ///
    /// The node starts out modified, so its first update derives formats
    /// and computes.
    pub fn add<F: Filter>(&mut self, filter: F) -> NodeId {
        self.add_boxed(Box::new(filter))
    }

    /// Add an already boxed filter as a new node.
    pub fn add_boxed(&mut self, filter: Box<dyn Filter>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let outputs = filter
            .output_names()
            .iter()
            .map(|&name| {
                let port = PortId(self.ports.len());
                self.ports.push(OutputPort::new(id, name));
                port
            })
            .collect();
        let mut node = Node::new(filter, outputs);
        let stamp = node.modified.touch(&self.clock);
        debug!(node = %node.display_name(id), stamp, "added node");
        self.nodes.push(Some(node));
        id
    }

    /// Remove a node and return its filter.
    ///
    /// The node's ports are detached: their buffers are released and any
    /// later use of them, directly or through a downstream binding, fails
    /// with [`PipelineError::DetachedPort`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline.
    pub fn remove(&mut self, id: NodeId) -> Result<Box<dyn Filter>, PipelineError> {
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(PipelineError::UnknownNode(id))?;
        for port in &node.outputs {
            if let Some(port) = self.ports.get_mut(port.0) {
                port.disconnect_from_owner();
            }
        }
        debug!(node = %node.display_name(id), "removed node");
        Ok(node.filter)
    }

    /// Ids of all live nodes in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId(i))
    }

    /// Filter name of a node.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline.
    pub fn node_name(&self, id: NodeId) -> Result<&str, PipelineError> {
        Ok(slot(&self.nodes, id)?.filter.name())
    }

    /// Snapshot of a node's wiring and times.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline.
    pub fn node_status(&self, id: NodeId) -> Result<NodeStatus, PipelineError> {
        Ok(slot(&self.nodes, id)?.status(id))
    }

    /// First output port of a node.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline and [`PipelineError::UnknownOutput`] if the node has no
    /// outputs.
    pub fn output(&self, id: NodeId) -> Result<PortId, PipelineError> {
        let node = slot(&self.nodes, id)?;
        node.outputs
            .first()
            .copied()
            .ok_or_else(|| PipelineError::UnknownOutput {
                node: node.display_name(id),
                output: "(first)".to_owned(),
            })
    }

    /// Output port of a node by declared name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline and [`PipelineError::UnknownOutput`] if no output has that
    /// name.
    pub fn output_named(&self, id: NodeId, output: &str) -> Result<PortId, PipelineError> {
        let node = slot(&self.nodes, id)?;
        node.filter
            .output_names()
            .iter()
            .position(|n| *n == output)
            .and_then(|i| node.outputs.get(i).copied())
            .ok_or_else(|| PipelineError::UnknownOutput {
                node: node.display_name(id),
                output: output.to_owned(),
            })
    }

    /// Typed access to a node's filter.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline and [`PipelineError::FilterType`] if the filter is not an
    /// `F`.
    pub fn filter<F: Filter>(&self, id: NodeId) -> Result<&F, PipelineError> {
        let node = slot(&self.nodes, id)?;
        as_any(node.filter.as_ref())
            .downcast_ref::<F>()
            .ok_or_else(|| PipelineError::FilterType {
                node: node.display_name(id),
                expected: type_name::<F>(),
            })
    }

    /// Change a node's filter parameters through `edit` and mark the node
    /// modified.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline and [`PipelineError::FilterType`] if the filter is not an
    /// `F`. The node is not touched on error.
    pub fn modify_filter<F: Filter, R>(
        &mut self,
        id: NodeId,
        edit: impl FnOnce(&mut F) -> R,
    ) -> Result<R, PipelineError> {
        let node = slot_mut(&mut self.nodes, id)?;
        let node_name = node.display_name(id);
        let filter = as_any_mut(node.filter.as_mut())
            .downcast_mut::<F>()
            .ok_or(PipelineError::FilterType {
                node: node_name,
                expected: type_name::<F>(),
            })?;
        let result = edit(filter);
        let stamp = node.modified.touch(&self.clock);
        trace!(node = %node.display_name(id), stamp, "modified filter");
        Ok(result)
    }

    /// Mark a node modified so its outputs recompute on the next update.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] if `id` is not in the
    /// pipeline.
    pub fn touch(&mut self, id: NodeId) -> Result<u64, PipelineError> {
        let node = slot_mut(&mut self.nodes, id)?;
        Ok(node.modified.touch(&self.clock))
    }

    // ──────────────────────────── Wiring ─────────────────────────────

    /// Bind `upstream` to the input called `input` of `node`, replacing
    /// any previous binding, and mark `node` modified.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`], [`PipelineError::UnknownInput`]
    /// or [`PipelineError::DetachedPort`] for bad handles, and in strict
    /// cycle mode [`PipelineError::CycleDetected`] if the binding would
    /// close a loop (the binding is then not made).
    pub fn connect_input(
        &mut self,
        node: NodeId,
        upstream: PortId,
        input: &str,
    ) -> Result<(), PipelineError> {
        self.attached_owner(upstream)?;
        let target = slot_mut(&mut self.nodes, node)?;
        let index = target
            .input_index(input)
            .ok_or_else(|| PipelineError::UnknownInput {
                node: target.display_name(node),
                input: input.to_owned(),
            })?;
        let previous = target.inputs[index].replace(upstream);

        if self.cycle_mode == CycleMode::Strict {
            if let Err(err) = self.topological_order() {
                slot_mut(&mut self.nodes, node)?.inputs[index] = previous;
                return Err(err);
            }
        }

        let target = slot_mut(&mut self.nodes, node)?;
        let stamp = target.modified.touch(&self.clock);
        debug!(node = %target.display_name(node), input, %upstream, stamp, "connected input");
        Ok(())
    }

    /// Bind `upstream` to the first declared input of `node`.
    ///
    /// # Errors
    ///
    /// As [`connect_input`](Self::connect_input); additionally
    /// [`PipelineError::UnknownInput`] if the node declares no inputs.
    pub fn connect(&mut self, upstream: PortId, node: NodeId) -> Result<(), PipelineError> {
        let target = slot(&self.nodes, node)?;
        let Some(input) = target.filter.input_names().first().copied() else {
            return Err(PipelineError::UnknownInput {
                node: target.display_name(node),
                input: "(first)".to_owned(),
            });
        };
        self.connect_input(node, upstream, input)
    }

    /// Unbind the input called `input` of `node` and mark `node` modified.
    ///
    /// Returns the previously bound port, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownNode`] or
    /// [`PipelineError::UnknownInput`] for bad handles.
    pub fn disconnect_input(
        &mut self,
        node: NodeId,
        input: &str,
    ) -> Result<Option<PortId>, PipelineError> {
        let target = slot_mut(&mut self.nodes, node)?;
        let index = target
            .input_index(input)
            .ok_or_else(|| PipelineError::UnknownInput {
                node: target.display_name(node),
                input: input.to_owned(),
            })?;
        let previous = target.inputs[index].take();
        target.modified.touch(&self.clock);
        debug!(node = %target.display_name(node), input, "disconnected input");
        Ok(previous)
    }

    /// Append `filters` one after another behind `source`, each connected
    /// through its first input and first output.
    ///
    /// Returns the first output of the last filter (`source` itself when
    /// `filters` is empty).
    ///
    /// # Errors
    ///
    /// Fails like [`connect`](Self::connect) or [`output`](Self::output).
    /// Filters added before the failure stay in the pipeline.
    pub fn chain<I>(&mut self, source: PortId, filters: I) -> Result<PortId, PipelineError>
    where
        I: IntoIterator<Item = Box<dyn Filter>>,
    {
        let mut tail = source;
        for filter in filters {
            let node = self.add_boxed(filter);
            self.connect(tail, node)?;
            tail = self.output(node)?;
        }
        Ok(tail)
    }

    /// Live nodes ordered so every node comes after the nodes it reads
    /// from.
    ///
    /// Bindings to detached ports are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CycleDetected`] naming a node on a loop.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, PipelineError> {
        let mut graph = DiGraphMap::<NodeId, ()>::new();
        for id in self.node_ids() {
            graph.add_node(id);
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else { continue };
            for port in node.inputs.iter().flatten() {
                if let Some(owner) = self.ports.get(port.0).and_then(OutputPort::owner) {
                    graph.add_edge(owner, NodeId(index), ());
                }
            }
        }
        toposort(&graph, None).map_err(|cycle| {
            let id = cycle.node_id();
            PipelineError::CycleDetected {
                node: slot(&self.nodes, id).map_or_else(|_| id.to_string(), |n| n.display_name(id)),
            }
        })
    }

    // ──────────────────────────── Ports ──────────────────────────────

    /// A port by id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DetachedPort`] if the id does not belong
    /// to this pipeline.
    pub fn port(&self, id: PortId) -> Result<&OutputPort, PipelineError> {
        port_ref(&self.ports, id)
    }

    /// Snapshot of a port.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DetachedPort`] if the id does not belong
    /// to this pipeline.
    pub fn port_status(&self, id: PortId) -> Result<PortStatus, PipelineError> {
        Ok(port_ref(&self.ports, id)?.status(id))
    }

    /// The pixels of a port, `None` before its first information pass.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DetachedPort`] if the port's node was
    /// removed.
    pub fn buffer(&self, id: PortId) -> Result<Option<&ImageBuffer>, PipelineError> {
        self.attached_owner(id)?;
        Ok(port_ref(&self.ports, id)?.buffer.as_ref())
    }

    fn attached_owner(&self, id: PortId) -> Result<NodeId, PipelineError> {
        port_ref(&self.ports, id)?
            .owner()
            .ok_or(PipelineError::DetachedPort(id))
    }

    /// Requested-region hook run before each input's data pass when a node
    /// has several inputs.
    ///
    /// Regions always cover the whole image, so this only checks that the
    /// port is still attached.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DetachedPort`] if the port's node was
    /// removed.
    pub fn propagate_requested_region(&self, id: PortId) -> Result<(), PipelineError> {
        self.attached_owner(id).map(|_| ())
    }

    // ──────────────────────────── Updates ────────────────────────────

    /// Bring a port up to date: information pass, then data pass.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a filter or by the wiring.
    /// Timestamps of the failing node are not advanced, so the next update
    /// retries it.
    pub fn update(&mut self, port: PortId) -> Result<(), PipelineError> {
        self.begin_update()?;
        self.port_information(port)?;
        self.port_data(port)
    }

    /// Update every output of a node.
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update).
    pub fn update_node(&mut self, id: NodeId) -> Result<(), PipelineError> {
        let outputs = slot(&self.nodes, id)?.outputs.clone();
        self.begin_update()?;
        self.node_information(id)?;
        for port in outputs {
            self.port_data(port)?;
        }
        Ok(())
    }

    /// Run only the information pass for a port.
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update).
    pub fn update_output_information(&mut self, port: PortId) -> Result<(), PipelineError> {
        self.begin_update()?;
        self.port_information(port)
    }

    /// Run only the data pass for a port.
    ///
    /// Does nothing unless an information pass marked the port stale.
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update).
    pub fn update_output_data(&mut self, port: PortId) -> Result<(), PipelineError> {
        self.begin_update()?;
        self.port_data(port)
    }

    /// Work recorded so far.
    #[must_use]
    pub const fn execution_log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Take the recorded work, leaving an empty log.
    pub fn take_execution_log(&mut self) -> ExecutionLog {
        std::mem::take(&mut self.log)
    }

    fn begin_update(&mut self) -> Result<(), PipelineError> {
        self.cycle_hit = false;
        if self.cycle_mode == CycleMode::Strict {
            self.topological_order()?;
        }
        Ok(())
    }

    fn re_entered(&mut self, node_name: String) -> Result<(), PipelineError> {
        self.cycle_hit = true;
        if self.cycle_mode == CycleMode::Strict {
            return Err(PipelineError::CycleDetected { node: node_name });
        }
        Ok(())
    }

    fn port_information(&mut self, port: PortId) -> Result<(), PipelineError> {
        let owner = self.attached_owner(port)?;
        self.node_information(owner)
    }

    fn port_data(&mut self, port: PortId) -> Result<(), PipelineError> {
        let owner = self.attached_owner(port)?;
        let state = port_ref(&self.ports, port)?;
        if state.is_stale() {
            self.node_data(owner)
        } else {
            trace!(%port, modified = state.modified_time(), "port up to date");
            Ok(())
        }
    }

    fn bound_inputs(&self, id: NodeId) -> Result<Vec<PortId>, PipelineError> {
        let node = slot(&self.nodes, id)?;
        node.inputs
            .iter()
            .zip(node.filter.input_names())
            .map(|(port, name)| {
                port.ok_or_else(|| PipelineError::MissingInput {
                    node: node.display_name(id),
                    input: (*name).to_owned(),
                })
            })
            .collect()
    }

    fn node_information(&mut self, id: NodeId) -> Result<(), PipelineError> {
        let node = slot_mut(&mut self.nodes, id)?;
        if node.executing {
            let node_name = node.display_name(id);
            self.re_entered(node_name.clone())?;
            let node = slot_mut(&mut self.nodes, id)?;
            let stamp = node.modified.touch(&self.clock);
            debug!(node = %node_name, stamp, "re-entered node during information pass");
            return Ok(());
        }

        let inputs = self.bound_inputs(id)?;
        let node = slot_mut(&mut self.nodes, id)?;
        let mut candidate = node.modified.get();
        node.executing = true;
        let walked = self.walk_upstream_information(&inputs, &mut candidate);
        slot_mut(&mut self.nodes, id)?.executing = false;
        walked?;

        let node = slot(&self.nodes, id)?;
        if candidate <= node.output_info_time {
            trace!(node = %node.display_name(id), candidate, "formats up to date");
            return Ok(());
        }

        let mut input_formats: Vec<&ImageFormat> = Vec::with_capacity(inputs.len());
        for (port, name) in inputs.iter().zip(node.filter.input_names()) {
            match port_ref(&self.ports, *port)?.format() {
                Some(format) => input_formats.push(format),
                None if self.cycle_hit => {
                    trace!(
                        node = %node.display_name(id),
                        input = *name,
                        "input has no format inside a loop"
                    );
                    return Ok(());
                }
                None => {
                    return Err(PipelineError::FormatUnavailable {
                        node: node.display_name(id),
                        input: (*name).to_owned(),
                    });
                }
            }
        }
        let formats = (0..node.outputs.len())
            .map(|i| node.filter.output_format(i, &input_formats))
            .collect::<Result<Vec<_>, _>>()?;

        let outputs = node.outputs.clone();
        let mut changed = false;
        for (port, format) in outputs.iter().zip(&formats) {
            let Some(state) = self.ports.get_mut(port.0) else {
                continue;
            };
            state.pipeline_time = candidate;
            if state.format() != Some(format) {
                state.buffer = Some(ImageBuffer::new(format.clone()));
                // A fresh buffer holds no results yet.
                state.modified.record(0);
                changed = true;
            }
        }
        let node = slot_mut(&mut self.nodes, id)?;
        node.output_info_time = candidate;
        debug!(node = %node.display_name(id), candidate, changed, "derived output formats");
        if changed {
            self.log.record_format_update(FormatUpdate {
                node: id,
                name: node.filter.name().to_owned(),
                pipeline_time: candidate,
                formats: formats.iter().map(ToString::to_string).collect(),
            });
        }
        Ok(())
    }

    fn walk_upstream_information(
        &mut self,
        inputs: &[PortId],
        candidate: &mut u64,
    ) -> Result<(), PipelineError> {
        for &port in inputs {
            let upstream = self.attached_owner(port)?;
            self.node_information(upstream)?;
            let upstream_info = slot(&self.nodes, upstream)?.output_info_time;
            let state = port_ref(&self.ports, port)?;
            *candidate = (*candidate)
                .max(upstream_info)
                .max(state.pipeline_time)
                .max(state.modified_time());
        }
        Ok(())
    }

    fn node_data(&mut self, id: NodeId) -> Result<(), PipelineError> {
        let node = slot_mut(&mut self.nodes, id)?;
        if node.executing {
            let node_name = node.display_name(id);
            self.re_entered(node_name.clone())?;
            debug!(node = %node_name, "re-entered node during data pass");
            return Ok(());
        }
        node.executing = true;
        let result = self.run_node(id);
        if let Ok(node) = slot_mut(&mut self.nodes, id) {
            node.executing = false;
        }
        result
    }

    fn run_node(&mut self, id: NodeId) -> Result<(), PipelineError> {
        let inputs = self.bound_inputs(id)?;
        if let [port] = inputs.as_slice() {
            self.port_data(*port)?;
        } else {
            for &port in &inputs {
                self.propagate_requested_region(port)?;
                self.port_data(port)?;
            }
        }

        let Self {
            nodes,
            ports,
            clock,
            log,
            cycle_hit,
            ..
        } = self;
        let node = slot_mut(nodes, id)?;
        let node_name = node.display_name(id);

        let mut outputs = Vec::with_capacity(node.outputs.len());
        for port in &node.outputs {
            match ports.get_mut(port.0).and_then(|p| p.buffer.take()) {
                Some(buffer) => outputs.push(buffer),
                None => {
                    restore(ports, &node.outputs, outputs);
                    return skip_or_fail(*cycle_hit, node_name, port_name(ports, *port));
                }
            }
        }
        let mut input_buffers = Vec::with_capacity(inputs.len());
        for port in &inputs {
            match port_ref(ports, *port)?.buffer.as_ref() {
                Some(buffer) => input_buffers.push(buffer),
                None => {
                    let name = port_name(ports, *port);
                    restore(ports, &node.outputs, outputs);
                    return skip_or_fail(*cycle_hit, node_name, name);
                }
            }
        }

        let expected: Vec<ImageFormat> = outputs.iter().map(|b| b.format().clone()).collect();
        let start = Instant::now();
        let computed = node.filter.compute(&input_buffers, &mut outputs);
        let duration = start.elapsed();
        drop(input_buffers);

        let mut mismatch = None;
        for (buffer, format) in outputs.iter_mut().zip(&expected) {
            let checked = if buffer.format() == format {
                buffer.check_shape()
            } else {
                Err(PipelineError::ShapeMismatch {
                    expected: format.to_string(),
                    found: buffer.format().to_string(),
                })
            };
            if let Err(err) = checked {
                mismatch.get_or_insert(err);
                *buffer = ImageBuffer::new(format.clone());
            }
        }
        restore(ports, &node.outputs, outputs);
        computed?;
        if let Some(err) = mismatch {
            return Err(err);
        }

        let mut stamped_at = 0;
        for port in &node.outputs {
            if let Some(state) = ports.get_mut(port.0) {
                stamped_at = state.modified.touch(clock);
            }
        }
        debug!(node = %node_name, stamped_at, ?duration, "computed");
        log.record_run(NodeRun {
            node: id,
            name: node.filter.name().to_owned(),
            duration,
            stamped_at,
        });
        Ok(())
    }
}

fn restore(ports: &mut [OutputPort], ids: &[PortId], buffers: Vec<ImageBuffer>) {
    for (port, buffer) in ids.iter().zip(buffers) {
        if let Some(state) = ports.get_mut(port.0) {
            state.buffer = Some(buffer);
        }
    }
}

fn port_name(ports: &[OutputPort], id: PortId) -> String {
    ports
        .get(id.0)
        .map_or_else(|| id.to_string(), |p| p.name().to_owned())
}

fn skip_or_fail(cycle_hit: bool, node: String, port: String) -> Result<(), PipelineError> {
    if cycle_hit {
        trace!(node = %node, port = %port, "buffer unavailable inside a loop; skipping compute");
        Ok(())
    } else {
        Err(PipelineError::FormatUnavailable { node, input: port })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::buffer::Samples;
    use crate::types::Dimensions;

    /// Records every compute into a shared journal and adds `offset` to
    /// each sample of its first input.
    struct Probe {
        label: &'static str,
        offset: f64,
        journal: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Filter for Probe {
        fn name(&self) -> &str {
            self.label
        }

        fn output_names(&self) -> &'static [&'static str] {
            &["output"]
        }

        fn compute(
            &mut self,
            inputs: &[&ImageBuffer],
            outputs: &mut [ImageBuffer],
        ) -> Result<(), PipelineError> {
            self.journal.lock().unwrap().push(self.label);
            let (input, output) = crate::filter::unary(self.label, inputs, outputs)?;
            let values = input.samples().to_f64_vec();
            *output.samples_mut() = Samples::from_f64(
                input.format().pixel_type(),
                values.into_iter().map(|v| v + self.offset),
            );
            Ok(())
        }
    }

    /// Zero-input source producing a constant gray image.
    struct Constant {
        value: f64,
        width: u32,
    }

    impl Filter for Constant {
        fn name(&self) -> &str {
            "constant"
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
            ImageFormat::gray8(self.width, 2)
        }

        fn compute(
            &mut self,
            _inputs: &[&ImageBuffer],
            outputs: &mut [ImageBuffer],
        ) -> Result<(), PipelineError> {
            for output in outputs {
                output.fill(self.value);
            }
            Ok(())
        }
    }

    fn probe(label: &'static str, journal: &Arc<Mutex<Vec<&'static str>>>) -> Probe {
        Probe {
            label,
            offset: 1.0,
            journal: Arc::clone(journal),
        }
    }

    #[test]
    fn first_update_computes_source_then_filter() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 10.0,
            width: 3,
        });
        let filter = pipeline.add(probe("a", &journal));
        pipeline.connect(pipeline.output(source).unwrap(), filter).unwrap();

        let out = pipeline.output(filter).unwrap();
        pipeline.update(out).unwrap();
        assert_eq!(*journal.lock().unwrap(), vec!["a"]);
        assert_eq!(pipeline.execution_log().run_order(), vec![source, filter]);
        let buffer = pipeline.buffer(out).unwrap().unwrap();
        assert_eq!(buffer.sample(2, 1, 0), Some(11.0));
    }

    #[test]
    fn output_info_time_is_candidate_not_fresh_stamp() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 1.0,
            width: 1,
        });
        let source_stamp = pipeline.node_status(source).unwrap().modified_time;
        let port = pipeline.output(source).unwrap();
        pipeline.update_output_information(port).unwrap();
        let status = pipeline.node_status(source).unwrap();
        assert_eq!(status.output_info_time, source_stamp);
        assert_eq!(pipeline.port(port).unwrap().pipeline_time(), source_stamp);
        assert!(pipeline.port(port).unwrap().is_stale());
    }

    #[test]
    fn data_pass_without_information_pass_is_noop() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 1.0,
            width: 1,
        });
        let port = pipeline.output(source).unwrap();
        pipeline.update_output_data(port).unwrap();
        assert!(pipeline.execution_log().runs().is_empty());
        assert!(pipeline.buffer(port).unwrap().is_none());
    }

    #[test]
    fn missing_input_is_reported_by_name() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let filter = pipeline.add(probe("lonely", &journal));
        let err = pipeline.update(pipeline.output(filter).unwrap()).unwrap_err();
        assert!(
            matches!(&err, PipelineError::MissingInput { input, .. } if input == "input"),
            "{err}"
        );
    }

    #[test]
    fn unknown_input_and_output_names() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 0.0,
            width: 1,
        });
        let journal = Arc::new(Mutex::new(Vec::new()));
        let filter = pipeline.add(probe("p", &journal));
        let port = pipeline.output(source).unwrap();
        assert!(matches!(
            pipeline.connect_input(filter, port, "nope"),
            Err(PipelineError::UnknownInput { .. })
        ));
        assert!(matches!(
            pipeline.output_named(source, "nope"),
            Err(PipelineError::UnknownOutput { .. })
        ));
        assert_eq!(pipeline.output_named(source, "image").unwrap(), port);
        assert!(matches!(
            pipeline.connect(pipeline.output(filter).unwrap(), source),
            Err(PipelineError::UnknownInput { .. })
        ));
    }

    #[test]
    fn connect_and_disconnect_touch_the_node() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 0.0,
            width: 1,
        });
        let journal = Arc::new(Mutex::new(Vec::new()));
        let filter = pipeline.add(probe("p", &journal));
        let before = pipeline.node_status(filter).unwrap().modified_time;
        let port = pipeline.output(source).unwrap();
        pipeline.connect(port, filter).unwrap();
        let connected = pipeline.node_status(filter).unwrap().modified_time;
        assert!(connected > before);
        assert_eq!(pipeline.disconnect_input(filter, "input").unwrap(), Some(port));
        assert!(pipeline.node_status(filter).unwrap().modified_time > connected);
        assert_eq!(pipeline.node_status(filter).unwrap().inputs[0].1, None);
    }

    #[test]
    fn typed_filter_access() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 3.0,
            width: 2,
        });
        assert!((pipeline.filter::<Constant>(source).unwrap().value - 3.0).abs() < f64::EPSILON);
        assert!(matches!(
            pipeline.filter::<Probe>(source),
            Err(PipelineError::FilterType { .. })
        ));

        let before = pipeline.node_status(source).unwrap().modified_time;
        let old = pipeline
            .modify_filter(source, |c: &mut Constant| std::mem::replace(&mut c.value, 9.0))
            .unwrap();
        assert!((old - 3.0).abs() < f64::EPSILON);
        assert!(pipeline.node_status(source).unwrap().modified_time > before);
    }

    #[test]
    fn failed_type_check_does_not_touch() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 3.0,
            width: 2,
        });
        let before = pipeline.node_status(source).unwrap().modified_time;
        assert!(pipeline.modify_filter(source, |_: &mut Probe| ()).is_err());
        assert_eq!(pipeline.node_status(source).unwrap().modified_time, before);
    }

    #[test]
    fn format_change_reallocates_and_recomputes() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 5.0,
            width: 2,
        });
        let port = pipeline.output(source).unwrap();
        pipeline.update(port).unwrap();
        pipeline
            .modify_filter(source, |c: &mut Constant| c.width = 4)
            .unwrap();
        pipeline.update(port).unwrap();
        let buffer = pipeline.buffer(port).unwrap().unwrap();
        assert_eq!(buffer.width(), 4);
        assert_eq!(buffer.sample(3, 1, 0), Some(5.0));
        assert_eq!(pipeline.execution_log().format_updates().len(), 2);
    }

    #[test]
    fn remove_detaches_ports_and_downstream_fails() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 1.0,
            width: 1,
        });
        let filter = pipeline.add(probe("p", &journal));
        let source_port = pipeline.output(source).unwrap();
        pipeline.connect(source_port, filter).unwrap();
        pipeline.update(pipeline.output(filter).unwrap()).unwrap();

        let removed = pipeline.remove(source).unwrap();
        assert_eq!(removed.name(), "constant");
        assert!(matches!(
            pipeline.update(source_port),
            Err(PipelineError::DetachedPort(p)) if p == source_port
        ));
        assert!(matches!(
            pipeline.buffer(source_port),
            Err(PipelineError::DetachedPort(_))
        ));
        pipeline.touch(filter).unwrap();
        assert!(matches!(
            pipeline.update(pipeline.output(filter).unwrap()),
            Err(PipelineError::DetachedPort(_))
        ));
        assert!(matches!(
            pipeline.remove(source),
            Err(PipelineError::UnknownNode(_))
        ));
        assert_eq!(pipeline.node_ids().collect::<Vec<_>>(), vec![filter]);
    }

    #[test]
    fn strict_mode_rejects_loop_on_connect() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline.set_cycle_mode(CycleMode::Strict);
        let a = pipeline.add(probe("a", &journal));
        let b = pipeline.add(probe("b", &journal));
        pipeline.connect(pipeline.output(a).unwrap(), b).unwrap();
        let err = pipeline.connect(pipeline.output(b).unwrap(), a).unwrap_err();
        assert!(matches!(err, PipelineError::CycleDetected { .. }));
        // The rejected binding was rolled back.
        assert_eq!(pipeline.node_status(a).unwrap().inputs[0].1, None);
    }

    #[test]
    fn topological_order_puts_sources_first() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let c = pipeline.add(probe("c", &journal));
        let source = pipeline.add(Constant {
            value: 0.0,
            width: 1,
        });
        let b = pipeline.add(probe("b", &journal));
        pipeline.connect(pipeline.output(source).unwrap(), b).unwrap();
        pipeline.connect(pipeline.output(b).unwrap(), c).unwrap();
        assert_eq!(pipeline.topological_order().unwrap(), vec![source, b, c]);
    }

    #[test]
    fn chain_returns_tail_port() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 0.0,
            width: 1,
        });
        let head = pipeline.output(source).unwrap();
        let tail = pipeline
            .chain(
                head,
                [
                    Box::new(probe("x", &journal)) as Box<dyn Filter>,
                    Box::new(probe("y", &journal)),
                ],
            )
            .unwrap();
        pipeline.update(tail).unwrap();
        assert_eq!(*journal.lock().unwrap(), vec!["x", "y"]);
        assert_eq!(pipeline.buffer(tail).unwrap().unwrap().sample(0, 0, 0), Some(2.0));
        assert_eq!(pipeline.chain(head, Vec::new()).unwrap(), head);
    }

    #[test]
    fn port_status_reports_staleness() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 0.0,
            width: 1,
        });
        let port = pipeline.output(source).unwrap();
        pipeline.update_output_information(port).unwrap();
        let status = pipeline.port_status(port).unwrap();
        assert!(status.stale);
        assert_eq!(status.format.as_deref(), Some("1x2x1 u8 (intensity)"));
        pipeline.update_output_data(port).unwrap();
        assert!(!pipeline.port_status(port).unwrap().stale);
    }

    /// Replaces its output store with three samples, whatever the format.
    struct Truncating;

    impl Filter for Truncating {
        fn name(&self) -> &str {
            "truncating"
        }

        fn output_names(&self) -> &'static [&'static str] {
            &["output"]
        }

        fn compute(
            &mut self,
            _inputs: &[&ImageBuffer],
            outputs: &mut [ImageBuffer],
        ) -> Result<(), PipelineError> {
            *outputs[0].samples_mut() = Samples::U8(vec![1, 2, 3]);
            Ok(())
        }
    }

    #[test]
    fn replaced_sample_store_is_a_shape_mismatch() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.add(Constant {
            value: 5.0,
            width: 4,
        });
        let filter = pipeline.add(Truncating);
        pipeline.connect(pipeline.output(source).unwrap(), filter).unwrap();
        let out = pipeline.output(filter).unwrap();

        let result = pipeline.update(out);
        assert!(matches!(result, Err(PipelineError::ShapeMismatch { .. })), "{result:?}");

        // The port keeps a well-formed buffer and stays stale.
        let buffer = pipeline.buffer(out).unwrap().unwrap();
        buffer.check_shape().unwrap();
        assert_eq!(buffer.samples().len(), 8);
        assert_eq!(buffer.transpose().dimensions(), Dimensions { width: 2, height: 4 });
        assert!(pipeline.port(out).unwrap().is_stale());
        assert_eq!(pipeline.execution_log().run_order(), vec![source]);
    }
}
