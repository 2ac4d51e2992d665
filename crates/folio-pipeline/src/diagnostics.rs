//! Execution diagnostics: which nodes ran, in what order, and how long
//! each step took.
//!
//! Every [`Pipeline`](crate::Pipeline) keeps an [`ExecutionLog`]. The
//! information pass appends a [`FormatUpdate`] whenever a node commits new
//! output formats and the data pass appends a [`NodeRun`] whenever a
//! filter's `compute` succeeds. Memoised (skipped) work leaves no entry, so
//! the log doubles as a record of exactly what was recomputed.
//!
//! Timestamps are captured with the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// One successful `compute` of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRun {
    /// The node that ran.
    pub node: NodeId,
    /// Filter name of the node.
    pub name: String,
    /// Wall-clock duration of `compute` (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Logical time stamped on the node's outputs.
    pub stamped_at: u64,
}

/// One committed information pass of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatUpdate {
    /// The node whose outputs got new formats.
    pub node: NodeId,
    /// Filter name of the node.
    pub name: String,
    /// Pipeline time recorded on the outputs.
    pub pipeline_time: u64,
    /// Committed output formats, rendered for display.
    pub formats: Vec<String>,
}

/// Chronological record of pipeline work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLog {
    runs: Vec<NodeRun>,
    format_updates: Vec<FormatUpdate>,
}

impl ExecutionLog {
    /// Append a compute record.
    pub fn record_run(&mut self, run: NodeRun) {
        self.runs.push(run);
    }

    /// Append a format record.
    pub fn record_format_update(&mut self, update: FormatUpdate) {
        self.format_updates.push(update);
    }

    /// Compute records, oldest first.
    #[must_use]
    pub fn runs(&self) -> &[NodeRun] {
        &self.runs
    }

    /// Format records, oldest first.
    #[must_use]
    pub fn format_updates(&self) -> &[FormatUpdate] {
        &self.format_updates
    }

    /// How many times `node` computed.
    #[must_use]
    pub fn run_count(&self, node: NodeId) -> usize {
        self.runs.iter().filter(|r| r.node == node).count()
    }

    /// Nodes in the order they computed.
    #[must_use]
    pub fn run_order(&self) -> Vec<NodeId> {
        self.runs.iter().map(|r| r.node).collect()
    }

    /// Sum of all compute durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.runs.iter().map(|r| r.duration).sum()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.format_updates.is_empty()
    }

    /// Forget all records.
    pub fn clear(&mut self) {
        self.runs.clear();
        self.format_updates.clear();
    }

    /// Format the log as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Execution Report\n{}", "=".repeat(60)));
        let total_ms = duration_ms(self.total_duration());
        lines.push(format!(
            "Computes: {}  |  Format updates: {}  |  Total: {total_ms:.3}ms",
            self.runs.len(),
            self.format_updates.len(),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<10} {:<20} {:>10} {:>10}  {}",
            "Node", "Filter", "Duration", "% Total", "Stamp"
        ));
        lines.push("-".repeat(72));
        for run in &self.runs {
            let ms = duration_ms(run.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<10} {:<20} {ms:>8.3}ms {pct:>9.1}%  t={}",
                run.node.to_string(),
                run.name,
                run.stamped_at
            ));
        }

        if !self.format_updates.is_empty() {
            lines.push(String::new());
            lines.push("Formats".to_owned());
            lines.push("-".repeat(72));
            for update in &self.format_updates {
                lines.push(format!(
                    "{:<10} {:<20} t={}  {}",
                    update.node.to_string(),
                    update.name,
                    update.pipeline_time,
                    update.formats.join(", ")
                ));
            }
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
