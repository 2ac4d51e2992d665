//! Logical time for staleness tracking.
//!
//! Every mutation in a pipeline (a filter parameter change, a rewiring, a
//! freshly generated output) is stamped with a value drawn from a
//! [`LogicalClock`]. Because the clock only moves forward, comparing two
//! stamps with a single integer comparison tells whether one change happened
//! after the other, without walking the graph.
//!
//! The clock is an explicit handle rather than process-wide state: clones
//! share the same counter, so several pipelines that must agree on ordering
//! can be built from clones of one clock, and tests can start from a known
//! value with [`LogicalClock::starting_at`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared, monotonically increasing counter.
///
/// Cheap to clone; all clones observe and advance the same counter.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    counter: Arc<AtomicU64>,
}

impl LogicalClock {
    /// Create a clock whose first [`next`](Self::next) returns 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock whose first [`next`](Self::next) returns `value + 1`.
    #[must_use]
    pub fn starting_at(value: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(value)),
        }
    }

    /// Advance the clock and return the new value.
    ///
    /// The returned value is strictly greater than every value previously
    /// returned by this clock or any of its clones, including across
    /// threads.
    pub fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently issued value (0 if none was issued yet).
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// A "last modified" logical time attached to a node or a port.
///
/// Starts at zero, which is older than anything a clock can issue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    modified_time: u64,
}

impl Timestamp {
    /// A timestamp that has never been touched.
    #[must_use]
    pub const fn new() -> Self {
        Self { modified_time: 0 }
    }

    /// Mark as modified now: draw a fresh value from `clock` and store it.
    pub fn touch(&mut self, clock: &LogicalClock) -> u64 {
        self.modified_time = clock.next();
        self.modified_time
    }

    /// Store a propagated time without drawing from the clock.
    pub const fn record(&mut self, time: u64) {
        self.modified_time = time;
    }

    /// The stored logical time.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.modified_time
    }
}
