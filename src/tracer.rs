//! Tracer trait for observing propagation and barrier activity.
//!
//! The engine itself never logs. Instead, a [`Tracer`] installed with
//! [`Graph::with_tracer`](crate::Graph::with_tracer) receives callbacks as
//! writes propagate, recalculation attempts succeed or abort, relation paths
//! resolve, and barrier passes drain. The default [`NoopTracer`] keeps the
//! hooks zero-cost.
//!
//! [`EventLog`] is a ready-made collector that records each hook as a
//! serializable [`TraceEvent`], which is convenient for tests and for
//! dumping a propagation trace for offline analysis.
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use quiver::{EventLog, Graph, TraceEvent};
//!
//! let log = Rc::new(EventLog::default());
//! let graph = Graph::with_tracer(log.clone());
//! // ... build domains, write values, compute ...
//! for event in log.events() {
//!     if let TraceEvent::Recalculation { computed, outcome, .. } = event {
//!         println!("{computed}: {outcome:?}");
//!     }
//! }
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Outcome of a recalculation attempt for one (computed field, key) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecalcOutcome {
    /// Every dependency resolved; a compute task was enqueued.
    Enqueued,
    /// A dependency's domain had no resolvable key; attempt abandoned.
    KeyUnresolved,
    /// A dependency had no stored value at the resolved key; attempt abandoned.
    ValueMissing,
}

/// Observer of engine activity.
///
/// All methods have empty default implementations, so implementors only
/// override the events they care about. The engine is single-threaded and
/// calls the tracer synchronously on the writer's stack.
pub trait Tracer: 'static {
    /// A field with dependants was written at `key`.
    #[inline]
    fn on_input_changed(&self, _domain: &str, _field: &str, _key: &Value) {}

    /// A recalculation of `computed` at `key` was attempted.
    #[inline]
    fn on_recalculation(&self, _computed: &str, _key: &Value, _outcome: RecalcOutcome) {}

    /// A relation path from `from` to `to` was resolved (and memoized).
    ///
    /// `hops` is zero when no path exists; the empty result is memoized too.
    #[inline]
    fn on_path_resolved(&self, _from: &str, _to: &str, _hops: usize) {}

    /// A domain's compute queue was drained.
    #[inline]
    fn on_compute_pass(&self, _domain: &str, _tasks: usize) {}

    /// A domain's publish queue was drained.
    #[inline]
    fn on_publish_pass(&self, _domain: &str, _tasks: usize) {}
}

/// Tracer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// A recorded engine event. Keys are carried as their debug representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// A field with dependants changed.
    InputChanged {
        /// Owning domain name.
        domain: String,
        /// Changed field name.
        field: String,
        /// Debug representation of the written key.
        key: String,
    },
    /// A recalculation attempt ran.
    Recalculation {
        /// Computed field name.
        computed: String,
        /// Debug representation of the key being recalculated.
        key: String,
        /// Whether a task was enqueued or why the attempt was abandoned.
        outcome: RecalcOutcome,
    },
    /// A relation path was resolved for the first time.
    PathResolved {
        /// Source domain name.
        from: String,
        /// Target domain name.
        to: String,
        /// Number of relation hops; zero when unreachable.
        hops: usize,
    },
    /// A compute pass drained `tasks` tasks from `domain`.
    ComputePass {
        /// Domain name.
        domain: String,
        /// Number of tasks executed.
        tasks: usize,
    },
    /// A publish pass drained `tasks` tasks from `domain`.
    PublishPass {
        /// Domain name.
        domain: String,
        /// Number of tasks executed.
        tasks: usize,
    },
}

/// Tracer that records every event for later inspection.
///
/// Share it with the graph through an `Rc`:
/// `Graph::with_tracer(log.clone())`.
#[derive(Debug, Default)]
pub struct EventLog {
    events: RefCell<Vec<TraceEvent>>,
}

impl EventLog {
    /// Snapshot of all events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    /// Drain and return the recorded events.
    pub fn take(&self) -> Vec<TraceEvent> {
        self.events.borrow_mut().drain(..).collect()
    }

    fn push(&self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Tracer for Rc<EventLog> {
    fn on_input_changed(&self, domain: &str, field: &str, key: &Value) {
        self.push(TraceEvent::InputChanged {
            domain: domain.to_owned(),
            field: field.to_owned(),
            key: format!("{key:?}"),
        });
    }

    fn on_recalculation(&self, computed: &str, key: &Value, outcome: RecalcOutcome) {
        self.push(TraceEvent::Recalculation {
            computed: computed.to_owned(),
            key: format!("{key:?}"),
            outcome,
        });
    }

    fn on_path_resolved(&self, from: &str, to: &str, hops: usize) {
        self.push(TraceEvent::PathResolved {
            from: from.to_owned(),
            to: to.to_owned(),
            hops,
        });
    }

    fn on_compute_pass(&self, domain: &str, tasks: usize) {
        self.push(TraceEvent::ComputePass {
            domain: domain.to_owned(),
            tasks,
        });
    }

    fn on_publish_pass(&self, domain: &str, tasks: usize) {
        self.push(TraceEvent::PublishPass {
            domain: domain.to_owned(),
            tasks,
        });
    }
}
