//! The graph: container of domains and the two-phase barrier.
//!
//! All mutation funnels through per-domain task queues; the barrier drains
//! them in two phases. `compute()` runs the pending recalculations, domain
//! by domain in declaration order, each domain drained exactly once per
//! call. A compute task may cascade (its result write enqueues further
//! tasks); work that lands in a domain already drained this pass, or in
//! the domain currently draining, waits for the next call, so each
//! `compute()` advances the graph by one deterministic wave. `publish()`
//! then drains subscriber notifications; publishing never enqueues
//! compute work.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::domain::{Domain, DomainCore, DomainHandle, ErasedDomain};
use crate::field::FieldRef;
use crate::key::{DomainId, FieldId, Key};
use crate::tracer::{NoopTracer, Tracer};
use crate::value::Value;

/// Shared body of a graph.
pub(crate) struct GraphCore {
    domains: RefCell<Vec<Rc<dyn ErasedDomain>>>,
    next_field_id: Cell<u64>,
    tracer: Rc<dyn Tracer>,
}

impl GraphCore {
    pub(crate) fn allocate_field_id(&self) -> FieldId {
        let id = FieldId(self.next_field_id.get());
        self.next_field_id.set(id.0 + 1);
        id
    }

    pub(crate) fn domain_by_id(&self, id: DomainId) -> Rc<dyn ErasedDomain> {
        self.domains.borrow()[id.0 as usize].clone()
    }

    pub(crate) fn domains(&self) -> Vec<Rc<dyn ErasedDomain>> {
        self.domains.borrow().clone()
    }
}

/// An in-process reactive computation graph over keyed tabular data.
///
/// The graph owns its domains; domains own their fields. All handles are
/// cheap clones into shared state, and everything is single-threaded.
pub struct Graph {
    core: Rc<GraphCore>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create an empty graph with no tracer installed.
    pub fn new() -> Self {
        Self::with_tracer(NoopTracer)
    }

    /// Create an empty graph that reports engine activity to `tracer`.
    pub fn with_tracer(tracer: impl Tracer) -> Self {
        Self {
            core: Rc::new(GraphCore {
                domains: RefCell::new(Vec::new()),
                next_field_id: Cell::new(0),
                tracer: Rc::new(tracer),
            }),
        }
    }

    /// Add a domain named `name` with key type `K`.
    ///
    /// Names are expected to be unique within the graph; duplicates are not
    /// detected, and name lookups return the first match.
    pub fn add_domain<K: Key>(&self, name: &str) -> Domain<K> {
        let id = DomainId(self.core.domains.borrow().len() as u32);
        let core = DomainCore::<K>::new(
            id,
            name.to_owned(),
            Rc::downgrade(&self.core),
            self.core.tracer.clone(),
        );
        self.core.domains.borrow_mut().push(core.clone());
        Domain::from_core(core)
    }

    /// All domains in declaration order, type-erased.
    pub fn domains(&self) -> Vec<DomainRef> {
        self.core
            .domains()
            .into_iter()
            .map(DomainRef::from_erased)
            .collect()
    }

    /// The domain named `name`, or `None`. Linear in the number of domains.
    pub fn find_domain(&self, name: &str) -> Option<DomainRef> {
        self.core
            .domains
            .borrow()
            .iter()
            .find(|domain| domain.domain_name() == name)
            .cloned()
            .map(DomainRef::from_erased)
    }

    /// Whether any domain has pending compute tasks.
    pub fn is_compute_required(&self) -> bool {
        self.core
            .domains
            .borrow()
            .iter()
            .any(|domain| domain.compute_pending())
    }

    /// Whether any domain has pending publish tasks.
    pub fn is_publish_required(&self) -> bool {
        self.core
            .domains
            .borrow()
            .iter()
            .any(|domain| domain.publish_pending())
    }

    /// Drain every domain's compute queue once, in declaration order.
    ///
    /// Cascaded work enqueued during the pass is left for the next call;
    /// check [`is_compute_required`](Self::is_compute_required) to see
    /// whether another wave is due.
    pub fn compute(&self) {
        for domain in self.core.domains() {
            domain.run_compute_wave();
        }
    }

    /// Drain every domain's publish queue once, in declaration order,
    /// invoking subscribers for each published `(key, value)`.
    pub fn publish(&self) {
        for domain in self.core.domains() {
            domain.run_publish_wave();
        }
    }

    pub(crate) fn core(&self) -> &Rc<GraphCore> {
        &self.core
    }
}

/// Read-only type-erased handle to a domain.
pub struct DomainRef {
    core: Rc<dyn ErasedDomain>,
}

impl Clone for DomainRef {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl DomainHandle for DomainRef {
    fn handle_id(&self) -> DomainId {
        self.core.domain_id()
    }
}

impl DomainRef {
    pub(crate) fn from_erased(core: Rc<dyn ErasedDomain>) -> Self {
        Self { core }
    }

    /// The domain's name.
    pub fn name(&self) -> &str {
        self.core.domain_name()
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> Vec<FieldRef> {
        self.core
            .erased_fields()
            .into_iter()
            .map(FieldRef::from_erased)
            .collect()
    }

    /// The field named `name`, or `None`.
    pub fn find_field(&self, name: &str) -> Option<FieldRef> {
        self.core.find_erased_field(name).map(FieldRef::from_erased)
    }

    /// The canonical foreign keys of this domain, in declaration order.
    pub fn foreign_keys(&self) -> Vec<FieldRef> {
        self.core
            .canonical_foreign_keys()
            .into_iter()
            .map(|fk| FieldRef::from_erased(fk.field))
            .collect()
    }

    /// Type-erased forward key resolution toward `target`.
    pub fn related_key(&self, key: &Value, target: &impl DomainHandle) -> Value {
        self.core.related_key_erased(key, target.handle_id())
    }
}
