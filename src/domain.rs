//! Domains: containers of fields over one key type, task queues, and the
//! propagation machinery.
//!
//! A domain owns its fields in declaration order, the two FIFO task queues
//! drained by the graph's barrier, the canonical foreign-key list (the
//! first relation declared toward each target domain), and a memoized
//! cache of relation paths to other domains.
//!
//! Propagation starts here: when a field with dependants is written,
//! [`DomainCore::on_input_changed`] enumerates the affected
//! (computed field, key) pairs. Dependants living in this domain are
//! re-evaluated at the written key directly. A dependant in another domain
//! is reached by resolving that domain's relation path back to this one
//! and expanding the written key through the reverse index of each hop,
//! walking the path back to front (each hop maps keys of its remote side
//! to the local keys linked there). One remote key may fan out to many
//! local keys per hop.
//!
//! Forward resolution is the mirror image: [`DomainCore::related_key`]
//! folds a local key through the forward map of each hop front to back,
//! one-to-one, giving up as soon as a link is missing.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::computed::{ComputedCore, ComputedField, ErasedComputed, Params};
use crate::field::{Dependency, ErasedField, Field, FieldCore, FieldRef};
use crate::graph::GraphCore;
use crate::key::{DomainId, FieldValue, Key};
use crate::relation::{RelationCore, RelationField, RelationRef};
use crate::tracer::Tracer;
use crate::value::Value;

/// A deferred unit of barrier work.
pub(crate) type Task = Box<dyn FnOnce()>;

/// Crate-internal type-erased domain surface: what the graph barrier, the
/// path resolver, and cross-domain propagation need.
pub(crate) trait ErasedDomain {
    fn domain_id(&self) -> DomainId;
    fn domain_name(&self) -> &str;
    fn erased_fields(&self) -> Vec<Rc<dyn ErasedField>>;
    fn find_erased_field(&self, name: &str) -> Option<Rc<dyn ErasedField>>;
    fn canonical_foreign_keys(&self) -> Vec<RelationRef>;
    fn relation_path_to(&self, target: DomainId) -> Rc<Vec<RelationRef>>;
    fn related_key_erased(&self, key: &Value, target: DomainId) -> Value;
    fn compute_pending(&self) -> bool;
    fn publish_pending(&self) -> bool;
    fn run_compute_wave(&self);
    fn run_publish_wave(&self);
}

/// Shared body of a domain.
pub(crate) struct DomainCore<K: Key> {
    id: DomainId,
    name: String,
    graph: Weak<GraphCore>,
    tracer: Rc<dyn Tracer>,
    fields: RefCell<Vec<Rc<dyn ErasedField>>>,
    foreign_keys: RefCell<Vec<RelationRef>>,
    relation_paths: RefCell<AHashMap<DomainId, Rc<Vec<RelationRef>>>>,
    compute_tasks: RefCell<VecDeque<Task>>,
    publish_tasks: RefCell<VecDeque<Task>>,
    _key: std::marker::PhantomData<K>,
}

impl<K: Key> DomainCore<K> {
    pub(crate) fn new(
        id: DomainId,
        name: String,
        graph: Weak<GraphCore>,
        tracer: Rc<dyn Tracer>,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            name,
            graph,
            tracer,
            fields: RefCell::new(Vec::new()),
            foreign_keys: RefCell::new(Vec::new()),
            relation_paths: RefCell::new(AHashMap::new()),
            compute_tasks: RefCell::new(VecDeque::new()),
            publish_tasks: RefCell::new(VecDeque::new()),
            _key: std::marker::PhantomData,
        })
    }

    pub(crate) fn tracer(&self) -> Rc<dyn Tracer> {
        self.tracer.clone()
    }

    fn graph(&self) -> Rc<GraphCore> {
        self.graph.upgrade().expect("graph was dropped")
    }

    pub(crate) fn push_compute_task(&self, task: Task) {
        self.compute_tasks.borrow_mut().push_back(task);
    }

    pub(crate) fn push_publish_task(&self, task: Task) {
        self.publish_tasks.borrow_mut().push_back(task);
    }

    /// Enumerate and trigger every recalculation affected by a write of
    /// `key` to a field of this domain carrying `dependants`.
    pub(crate) fn on_input_changed(
        &self,
        field_name: &str,
        dependants: &[Rc<dyn ErasedComputed>],
        key: &K,
    ) {
        let key = Value::new(key.clone());
        self.tracer.on_input_changed(&self.name, field_name, &key);

        let Some(graph) = self.graph.upgrade() else {
            return;
        };

        for dependant in dependants {
            if dependant.computed_domain_id() == self.id {
                dependant.recalculate(&key);
                continue;
            }

            // The dependant lives in another domain; its keys are found by
            // expanding the written key through the reverse index of each
            // relation on that domain's path back to here, last hop first.
            let remote = graph.domain_by_id(dependant.computed_domain_id());
            let path = remote.relation_path_to(self.id);
            if path.is_empty() {
                // No route back: the dependant can never observe writes
                // from this domain.
                continue;
            }

            let mut frontier = vec![key.clone()];
            for hop in path.iter().rev() {
                let mut expanded = Vec::new();
                for frontier_key in &frontier {
                    expanded.extend(hop.erased.local_keys(frontier_key));
                }
                frontier = expanded;
                if frontier.is_empty() {
                    break;
                }
            }
            for local_key in &frontier {
                dependant.recalculate(local_key);
            }
        }
    }

    /// Shortest relation path from this domain to `target`, memoized.
    ///
    /// A direct foreign key wins outright; otherwise a breadth-first search
    /// over the canonical foreign keys of all domains, visiting each
    /// domain's keys in declaration order. The empty result (no route) is
    /// memoized like any other.
    pub(crate) fn relation_path(&self, target: DomainId) -> Rc<Vec<RelationRef>> {
        if let Some(path) = self.relation_paths.borrow().get(&target) {
            return path.clone();
        }

        let path = Rc::new(self.find_relation_path(target));
        self.relation_paths.borrow_mut().insert(target, path.clone());

        if let Some(graph) = self.graph.upgrade() {
            let target_name = graph.domain_by_id(target).domain_name().to_owned();
            self.tracer.on_path_resolved(&self.name, &target_name, path.len());
        }
        path
    }

    fn find_relation_path(&self, target: DomainId) -> Vec<RelationRef> {
        // Direct relation first.
        if let Some(direct) = self
            .foreign_keys
            .borrow()
            .iter()
            .find(|fk| fk.erased.remote_domain_id() == target)
        {
            return vec![direct.clone()];
        }

        let Some(graph) = self.graph.upgrade() else {
            return Vec::new();
        };

        // Breadth-first search over domains; edges are canonical foreign
        // keys in declaration order, which fixes tie-breaking among
        // equal-length paths.
        let mut visited: BTreeSet<DomainId> = BTreeSet::new();
        visited.insert(self.id);
        let mut queue: VecDeque<DomainId> = VecDeque::new();
        queue.push_back(self.id);
        let mut reached_via: AHashMap<DomainId, (DomainId, RelationRef)> = AHashMap::new();

        while let Some(current) = queue.pop_front() {
            if current == target {
                let mut path = Vec::new();
                let mut cursor = target;
                while cursor != self.id {
                    let (previous, hop) = reached_via[&cursor].clone();
                    path.push(hop);
                    cursor = previous;
                }
                path.reverse();
                return path;
            }
            for hop in graph.domain_by_id(current).canonical_foreign_keys() {
                let next = hop.erased.remote_domain_id();
                if visited.insert(next) {
                    reached_via.insert(next, (current, hop));
                    queue.push_back(next);
                }
            }
        }

        Vec::new()
    }

    /// Fold `key` through the relation path to `target`, forward map by
    /// forward map. Empty when no path exists or any link is missing.
    pub(crate) fn related_key(&self, key: &Value, target: DomainId) -> Value {
        let path = self.relation_path(target);
        if path.is_empty() {
            return Value::empty();
        }

        let mut current = key.clone();
        for hop in path.iter() {
            current = hop.erased.forward_key(&current);
            if current.is_empty() {
                return Value::empty();
            }
        }
        current
    }
}

impl<K: Key> ErasedDomain for DomainCore<K> {
    fn domain_id(&self) -> DomainId {
        self.id
    }

    fn domain_name(&self) -> &str {
        &self.name
    }

    fn erased_fields(&self) -> Vec<Rc<dyn ErasedField>> {
        self.fields.borrow().clone()
    }

    fn find_erased_field(&self, name: &str) -> Option<Rc<dyn ErasedField>> {
        self.fields
            .borrow()
            .iter()
            .find(|field| field.field_name() == name)
            .cloned()
    }

    fn canonical_foreign_keys(&self) -> Vec<RelationRef> {
        self.foreign_keys.borrow().clone()
    }

    fn relation_path_to(&self, target: DomainId) -> Rc<Vec<RelationRef>> {
        self.relation_path(target)
    }

    fn related_key_erased(&self, key: &Value, target: DomainId) -> Value {
        self.related_key(key, target)
    }

    fn compute_pending(&self) -> bool {
        !self.compute_tasks.borrow().is_empty()
    }

    fn publish_pending(&self) -> bool {
        !self.publish_tasks.borrow().is_empty()
    }

    /// Run the compute tasks present when the wave starts. Tasks enqueued
    /// by the wave itself (cascades into this domain) wait for the next
    /// `compute()` call.
    fn run_compute_wave(&self) {
        let tasks = std::mem::take(&mut *self.compute_tasks.borrow_mut());
        if tasks.is_empty() {
            return;
        }
        self.tracer.on_compute_pass(&self.name, tasks.len());
        for task in tasks {
            task();
        }
    }

    fn run_publish_wave(&self) {
        let tasks = std::mem::take(&mut *self.publish_tasks.borrow_mut());
        if tasks.is_empty() {
            return;
        }
        self.tracer.on_publish_pass(&self.name, tasks.len());
        for task in tasks {
            task();
        }
    }
}

/// Identifies a domain when resolving paths and related keys; implemented
/// by typed [`Domain`] handles and by [`DomainRef`](crate::DomainRef).
pub trait DomainHandle {
    /// The domain's stable id within its graph.
    #[doc(hidden)]
    fn handle_id(&self) -> DomainId;
}

/// A named entity type with key type `K`, owning its fields.
///
/// Handles are cheap to clone; all clones refer to the same domain.
pub struct Domain<K: Key> {
    core: Rc<DomainCore<K>>,
}

impl<K: Key> Clone for Domain<K> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<K: Key> DomainHandle for Domain<K> {
    fn handle_id(&self) -> DomainId {
        self.core.id
    }
}

impl<K: Key> Domain<K> {
    pub(crate) fn from_core(core: Rc<DomainCore<K>>) -> Self {
        Self { core }
    }

    /// The domain's name, unique within its graph.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Create a field named `name` holding values of type `V`.
    pub fn create_field<V: FieldValue>(&self, name: &str) -> Field<V, K> {
        let core = FieldCore::new(
            self.core.graph().allocate_field_id(),
            name.to_owned(),
            self.core.id,
            Rc::downgrade(&self.core),
        );
        self.core.fields.borrow_mut().push(core.clone());
        Field::from_core(core)
    }

    /// Create a relation (foreign key) field whose values are keys of
    /// `remote`, named `"<local>-><remote>"`.
    ///
    /// The first relation declared toward a given target is the canonical
    /// one used by path-finding; later relations to the same target behave
    /// as ordinary fields but are invisible to the resolver.
    ///
    /// # Panics
    ///
    /// Panics when `remote` is this domain.
    pub fn create_relation_to<R: Key>(&self, remote: &Domain<R>) -> RelationField<K, R> {
        assert!(
            self.core.id != remote.core.id,
            "a domain cannot relate to itself"
        );

        let name = format!("{}->{}", self.core.name, remote.core.name);
        let remote_dyn: Rc<dyn ErasedDomain> = remote.core.clone();
        let remote_weak: Weak<dyn ErasedDomain> = Rc::downgrade(&remote_dyn);
        let core = RelationCore::new(
            self.core.graph().allocate_field_id(),
            name,
            self.core.id,
            Rc::downgrade(&self.core),
            remote.core.id,
            remote_weak,
        );
        self.core.fields.borrow_mut().push(core.clone());

        let mut foreign_keys = self.core.foreign_keys.borrow_mut();
        let already_known = foreign_keys
            .iter()
            .any(|fk| fk.erased.remote_domain_id() == remote.core.id);
        if !already_known {
            foreign_keys.push(RelationRef {
                erased: core.clone(),
                field: core.clone(),
            });
        }
        drop(foreign_keys);

        RelationField::from_core(core)
    }

    /// Create a computed field named `name` whose value at each key is
    /// `calc` applied to the resolved values of `dependencies`.
    ///
    /// Dependencies may live in any domain; a dependency in another domain
    /// must be reachable through relation paths by the time this call runs,
    /// or the computed field will never fire (paths are memoized here,
    /// empty results included). The dependency set is fixed for the life of
    /// the field, and since it can only name already-created fields the
    /// dependency graph stays acyclic by construction.
    ///
    /// The computed field is registered as a dependant of every dependency
    /// and of every relation field on any path between the involved
    /// domains, so establishing a foreign-key link also triggers
    /// recomputation.
    pub fn computed<V: FieldValue>(
        &self,
        name: &str,
        dependencies: &[&dyn Dependency],
        calc: impl Fn(&Params) -> V + 'static,
    ) -> ComputedField<V, K> {
        let graph = self.core.graph();

        let mut resolved: Vec<Rc<dyn ErasedField>> = Vec::new();
        for dependency in dependencies {
            let field = dependency.dependency().field;
            let duplicate = resolved
                .iter()
                .any(|existing| existing.field_id() == field.field_id());
            if !duplicate {
                resolved.push(field);
            }
        }

        let id = graph.allocate_field_id();
        let base = FieldCore::new(id, name.to_owned(), self.core.id, Rc::downgrade(&self.core));
        let core = ComputedCore::new(base, resolved.clone(), Box::new(calc));
        self.core.fields.borrow_mut().push(core.clone());

        let core_dyn: Rc<dyn ErasedComputed> = core.clone();
        let dependant: Weak<dyn ErasedComputed> = Rc::downgrade(&core_dyn);
        for dependency in &resolved {
            dependency.add_dependant(id, dependant.clone());
        }

        let mut involved: Vec<DomainId> = vec![self.core.id];
        for dependency in &resolved {
            let domain_id = dependency.field_domain_id();
            if !involved.contains(&domain_id) {
                involved.push(domain_id);
            }
        }
        for &from in &involved {
            for &to in &involved {
                if from == to {
                    continue;
                }
                for hop in graph.domain_by_id(from).relation_path_to(to).iter() {
                    hop.erased.add_dependant(id, dependant.clone());
                }
            }
        }

        ComputedField::from_core(core)
    }

    /// The field named `name`, or `None`. Linear in the number of fields.
    pub fn find_field(&self, name: &str) -> Option<FieldRef> {
        self.core.find_erased_field(name).map(FieldRef::from_erased)
    }

    /// All fields in declaration order.
    pub fn fields(&self) -> Vec<FieldRef> {
        self.core
            .erased_fields()
            .into_iter()
            .map(FieldRef::from_erased)
            .collect()
    }

    /// The canonical foreign keys of this domain, in declaration order.
    pub fn foreign_keys(&self) -> Vec<FieldRef> {
        self.core
            .canonical_foreign_keys()
            .into_iter()
            .map(|fk| FieldRef::from_erased(fk.field))
            .collect()
    }

    /// The memoized relation path from this domain to `target`; empty when
    /// no route exists.
    pub fn relation_path_to(&self, target: &impl DomainHandle) -> Vec<FieldRef> {
        self.core
            .relation_path(target.handle_id())
            .iter()
            .map(|hop| FieldRef::from_erased(hop.field.clone()))
            .collect()
    }

    /// The key in `target` reachable from `key` by following forward links
    /// along the relation path, or the empty [`Value`].
    pub fn related_key(&self, key: &K, target: &impl DomainHandle) -> Value {
        self.core
            .related_key(&Value::new(key.clone()), target.handle_id())
    }
}
