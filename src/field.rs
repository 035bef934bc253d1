//! Per-key typed storage with subscribers and dependants.
//!
//! A field stores the latest value written for each key of its owning
//! domain. Writes do three things, in order: store the value, notify the
//! owning domain when computed fields depend on this one (which drives
//! propagation), and enqueue a publish task when subscribers exist.
//!
//! The public [`Field`] handle is a cheap clone over a shared body, in the
//! same way a `Var` wraps its body in reactive-value libraries. Type-erased
//! access for cross-type pathways goes through the crate-internal
//! [`ErasedField`] surface, exposed read-only to users as [`FieldRef`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::computed::ErasedComputed;
use crate::domain::DomainCore;
use crate::key::{DomainId, FieldId, FieldValue, Key, SubscriptionId};
use crate::value::Value;

/// What kind of field an erased handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldShape {
    /// A plain input field.
    Input,
    /// A relation (foreign key) field.
    Relation,
    /// A computed field.
    Computed,
}

/// Crate-internal type-erased field surface.
///
/// Every concrete field body implements this; the engine's cross-type
/// pathways (key resolution, dependant registration, visitation, DOT
/// emission) only see this trait.
pub(crate) trait ErasedField {
    fn field_id(&self) -> FieldId;
    fn field_domain_id(&self) -> DomainId;
    fn field_name(&self) -> &str;
    fn shape(&self) -> FieldShape;
    /// Value stored at the erased `key`, or the empty [`Value`] when absent.
    /// Panics when `key` is not of the owning domain's key type.
    fn value_at(&self, key: &Value) -> Value;
    fn stored_len(&self) -> usize;
    fn visit_erased(&self, visitor: &mut dyn FnMut(&Value, &Value));
    fn add_dependant(&self, id: FieldId, dependant: Weak<dyn ErasedComputed>);
    /// Dependency fields of a computed field; empty for other shapes.
    fn dependency_fields(&self) -> Vec<Rc<dyn ErasedField>>;
}

/// Shared body of a field: the ordered value map, the subscriber registry,
/// and the dependant registry. Relation and computed fields embed one of
/// these and layer their extra behavior on top.
pub(crate) struct FieldCore<V: FieldValue, K: Key> {
    id: FieldId,
    name: String,
    domain_id: DomainId,
    domain: Weak<DomainCore<K>>,
    this: Weak<FieldCore<V, K>>,
    values: RefCell<BTreeMap<K, V>>,
    subscribers: RefCell<BTreeMap<SubscriptionId, Box<dyn Fn(&K, &V)>>>,
    next_subscription: Cell<u64>,
    dependants: RefCell<BTreeMap<FieldId, Weak<dyn ErasedComputed>>>,
}

impl<V: FieldValue, K: Key> FieldCore<V, K> {
    pub(crate) fn new(
        id: FieldId,
        name: String,
        domain_id: DomainId,
        domain: Weak<DomainCore<K>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id,
            name,
            domain_id,
            domain,
            this: this.clone(),
            values: RefCell::new(BTreeMap::new()),
            subscribers: RefCell::new(BTreeMap::new()),
            next_subscription: Cell::new(0),
            dependants: RefCell::new(BTreeMap::new()),
        })
    }

    pub(crate) fn id(&self) -> FieldId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn domain_id(&self) -> DomainId {
        self.domain_id
    }

    pub(crate) fn domain(&self) -> Option<Rc<DomainCore<K>>> {
        self.domain.upgrade()
    }

    /// Store `value` at `key`, then drive propagation and publishing.
    ///
    /// The value lands in the map before any hook runs, so recalculations
    /// triggered on the writer's stack observe the new state. The publish
    /// task captures the written pair; subscribers registered later see
    /// only subsequent writes.
    pub(crate) fn set_value(&self, key: K, value: V) {
        self.values.borrow_mut().insert(key.clone(), value.clone());

        let Some(domain) = self.domain.upgrade() else {
            return;
        };

        let dependants: Vec<Rc<dyn ErasedComputed>> = self
            .dependants
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        if !dependants.is_empty() {
            domain.on_input_changed(&self.name, &dependants, &key);
        }

        if !self.subscribers.borrow().is_empty() {
            let this = self.this.clone();
            domain.push_publish_task(Box::new(move || {
                if let Some(field) = this.upgrade() {
                    field.notify(&key, &value);
                }
            }));
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.values.borrow().get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub(crate) fn visit(&self, mut visitor: impl FnMut(&K, &V)) {
        for (key, value) in self.values.borrow().iter() {
            visitor(key, value);
        }
    }

    /// Register a subscriber and return its cancellation guard.
    pub(crate) fn subscribe(&self, callback: impl Fn(&K, &V) + 'static) -> Subscription {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.subscribers.borrow_mut().insert(id, Box::new(callback));

        let this = self.this.clone();
        Subscription {
            cancel: Box::new(move || {
                let Some(field) = this.upgrade() else {
                    panic!("cancelled a subscription on a field whose graph was dropped");
                };
                let removed = field.subscribers.borrow_mut().remove(&id);
                assert!(removed.is_some(), "subscription {id:?} was already removed");
            }),
        }
    }

    fn notify(&self, key: &K, value: &V) {
        for callback in self.subscribers.borrow().values() {
            callback(key, value);
        }
    }

    pub(crate) fn erased_value_at(&self, key: &Value) -> Value {
        let key = key.expect_ref::<K>("field key lookup");
        match self.values.borrow().get(key) {
            Some(value) => Value::new(value.clone()),
            None => Value::empty(),
        }
    }

    pub(crate) fn register_dependant(&self, id: FieldId, dependant: Weak<dyn ErasedComputed>) {
        self.dependants.borrow_mut().insert(id, dependant);
    }
}

impl<V: FieldValue, K: Key> ErasedField for FieldCore<V, K> {
    fn field_id(&self) -> FieldId {
        self.id
    }

    fn field_domain_id(&self) -> DomainId {
        self.domain_id
    }

    fn field_name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Input
    }

    fn value_at(&self, key: &Value) -> Value {
        self.erased_value_at(key)
    }

    fn stored_len(&self) -> usize {
        self.len()
    }

    fn visit_erased(&self, visitor: &mut dyn FnMut(&Value, &Value)) {
        for (key, value) in self.values.borrow().iter() {
            visitor(&Value::new(key.clone()), &Value::new(value.clone()));
        }
    }

    fn add_dependant(&self, id: FieldId, dependant: Weak<dyn ErasedComputed>) {
        self.register_dependant(id, dependant);
    }

    fn dependency_fields(&self) -> Vec<Rc<dyn ErasedField>> {
        Vec::new()
    }
}

/// A typed attribute of a domain: per-key storage for values of type `V`
/// keyed by the domain's key type `K`.
///
/// Handles are cheap to clone; all clones refer to the same storage.
pub struct Field<V: FieldValue, K: Key> {
    core: Rc<FieldCore<V, K>>,
}

impl<V: FieldValue, K: Key> Clone for Field<V, K> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<V: FieldValue, K: Key> Field<V, K> {
    pub(crate) fn from_core(core: Rc<FieldCore<V, K>>) -> Self {
        Self { core }
    }

    /// The field's name, unique within its domain.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Store `value` at `key`. The latest write wins; no history is kept.
    ///
    /// If computed fields depend on this field, the affected recalculations
    /// are determined immediately and compute tasks are enqueued; if
    /// subscribers exist, a publish task carrying `(key, value)` is
    /// enqueued. Neither kind of task runs until the graph's barrier calls.
    pub fn set_value(&self, key: K, value: V) {
        self.core.set_value(key, value);
    }

    /// The value stored at `key`, or `None`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.core.get(key)
    }

    /// Type-erased lookup: the value at the erased `key`, or the empty
    /// [`Value`] when absent.
    pub fn value(&self, key: &Value) -> Value {
        self.core.erased_value_at(key)
    }

    /// Number of keys with stored values.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Whether no key has been written yet.
    pub fn is_empty(&self) -> bool {
        self.core.len() == 0
    }

    /// Visit all `(key, value)` pairs in key order.
    ///
    /// The visitor must not write back into this field.
    pub fn visit(&self, visitor: impl FnMut(&K, &V)) {
        self.core.visit(visitor);
    }

    /// Register `callback` to be invoked from `publish()` for every write
    /// that happened while it was registered. Returns the cancellation
    /// guard; dropping the guard leaves the subscription in place.
    pub fn subscribe(&self, callback: impl Fn(&K, &V) + 'static) -> Subscription {
        self.core.subscribe(callback)
    }
}

/// Cancellation guard for one subscription.
///
/// [`cancel`](Self::cancel) consumes the guard, so a subscription cannot be
/// cancelled twice. A guard that is merely dropped leaves its subscription
/// registered.
pub struct Subscription {
    cancel: Box<dyn FnOnce()>,
}

impl Subscription {
    /// Remove the subscription this guard was issued for.
    ///
    /// # Panics
    ///
    /// Panics if the owning graph has been dropped.
    pub fn cancel(self) {
        (self.cancel)();
    }
}

/// An opaque reference to a field used when declaring computed-field
/// dependencies.
pub struct DependencyRef {
    pub(crate) field: Rc<dyn ErasedField>,
}

/// Anything that can be named as a dependency of a computed field: plain
/// fields, relation fields, and other computed fields.
pub trait Dependency {
    /// The erased reference the engine registers against.
    #[doc(hidden)]
    fn dependency(&self) -> DependencyRef;
}

/// A [`Dependency`] whose key and value types are statically known, which
/// is what [`Params`](crate::Params) needs for typed lookups.
pub trait TypedDependency: Dependency {
    /// Key type of the owning domain.
    type Key: Key;
    /// Value type produced by the field.
    type Value: FieldValue;
}

impl<V: FieldValue, K: Key> Dependency for Field<V, K> {
    fn dependency(&self) -> DependencyRef {
        DependencyRef {
            field: self.core.clone(),
        }
    }
}

impl<V: FieldValue, K: Key> TypedDependency for Field<V, K> {
    type Key = K;
    type Value = V;
}

/// Read-only type-erased handle to any field, as returned by the
/// introspection surface ([`Domain::fields`](crate::Domain::fields),
/// [`Domain::find_field`](crate::Domain::find_field), relation paths).
pub struct FieldRef {
    core: Rc<dyn ErasedField>,
}

impl Clone for FieldRef {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl FieldRef {
    pub(crate) fn from_erased(core: Rc<dyn ErasedField>) -> Self {
        Self { core }
    }

    /// The field's name.
    pub fn name(&self) -> &str {
        self.core.field_name()
    }

    /// Whether this is a computed field.
    pub fn is_computed(&self) -> bool {
        self.core.shape() == FieldShape::Computed
    }

    /// Whether this is a relation (foreign key) field.
    pub fn is_relation(&self) -> bool {
        self.core.shape() == FieldShape::Relation
    }

    /// Number of keys with stored values.
    pub fn len(&self) -> usize {
        self.core.stored_len()
    }

    /// Whether no key has been written yet.
    pub fn is_empty(&self) -> bool {
        self.core.stored_len() == 0
    }

    /// Type-erased lookup: the value at `key`, or the empty [`Value`].
    pub fn value(&self, key: &Value) -> Value {
        self.core.value_at(key)
    }

    /// Visit all pairs in key order, type-erased.
    pub fn visit(&self, mut visitor: impl FnMut(&Value, &Value)) {
        self.core.visit_erased(&mut visitor);
    }

    /// Dependency fields of a computed field; empty for other fields.
    pub fn dependencies(&self) -> Vec<FieldRef> {
        self.core
            .dependency_fields()
            .into_iter()
            .map(FieldRef::from_erased)
            .collect()
    }
}
