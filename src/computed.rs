//! Computed fields: per-key values derived by a pure calculation.
//!
//! A computed field stores produced values like any other field (so it can
//! be subscribed to and depended upon in turn), plus a fixed dependency set
//! and a boxed calculation over a [`Params`] lookup.
//!
//! Recalculation is a two-step affair. `recalculate` runs synchronously on
//! the writer's stack: it resolves a key in every dependency's domain
//! (directly for the owning domain, through the relation-path resolver
//! otherwise) and reads every dependency's value. If anything is missing
//! the attempt is abandoned without a trace in the queues; a later write
//! that completes the picture will trigger it again. Otherwise a compute
//! task capturing the fully resolved [`Params`] is enqueued, and the
//! graph's `compute()` barrier later runs the calculation and writes the
//! result back through the ordinary field path, cascading further.

use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::field::{Dependency, DependencyRef, ErasedField, FieldCore, FieldShape, Subscription, TypedDependency};
use crate::key::{DomainId, FieldId, FieldValue, Key};
use crate::tracer::RecalcOutcome;
use crate::value::Value;

/// Crate-internal surface of a computed field, as seen by the dependant
/// registries of the fields it depends on.
pub(crate) trait ErasedComputed {
    fn computed_domain_id(&self) -> DomainId;
    /// Attempt to re-evaluate at the erased `key`; returns whether a
    /// compute task was enqueued.
    fn recalculate(&self, key: &Value) -> bool;
}

/// Read-only lookup handed to a calculation.
///
/// Holds one resolved key per involved domain and one resolved value per
/// dependency field, captured at the moment the recalculation was
/// triggered.
pub struct Params {
    key_by_domain: AHashMap<DomainId, Value>,
    value_by_field: AHashMap<FieldId, Value>,
}

impl Params {
    /// The resolved value of dependency `field`.
    ///
    /// # Panics
    ///
    /// Panics if `field` is not a dependency of the calculation being
    /// evaluated, or on a value-type mismatch; both are structural bugs in
    /// the graph's configuration.
    pub fn value<D: TypedDependency>(&self, field: &D) -> D::Value {
        let dependency = field.dependency();
        let Some(raw) = self.value_by_field.get(&dependency.field.field_id()) else {
            panic!(
                "field `{}` is not a dependency of this calculation",
                dependency.field.field_name()
            );
        };
        raw.expect_ref::<D::Value>("dependency value").clone()
    }

    /// The key resolved in `field`'s owning domain.
    ///
    /// Available for the computed field's own domain and for every domain a
    /// dependency was resolved in through a relation path.
    ///
    /// # Panics
    ///
    /// Panics if no key was resolved for that domain, or on a key-type
    /// mismatch.
    pub fn key<D: TypedDependency>(&self, field: &D) -> D::Key {
        let dependency = field.dependency();
        let Some(raw) = self.key_by_domain.get(&dependency.field.field_domain_id()) else {
            panic!(
                "no key was resolved in the domain owning field `{}`",
                dependency.field.field_name()
            );
        };
        raw.expect_ref::<D::Key>("resolved domain key").clone()
    }
}

/// Shared body: the embedded field plus the dependency set and calculation.
pub(crate) struct ComputedCore<V: FieldValue, K: Key> {
    base: Rc<FieldCore<V, K>>,
    dependencies: Vec<Rc<dyn ErasedField>>,
    calc: Box<dyn Fn(&Params) -> V>,
    this: Weak<ComputedCore<V, K>>,
}

impl<V: FieldValue, K: Key> ComputedCore<V, K> {
    pub(crate) fn new(
        base: Rc<FieldCore<V, K>>,
        dependencies: Vec<Rc<dyn ErasedField>>,
        calc: Box<dyn Fn(&Params) -> V>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            base,
            dependencies,
            calc,
            this: this.clone(),
        })
    }

    pub(crate) fn base(&self) -> &Rc<FieldCore<V, K>> {
        &self.base
    }

    pub(crate) fn dependencies(&self) -> &[Rc<dyn ErasedField>] {
        &self.dependencies
    }
}

impl<V: FieldValue, K: Key> ErasedComputed for ComputedCore<V, K> {
    fn computed_domain_id(&self) -> DomainId {
        self.base.domain_id()
    }

    fn recalculate(&self, key: &Value) -> bool {
        let Some(domain) = self.base.domain() else {
            return false;
        };
        let tracer = domain.tracer();

        let mut key_by_domain = AHashMap::new();
        key_by_domain.insert(self.base.domain_id(), key.clone());
        let mut value_by_field = AHashMap::new();

        for dependency in &self.dependencies {
            let dependency_domain = dependency.field_domain_id();

            // Resolve the dependency's key: the owning domain's key applies
            // directly; any other domain is reached through the relation
            // path, and the resolved key is recorded so further
            // dependencies in that domain reuse it.
            let dependency_key = match key_by_domain.get(&dependency_domain) {
                Some(resolved) => resolved.clone(),
                None => {
                    let resolved = domain.related_key(key, dependency_domain);
                    if resolved.is_empty() {
                        tracer.on_recalculation(self.base.name(), key, RecalcOutcome::KeyUnresolved);
                        return false;
                    }
                    key_by_domain.insert(dependency_domain, resolved.clone());
                    resolved
                }
            };

            let dependency_value = dependency.value_at(&dependency_key);
            if dependency_value.is_empty() {
                tracer.on_recalculation(self.base.name(), key, RecalcOutcome::ValueMissing);
                return false;
            }

            let previous = value_by_field.insert(dependency.field_id(), dependency_value);
            debug_assert!(previous.is_none(), "dependency resolved twice");
        }

        tracer.on_recalculation(self.base.name(), key, RecalcOutcome::Enqueued);

        let this = self.this.clone();
        let key = key.expect_ref::<K>("recalculation key").clone();
        domain.push_compute_task(Box::new(move || {
            let Some(computed) = this.upgrade() else {
                return;
            };
            let params = Params {
                key_by_domain,
                value_by_field,
            };
            let result = (computed.calc)(&params);
            computed.base.set_value(key, result);
        }));
        true
    }
}

impl<V: FieldValue, K: Key> ErasedField for ComputedCore<V, K> {
    fn field_id(&self) -> FieldId {
        self.base.id()
    }

    fn field_domain_id(&self) -> DomainId {
        self.base.domain_id()
    }

    fn field_name(&self) -> &str {
        self.base.name()
    }

    fn shape(&self) -> FieldShape {
        FieldShape::Computed
    }

    fn value_at(&self, key: &Value) -> Value {
        self.base.erased_value_at(key)
    }

    fn stored_len(&self) -> usize {
        self.base.len()
    }

    fn visit_erased(&self, visitor: &mut dyn FnMut(&Value, &Value)) {
        self.base.visit(|key, value| {
            visitor(&Value::new(key.clone()), &Value::new(value.clone()));
        });
    }

    fn add_dependant(&self, id: FieldId, dependant: Weak<dyn ErasedComputed>) {
        self.base.register_dependant(id, dependant);
    }

    fn dependency_fields(&self) -> Vec<Rc<dyn ErasedField>> {
        self.dependencies.clone()
    }
}

/// A field whose per-key value is derived by a pure calculation over other
/// fields. Results are written by the graph's compute barrier; the public
/// handle is read-only.
pub struct ComputedField<V: FieldValue, K: Key> {
    core: Rc<ComputedCore<V, K>>,
}

impl<V: FieldValue, K: Key> Clone for ComputedField<V, K> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<V: FieldValue, K: Key> ComputedField<V, K> {
    pub(crate) fn from_core(core: Rc<ComputedCore<V, K>>) -> Self {
        Self { core }
    }

    /// The field's name.
    pub fn name(&self) -> &str {
        self.core.base().name()
    }

    /// The derived value at `key`, or `None` if it has not been computed.
    pub fn get(&self, key: &K) -> Option<V> {
        self.core.base().get(key)
    }

    /// Type-erased lookup.
    pub fn value(&self, key: &Value) -> Value {
        self.core.base().erased_value_at(key)
    }

    /// Number of keys with computed values.
    pub fn len(&self) -> usize {
        self.core.base().len()
    }

    /// Whether nothing has been computed yet.
    pub fn is_empty(&self) -> bool {
        self.core.base().len() == 0
    }

    /// Visit all computed `(key, value)` pairs in key order.
    pub fn visit(&self, visitor: impl FnMut(&K, &V)) {
        self.core.base().visit(visitor);
    }

    /// Subscribe to computed results. See [`Field::subscribe`](crate::Field::subscribe).
    pub fn subscribe(&self, callback: impl Fn(&K, &V) + 'static) -> Subscription {
        self.core.base().subscribe(callback)
    }

    /// The fields this calculation reads, in declaration order.
    pub fn dependencies(&self) -> Vec<crate::field::FieldRef> {
        self.core
            .dependencies()
            .iter()
            .cloned()
            .map(crate::field::FieldRef::from_erased)
            .collect()
    }
}

impl<V: FieldValue, K: Key> Dependency for ComputedField<V, K> {
    fn dependency(&self) -> DependencyRef {
        DependencyRef {
            field: self.core.clone(),
        }
    }
}

impl<V: FieldValue, K: Key> TypedDependency for ComputedField<V, K> {
    type Key = K;
    type Value = V;
}
