//! Relation (foreign key) fields.
//!
//! A relation field is a field whose value type is a key in a remote
//! domain. On top of the ordinary forward map (local key to remote key) it
//! maintains a reverse index from remote keys to every local key that was
//! ever linked there, which is what propagation walks when a write in the
//! remote domain must fan out to dependants in the local one. Reverse
//! entries accumulate; links are never removed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::computed::ErasedComputed;
use crate::domain::{DomainCore, ErasedDomain};
use crate::field::{Dependency, DependencyRef, ErasedField, FieldCore, FieldShape, Subscription, TypedDependency};
use crate::graph::DomainRef;
use crate::key::{DomainId, FieldId, Key};
use crate::value::Value;

/// Crate-internal surface of a relation field: what path resolution and
/// reverse propagation need, independent of the concrete key types.
pub(crate) trait ErasedRelation {
    fn remote_domain_id(&self) -> DomainId;
    /// Forward lookup: the remote key linked from the erased local `key`,
    /// or the empty [`Value`].
    fn forward_key(&self, key: &Value) -> Value;
    /// Reverse lookup: every local key linked to the erased `remote_key`.
    fn local_keys(&self, remote_key: &Value) -> Vec<Value>;
    fn add_dependant(&self, id: FieldId, dependant: Weak<dyn ErasedComputed>);
}

/// A relation field together with its type-erased field view. Relation
/// paths and foreign-key lists carry both coercions of the one body.
pub(crate) struct RelationRef {
    pub(crate) erased: Rc<dyn ErasedRelation>,
    pub(crate) field: Rc<dyn ErasedField>,
}

impl Clone for RelationRef {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            field: self.field.clone(),
        }
    }
}

/// Shared body: the embedded field (forward map, subscribers, dependants)
/// plus the remote domain and the reverse index.
pub(crate) struct RelationCore<K: Key, R: Key> {
    base: Rc<FieldCore<R, K>>,
    remote_id: DomainId,
    remote: Weak<dyn ErasedDomain>,
    reverse: RefCell<BTreeMap<R, Vec<K>>>,
}

impl<K: Key, R: Key> RelationCore<K, R> {
    pub(crate) fn new(
        id: FieldId,
        name: String,
        domain_id: DomainId,
        domain: Weak<DomainCore<K>>,
        remote_id: DomainId,
        remote: Weak<dyn ErasedDomain>,
    ) -> Rc<Self> {
        Rc::new(Self {
            base: FieldCore::new(id, name, domain_id, domain),
            remote_id,
            remote,
            reverse: RefCell::new(BTreeMap::new()),
        })
    }

    /// Link `key` to `remote_key`: the ordinary field write first (which
    /// propagates to dependants and subscribers), then the reverse-index
    /// insertion. Re-linking a key leaves the old reverse entry in place.
    pub(crate) fn set_value(&self, key: K, remote_key: R) {
        self.base.set_value(key.clone(), remote_key.clone());
        self.reverse.borrow_mut().entry(remote_key).or_default().push(key);
    }

    pub(crate) fn local_keys_for(&self, remote_key: &R) -> Vec<K> {
        self.reverse
            .borrow()
            .get(remote_key)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn base(&self) -> &Rc<FieldCore<R, K>> {
        &self.base
    }
}

impl<K: Key, R: Key> ErasedRelation for RelationCore<K, R> {
    fn remote_domain_id(&self) -> DomainId {
        self.remote_id
    }

    fn forward_key(&self, key: &Value) -> Value {
        self.base.erased_value_at(key)
    }

    fn local_keys(&self, remote_key: &Value) -> Vec<Value> {
        let remote_key = remote_key.expect_ref::<R>("reverse relation lookup");
        self.local_keys_for(remote_key)
            .into_iter()
            .map(Value::new)
            .collect()
    }

    fn add_dependant(&self, id: FieldId, dependant: Weak<dyn ErasedComputed>) {
        self.base.register_dependant(id, dependant);
    }
}

impl<K: Key, R: Key> ErasedField for RelationCore<K, R> {
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
        FieldShape::Relation
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
        Vec::new()
    }
}

/// A foreign key from this domain into a remote one.
///
/// Behaves as an ordinary field of remote keys (it can be depended upon,
/// subscribed to, and read), and additionally answers reverse lookups.
pub struct RelationField<K: Key, R: Key> {
    core: Rc<RelationCore<K, R>>,
}

impl<K: Key, R: Key> Clone for RelationField<K, R> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<K: Key, R: Key> RelationField<K, R> {
    pub(crate) fn from_core(core: Rc<RelationCore<K, R>>) -> Self {
        Self { core }
    }

    /// The relation's name, `"<local>-><remote>"` by construction.
    pub fn name(&self) -> &str {
        self.core.base().name()
    }

    /// Link `key` to `remote_key`.
    ///
    /// Establishing a link is itself an input change: computed fields that
    /// resolve dependencies through this relation are re-evaluated, which
    /// is how a dependency set that only becomes resolvable once the link
    /// exists eventually fires.
    pub fn set_value(&self, key: K, remote_key: R) {
        self.core.set_value(key, remote_key);
    }

    /// The remote key linked from `key`, or `None`.
    pub fn get(&self, key: &K) -> Option<R> {
        self.core.base().get(key)
    }

    /// Type-erased forward lookup.
    pub fn value(&self, key: &Value) -> Value {
        self.core.base().erased_value_at(key)
    }

    /// Every local key that was ever linked to `remote_key`, in link order
    /// per key. Possibly empty; duplicates are preserved.
    pub fn local_keys_for(&self, remote_key: &R) -> Vec<K> {
        self.core.local_keys_for(remote_key)
    }

    /// The domain this relation points into.
    ///
    /// # Panics
    ///
    /// Panics if the owning graph has been dropped.
    pub fn remote_domain(&self) -> DomainRef {
        let Some(remote) = self.core.remote.upgrade() else {
            panic!("remote domain queried after its graph was dropped");
        };
        DomainRef::from_erased(remote)
    }

    /// Number of linked local keys.
    pub fn len(&self) -> usize {
        self.core.base().len()
    }

    /// Whether no link has been established yet.
    pub fn is_empty(&self) -> bool {
        self.core.base().len() == 0
    }

    /// Visit all `(local key, remote key)` pairs in local-key order.
    pub fn visit(&self, visitor: impl FnMut(&K, &R)) {
        self.core.base().visit(visitor);
    }

    /// Subscribe to link writes. See [`Field::subscribe`](crate::Field::subscribe).
    pub fn subscribe(&self, callback: impl Fn(&K, &R) + 'static) -> Subscription {
        self.core.base().subscribe(callback)
    }
}

impl<K: Key, R: Key> Dependency for RelationField<K, R> {
    fn dependency(&self) -> DependencyRef {
        DependencyRef {
            field: self.core.clone(),
        }
    }
}

impl<K: Key, R: Key> TypedDependency for RelationField<K, R> {
    type Key = K;
    type Value = R;
}
