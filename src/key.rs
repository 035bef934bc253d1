//! Bound aliases for domain keys and field values, and stable id types.

use std::fmt::Debug;

/// Trait for domain key types.
///
/// Keys must be totally ordered (per-key storage is an ordered map),
/// cloneable, and debuggable. The engine is single-threaded, so no
/// `Send`/`Sync` bounds are required.
pub trait Key: Ord + Clone + Debug + 'static {}

// Blanket implementation for all types that satisfy the bounds
impl<T> Key for T where T: Ord + Clone + Debug + 'static {}

/// Trait for field value types.
///
/// Values need partial ordering and equality so that type-erased [`Value`]
/// cells can be compared, plus cloning for extraction. Every [`Key`] type
/// qualifies as a field value, which is what lets relation fields store
/// remote keys as ordinary values.
///
/// [`Value`]: crate::Value
pub trait FieldValue: PartialOrd + Clone + Debug + 'static {}

impl<T> FieldValue for T where T: PartialOrd + Clone + Debug + 'static {}

/// Stable identifier of a domain within its graph.
///
/// Assigned in declaration order; the barrier visits domains in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainId(pub(crate) u32);

/// Stable identifier of a field, unique across the whole graph.
///
/// Dependant registries and calculation parameter tables are keyed by
/// `FieldId`, so computed fields can be referenced without owning them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId(pub(crate) u64);

/// Identifier of a single subscription on a field.
///
/// Issued from a per-field monotonically increasing counter; cancellation
/// removes exactly the registration carrying this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub(crate) u64);
