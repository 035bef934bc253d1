//! Dynamically typed value cells.
//!
//! Fields of heterogeneous types share type-erased pathways for key
//! resolution and visitation, so keys and values travel through the engine
//! as [`Value`]s: cheaply cloneable cells that carry any admissible type
//! (or nothing) and support type-safe extraction.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::TypeMismatch;
use crate::key::FieldValue;

/// Object-safe view of a contained scalar: downcast access plus equality,
/// ordering, and formatting forwarded to the concrete type.
trait AnyScalar: 'static {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn AnyScalar) -> bool;
    fn dyn_partial_cmp(&self, other: &dyn AnyScalar) -> Option<Ordering>;
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn dyn_type_name(&self) -> &'static str;
}

impl<T: PartialOrd + fmt::Debug + 'static> AnyScalar for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn AnyScalar) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn dyn_partial_cmp(&self, other: &dyn AnyScalar) -> Option<Ordering> {
        other
            .as_any()
            .downcast_ref::<T>()
            .and_then(|other| self.partial_cmp(other))
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn dyn_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A dynamically typed carrier of a single key or field value.
///
/// Cloning is cheap (the contents live behind an `Rc`). The empty state is
/// the engine's "absent" sentinel: type-erased reads of a missing key
/// return `Value::empty()` rather than an error.
///
/// Two values compare equal when they hold the same type and the contained
/// values compare equal; differently typed values are unequal and unordered.
#[derive(Clone, Default)]
pub struct Value {
    cell: Option<Rc<dyn AnyScalar>>,
}

impl Value {
    /// Wrap a value.
    pub fn new<T: FieldValue>(value: T) -> Self {
        Self {
            cell: Some(Rc::new(value)),
        }
    }

    /// The empty sentinel.
    pub fn empty() -> Self {
        Self { cell: None }
    }

    /// Whether this cell carries no value.
    pub fn is_empty(&self) -> bool {
        self.cell.is_none()
    }

    /// Whether the contained value is a `T`. False for the empty cell.
    pub fn is<T: 'static>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Borrow the contained value as a `T`, if the cell holds one.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.cell.as_ref()?.as_any().downcast_ref()
    }

    /// Clone the contained value out as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TypeMismatch`] when the cell is empty or holds another type.
    pub fn try_extract<T: FieldValue>(&self) -> Result<T, TypeMismatch> {
        self.get::<T>().cloned().ok_or_else(|| TypeMismatch {
            expected: std::any::type_name::<T>(),
            found: self.type_name(),
        })
    }

    /// Clone the contained value out as a `T`.
    ///
    /// # Panics
    ///
    /// Panics when the cell is empty or holds another type. Use
    /// [`try_extract`](Self::try_extract) where the mismatch should be
    /// handled instead of treated as a structural bug.
    pub fn extract<T: FieldValue>(&self) -> T {
        match self.try_extract() {
            Ok(value) => value,
            Err(mismatch) => panic!("{mismatch}"),
        }
    }

    /// Name of the contained type, or `None` for the empty cell.
    pub fn type_name(&self) -> Option<&'static str> {
        self.cell.as_ref().map(|cell| cell.dyn_type_name())
    }

    /// Borrow the contained value, panicking with `context` on absence or
    /// mismatch. Internal contract paths only.
    pub(crate) fn expect_ref<T: 'static>(&self, context: &str) -> &T {
        match self.get::<T>() {
            Some(value) => value,
            None => {
                let mismatch = TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    found: self.type_name(),
                };
                panic!("{context}: {mismatch}");
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.cell, &other.cell) {
            (None, None) => true,
            (Some(a), Some(b)) => a.dyn_eq(b.as_ref()),
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (&self.cell, &other.cell) {
            (None, None) => Some(Ordering::Equal),
            (Some(a), Some(b)) => a.dyn_partial_cmp(b.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            Some(cell) => cell.dyn_fmt(f),
            None => write!(f, "<empty>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_round_trip() {
        let value = Value::new(0.25f64);
        assert!(!value.is_empty());
        assert!(value.is::<f64>());
        assert!(!value.is::<i32>());
        assert_eq!(value.get::<f64>(), Some(&0.25));
        assert_eq!(value.extract::<f64>(), 0.25);
    }

    #[test]
    fn empty_sentinel() {
        let value = Value::empty();
        assert!(value.is_empty());
        assert_eq!(value.get::<f64>(), None);
        assert_eq!(value.type_name(), None);
        assert_eq!(value, Value::empty());
    }

    #[test]
    fn mismatch_reports_both_types() {
        let value = Value::new(1i32);
        let err = value.try_extract::<String>().unwrap_err();
        assert_eq!(err.expected, std::any::type_name::<String>());
        assert_eq!(err.found, Some(std::any::type_name::<i32>()));
        assert!(err.to_string().contains("expected"));
    }

    #[test]
    fn cross_type_comparison() {
        assert_ne!(Value::new(1i32), Value::new(1i64));
        assert_eq!(Value::new("a".to_string()), Value::new("a".to_string()));
        assert!(Value::new(1.0f64) < Value::new(2.0f64));
        assert_eq!(Value::new(1i32).partial_cmp(&Value::new(1.0f64)), None);
    }
}
