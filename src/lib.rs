//! Quiver: an in-process reactive computation graph for keyed tabular data.
//!
//! Applications declare *domains* (entity types, each indexed by its own key
//! type), *fields* (per-key attributes), *relations* (foreign keys into
//! other domains, with reverse indices), and *computed fields* (pure
//! functions of other fields, resolved through relations where needed).
//! Raw values are pushed in with `set_value`; a two-phase barrier then
//! advances the graph: [`Graph::compute`] drains the pending
//! recalculations, [`Graph::publish`] drains subscriber notifications.
//!
//! # Key properties
//!
//! - **Typed handles, erased core**: fields are strongly typed at the API
//!   surface; cross-type pathways (key resolution, propagation,
//!   visitation) run over type-erased [`Value`] cells.
//! - **Relation-aware dependencies**: a computed field may depend on fields
//!   of other domains; keys are resolved through foreign-key chains, and
//!   establishing a link itself triggers recomputation.
//! - **Deterministic waves**: each `compute()` call drains every domain
//!   exactly once in declaration order; cascaded work waits for the next
//!   call. Final values are independent of write order.
//! - **Single-threaded**: cooperative, non-blocking, `Rc`-based; no
//!   internal threads.
//!
//! # Example
//!
//! ```
//! use quiver::Graph;
//!
//! let graph = Graph::new();
//! let instrument = graph.add_domain::<String>("instrument");
//! let price = instrument.create_field::<f64>("price");
//! let quantity = instrument.create_field::<f64>("quantity");
//!
//! let (price_dep, quantity_dep) = (price.clone(), quantity.clone());
//! let exposure = instrument.computed("exposure", &[&price, &quantity], move |params| {
//!     params.value(&price_dep) * params.value(&quantity_dep)
//! });
//!
//! price.set_value("ACME".to_string(), 101.5);
//! quantity.set_value("ACME".to_string(), 200.0);
//! assert!(graph.is_compute_required());
//!
//! graph.compute();
//! graph.publish();
//!
//! assert_eq!(exposure.get(&"ACME".to_string()), Some(20_300.0));
//! ```

mod computed;
mod domain;
mod dot;
mod error;
mod field;
mod graph;
mod key;
mod relation;
pub mod tracer;
mod value;

pub use computed::{ComputedField, Params};
pub use domain::{Domain, DomainHandle};
pub use error::TypeMismatch;
pub use field::{Dependency, DependencyRef, Field, FieldRef, Subscription, TypedDependency};
pub use graph::{DomainRef, Graph};
pub use key::{DomainId, FieldId, FieldValue, Key, SubscriptionId};
pub use relation::RelationField;
pub use tracer::{EventLog, NoopTracer, RecalcOutcome, TraceEvent, Tracer};
pub use value::Value;
