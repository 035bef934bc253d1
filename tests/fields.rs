//! Field storage, observation, and subscription lifecycle.

use std::cell::Cell;
use std::cell::RefCell;
use std::rc::Rc;

use quiver::{Graph, Value};

#[test]
fn set_value_and_find() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    assert_eq!(field.get(&1), None);
    assert_eq!(field.len(), 0);
    assert!(field.is_empty());

    field.set_value(1, 0.1);

    assert_eq!(field.get(&1), Some(0.1));
    assert_eq!(field.get(&2), None);
    assert_eq!(field.len(), 1);

    let erased = field.value(&Value::new(1));
    assert!(!erased.is_empty());
    assert!(erased.is::<f64>());
    assert_eq!(erased.extract::<f64>(), 0.1);

    assert!(field.value(&Value::new(2)).is_empty());
}

#[test]
fn repeated_writes_keep_the_last_value() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    field.set_value(1, 0.1);
    field.set_value(1, 0.2);
    field.set_value(1, 0.3);

    assert_eq!(field.len(), 1);
    assert_eq!(field.get(&1), Some(0.3));
}

#[test]
fn observer_is_notified_only_by_publish() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    let observed = Rc::new(RefCell::new(Vec::new()));
    let _subscription = field.subscribe({
        let observed = observed.clone();
        move |key: &i32, value: &f64| observed.borrow_mut().push((*key, *value))
    });

    field.set_value(123, 1.1);

    // The value is readable immediately, but observers wait for publish.
    assert_eq!(field.get(&123), Some(1.1));
    assert!(observed.borrow().is_empty());
    assert!(!graph.is_compute_required());
    assert!(graph.is_publish_required());

    graph.compute();

    assert_eq!(field.get(&123), Some(1.1));
    assert!(observed.borrow().is_empty());
    assert!(!graph.is_compute_required());
    assert!(graph.is_publish_required());

    graph.publish();

    assert_eq!(observed.borrow().as_slice(), &[(123, 1.1)]);
    assert!(!graph.is_compute_required());
    assert!(!graph.is_publish_required());
}

#[test]
fn writes_without_dependants_or_observers_enqueue_nothing() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    field.set_value(1, 1.0);

    assert!(!graph.is_compute_required());
    assert!(!graph.is_publish_required());
}

#[test]
fn cancelled_subscription_is_not_notified() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    let first_calls = Rc::new(Cell::new(0));
    let second_calls = Rc::new(Cell::new(0));

    let first = field.subscribe({
        let calls = first_calls.clone();
        move |_key, _value| calls.set(calls.get() + 1)
    });
    let _second = field.subscribe({
        let calls = second_calls.clone();
        move |_key, _value| calls.set(calls.get() + 1)
    });

    field.set_value(1, 2.0);

    // Cancelling between the write and the publish still suppresses the
    // notification: publish walks the registry as it is at drain time.
    first.cancel();
    graph.publish();

    assert_eq!(first_calls.get(), 0);
    assert_eq!(second_calls.get(), 1);
}

#[test]
fn subscriber_registered_after_a_write_misses_it() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    field.set_value(1, 1.0);
    assert!(!graph.is_publish_required());

    let calls = Rc::new(Cell::new(0));
    let _subscription = field.subscribe({
        let calls = calls.clone();
        move |_key, _value| calls.set(calls.get() + 1)
    });

    graph.publish();
    assert_eq!(calls.get(), 0);

    field.set_value(1, 2.0);
    graph.publish();
    assert_eq!(calls.get(), 1);
}

#[test]
fn visit_iterates_in_key_order() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<String>("field");

    field.set_value(3, "c".to_string());
    field.set_value(1, "a".to_string());
    field.set_value(2, "b".to_string());

    let mut seen = Vec::new();
    field.visit(|key, value| seen.push((*key, value.clone())));

    assert_eq!(
        seen,
        vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, "c".to_string())
        ]
    );
}

#[test]
fn publish_carries_the_value_captured_at_write_time() {
    let graph = Graph::new();
    let domain = graph.add_domain::<i32>("domain");
    let field = domain.create_field::<f64>("field");

    let observed = Rc::new(RefCell::new(Vec::new()));
    let _subscription = field.subscribe({
        let observed = observed.clone();
        move |key: &i32, value: &f64| observed.borrow_mut().push((*key, *value))
    });

    field.set_value(1, 1.0);
    field.set_value(1, 2.0);
    graph.publish();

    // One notification per write, each with the value written at the time.
    assert_eq!(observed.borrow().as_slice(), &[(1, 1.0), (1, 2.0)]);
}
