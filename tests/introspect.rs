//! Introspection: lookups, DOT emission, and the tracer event stream.

use std::rc::Rc;

use quiver::{EventLog, Graph, RecalcOutcome, TraceEvent};

#[test]
fn domains_and_fields_are_found_by_name() {
    let graph = Graph::new();
    let instrument = graph.add_domain::<String>("instrument");
    let trade = graph.add_domain::<u64>("trade");

    let last_px = instrument.create_field::<f64>("lastPx");
    instrument.create_field::<f64>("usdRate");
    let last_px_dep = last_px.clone();
    instrument.computed("doubledPx", &[&last_px], move |vals| {
        vals.value(&last_px_dep) * 2.0
    });
    trade.create_relation_to(&instrument);

    let names: Vec<String> = graph
        .domains()
        .iter()
        .map(|domain| domain.name().to_string())
        .collect();
    assert_eq!(names, vec!["instrument".to_string(), "trade".to_string()]);

    let found = graph.find_domain("instrument").unwrap();
    assert_eq!(found.name(), "instrument");
    assert!(graph.find_domain("missing").is_none());

    let field_names: Vec<String> = found
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();
    assert_eq!(
        field_names,
        vec![
            "lastPx".to_string(),
            "usdRate".to_string(),
            "doubledPx".to_string()
        ]
    );

    let computed = found.find_field("doubledPx").unwrap();
    assert!(computed.is_computed());
    assert!(!computed.is_relation());
    let dependency_names: Vec<String> = computed
        .dependencies()
        .iter()
        .map(|dep| dep.name().to_string())
        .collect();
    assert_eq!(dependency_names, vec!["lastPx".to_string()]);

    let relation = graph
        .find_domain("trade")
        .unwrap()
        .find_field("trade->instrument")
        .unwrap();
    assert!(relation.is_relation());
    assert!(!relation.is_computed());

    assert!(found.find_field("missing").is_none());
}

#[test]
fn dot_output_shapes_the_graph() {
    let graph = Graph::new();
    let instrument = graph.add_domain::<String>("instrument");
    let trade = graph.add_domain::<u64>("trade");

    let last_px = instrument.create_field::<f64>("lastPx");
    trade.create_relation_to(&instrument);
    let last_px_dep = last_px.clone();
    instrument.computed("doubledPx", &[&last_px], move |vals| {
        vals.value(&last_px_dep) * 2.0
    });

    let mut out = Vec::new();
    graph.to_dot(&mut out).unwrap();
    let dot = String::from_utf8(out).unwrap();

    assert!(dot.starts_with("digraph {"));
    assert!(dot.trim_end().ends_with('}'));
    assert!(dot.contains("subgraph cluster_instrument {"));
    assert!(dot.contains("subgraph cluster_trade {"));
    assert!(dot.contains("    \"lastPx\";"));
    assert!(dot.contains("    \"trade->instrument\";"));
    assert!(dot.contains("    \"doubledPx\" [shape=box];"));
    assert!(dot.contains("  \"lastPx\" -> \"doubledPx\";"));
}

#[test]
fn tracer_records_propagation_and_barrier_activity() {
    let log = Rc::new(EventLog::default());
    let graph = Graph::with_tracer(log.clone());

    let domain = graph.add_domain::<i32>("domain");
    let field1 = domain.create_field::<f64>("field1");
    let field2 = domain.create_field::<f64>("field2");

    let sum = {
        let (f1, f2) = (field1.clone(), field2.clone());
        domain.computed("sum", &[&field1, &field2], move |vals| {
            vals.value(&f1) + vals.value(&f2)
        })
    };
    let _subscription = sum.subscribe(|_key, _value| {});

    field1.set_value(1, 1.0);
    field2.set_value(1, 2.0);
    graph.compute();
    graph.publish();

    let events = log.take();

    assert!(events.contains(&TraceEvent::InputChanged {
        domain: "domain".to_string(),
        field: "field1".to_string(),
        key: "1".to_string(),
    }));
    assert!(events.contains(&TraceEvent::Recalculation {
        computed: "sum".to_string(),
        key: "1".to_string(),
        outcome: RecalcOutcome::ValueMissing,
    }));
    assert!(events.contains(&TraceEvent::Recalculation {
        computed: "sum".to_string(),
        key: "1".to_string(),
        outcome: RecalcOutcome::Enqueued,
    }));
    assert!(events.contains(&TraceEvent::ComputePass {
        domain: "domain".to_string(),
        tasks: 1,
    }));
    assert!(events.contains(&TraceEvent::PublishPass {
        domain: "domain".to_string(),
        tasks: 1,
    }));
}

#[test]
fn tracer_classifies_unresolvable_keys() {
    let log = Rc::new(EventLog::default());
    let graph = Graph::with_tracer(log.clone());

    let instrument = graph.add_domain::<String>("instrument");
    let trade = graph.add_domain::<u64>("trade");

    let last_px = instrument.create_field::<f64>("lastPx");
    let qty = trade.create_field::<u32>("qty");
    trade.create_relation_to(&instrument);

    let (px, qty_dep) = (last_px.clone(), qty.clone());
    trade.computed("notional", &[&qty, &last_px], move |vals| {
        f64::from(vals.value(&qty_dep)) * vals.value(&px)
    });

    // Path resolution happened during computed-field registration.
    assert!(log.events().contains(&TraceEvent::PathResolved {
        from: "trade".to_string(),
        to: "instrument".to_string(),
        hops: 1,
    }));
    log.take();

    // The relation carries no link for this trade, so the instrument key
    // cannot be resolved.
    qty.set_value(7, 10);
    assert!(log.events().contains(&TraceEvent::Recalculation {
        computed: "notional".to_string(),
        key: "7".to_string(),
        outcome: RecalcOutcome::KeyUnresolved,
    }));
}
