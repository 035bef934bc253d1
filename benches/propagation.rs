//! Benchmark: one price write fanning out to N trades through a relation,
//! then a full compute/publish barrier.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use quiver::Graph;

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_barrier");

    for &trades in &[16u64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(trades), &trades, |b, &trades| {
            let graph = Graph::new();
            let instrument = graph.add_domain::<String>("instrument");
            let trade = graph.add_domain::<u64>("trade");

            let last_px = instrument.create_field::<f64>("lastPx");
            let qty = trade.create_field::<u32>("qty");
            let trade_instrument = trade.create_relation_to(&instrument);

            let (px, qty_dep) = (last_px.clone(), qty.clone());
            let _notional = trade.computed("notional", &[&qty, &last_px], move |vals| {
                f64::from(vals.value(&qty_dep)) * vals.value(&px)
            });

            for id in 0..trades {
                qty.set_value(id, id as u32 + 1);
                trade_instrument.set_value(id, "ACME".to_string());
            }
            graph.compute();
            graph.publish();

            let mut price = 100.0;
            b.iter(|| {
                price += 1.0;
                last_px.set_value("ACME".to_string(), black_box(price));
                graph.compute();
                graph.publish();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out);
criterion_main!(benches);
