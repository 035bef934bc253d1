//! Property: the final computed values are independent of the order in
//! which writes land, provided they all land before the barrier runs.

use proptest::prelude::*;

use quiver::Graph;

/// One write per (target, key) pair: target 0 writes `qty`, 1 writes
/// `price`, 2 links the order to product `value mod 2`.
type Write = (u8, i32, i32);

fn final_totals(writes: &[Write]) -> Vec<(i32, i64)> {
    let graph = Graph::new();
    let orders = graph.add_domain::<i32>("orders");
    let products = graph.add_domain::<i32>("products");

    let qty = orders.create_field::<i32>("qty");
    let price = products.create_field::<i32>("price");
    let order_product = orders.create_relation_to(&products);

    let total = {
        let (qty_dep, price_dep) = (qty.clone(), price.clone());
        orders.computed("total", &[&qty, &price], move |vals| {
            i64::from(vals.value(&qty_dep)) * i64::from(vals.value(&price_dep))
        })
    };

    for &(target, key, value) in writes {
        match target {
            0 => qty.set_value(key, value),
            1 => price.set_value(key, value),
            _ => order_product.set_value(key, value.rem_euclid(2)),
        }
    }

    let mut waves = 0;
    while graph.is_compute_required() {
        graph.compute();
        waves += 1;
        assert!(waves < 32, "compute did not quiesce");
    }

    let mut totals = Vec::new();
    total.visit(|key, value| totals.push((*key, *value)));
    totals
}

proptest! {
    #[test]
    fn totals_are_order_independent(
        entries in prop::collection::btree_map((0..3u8, 0..4i32), -100..100i32, 1..10)
    ) {
        let forward: Vec<Write> = entries
            .iter()
            .map(|(&(target, key), &value)| (target, key, value))
            .collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        prop_assert_eq!(final_totals(&forward), final_totals(&reversed));
    }
}
