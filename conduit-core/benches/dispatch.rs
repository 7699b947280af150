//! Benchmark: dispatch and notification fan-out

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use conduit_core::{use_selector, Action, ForceUpdateHandle, Provider, Store, Unsubscribe};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

fn counter(state: Option<Rc<u64>>, action: &Action) -> Rc<u64> {
    match action.kind_str() {
        Some("INC") => Rc::new(state.map_or(0, |s| *s) + 1),
        _ => state.unwrap_or_else(|| Rc::new(0)),
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for listeners in [0usize, 10, 100, 1000] {
        let store = Store::new(counter);
        let hits = Rc::new(Cell::new(0u64));
        let _handles: Vec<Unsubscribe> = (0..listeners)
            .map(|_| {
                let hits = hits.clone();
                store.subscribe(move || hits.set(hits.get() + 1)).unwrap()
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("listeners", listeners), &listeners, |b, _| {
            b.iter(|| black_box(store.dispatch(json!({ "type": "INC" })).unwrap()));
        });
    }

    group.finish();
}

fn bench_selector_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_fan_out");

    for instances in [10usize, 100, 1000] {
        let store = Store::new(counter);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();

        let renders = Rc::new(Cell::new(0u64));
        let selections: Vec<_> = (0..instances)
            .map(|i| {
                let renders = renders.clone();
                let force: ForceUpdateHandle = Rc::new(move || renders.set(renders.get() + 1));
                // Only every tenth selection changes on each dispatch.
                let instance = use_selector(
                    &provider.context(),
                    move |count: &u64| if i % 10 == 0 { *count } else { 0 },
                    force,
                );
                let selection = instance.render().unwrap();
                instance.commit_layout(selection).unwrap();
                instance.attach().unwrap();
                instance
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("instances", instances), &instances, |b, _| {
            b.iter(|| black_box(store.dispatch(json!({ "type": "INC" })).unwrap()));
        });

        drop(selections);
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_selector_fan_out);
criterion_main!(benches);
