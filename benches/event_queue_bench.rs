//! Event queue throughput at increasing event counts.
//!
//! Run with: cargo bench --bench event_queue_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use schedsim::event::{priority, EventKind, EventQueue};
use schedsim::time::{Duration, TimePoint};
use std::cell::Cell;
use std::rc::Rc;

fn fill_queue(count: usize) -> Rc<std::cell::RefCell<EventQueue>> {
    let q = EventQueue::new();
    let counter = Rc::new(Cell::new(0u64));
    {
        let mut qb = q.borrow_mut();
        for i in 0..count {
            let t = TimePoint::ZERO + Duration::from_nanos(i as i64);
            let c = counter.clone();
            qb.schedule(t, priority::TIMER_DEFAULT, EventKind::Timer, Box::new(move || c.set(c.get() + 1))).unwrap();
        }
    }
    q
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue_drain");
    for count in [1_000, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("schedule_then_run", count), &count, |b, &count| {
            b.iter(|| {
                let q = fill_queue(count);
                EventQueue::run(black_box(&q));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_drain);
criterion_main!(benches);
