//! Criterion benchmarks for registry churn, ordered iteration, and queries.
//!
//! Entity populations are generated from a seeded PCG so every run measures
//! the same component mix.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nomai_ec::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

struct Position(f32, f32);
impl Component for Position {}

struct Velocity(f32, f32);
impl Component for Velocity {
    fn priority(&self) -> i32 {
        -10
    }
}

struct Sleeping;
impl Component for Sleeping {}

struct Layer(i32);
impl Component for Layer {
    fn priority(&self) -> i32 {
        self.0
    }
}

fn populate(count: usize) -> EntitySet {
    let mut rng = Pcg32::seed_from_u64(0x5eed);
    let mut set = EntitySet::new();
    for _ in 0..count {
        let e = set.spawn();
        e.add(|| Position(rng.gen(), rng.gen())).unwrap();
        if rng.gen_bool(0.6) {
            e.add(|| Velocity(rng.gen(), rng.gen())).unwrap();
        }
        if rng.gen_bool(0.2) {
            e.add(|| Sleeping).unwrap();
        }
        let layer = rng.gen_range(-5..5);
        e.add(|| Layer(layer)).unwrap();
    }
    set
}

fn bench_add_remove(c: &mut Criterion) {
    let entity = Entity::new();
    c.bench_function("add_remove_cycle", |b| {
        b.iter(|| {
            entity.add(|| Velocity(1.0, 1.0)).unwrap();
            black_box(entity.remove::<Velocity>());
        })
    });
}

fn bench_ordered_iteration(c: &mut Criterion) {
    let set = populate(1_000);
    c.bench_function("for_each_1000_entities", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for e in &set {
                e.components().for_each(|comp| sum += comp.priority() as i64);
            }
            black_box(sum)
        })
    });
}

fn bench_queries(c: &mut Criterion) {
    let set = populate(1_000);
    c.bench_function("query_with_without_1000", |b| {
        b.iter(|| {
            black_box(
                set.query()
                    .with_all::<(Position, Velocity)>()
                    .without::<Sleeping>()
                    .count(),
            )
        })
    });
    c.bench_function("query_with_where_1000", |b| {
        b.iter(|| {
            black_box(
                set.query()
                    .with_where::<Position>(|p| p.0 > 0.5 && p.1 < 0.5)
                    .all()
                    .len(),
            )
        })
    });
}

criterion_group!(benches, bench_add_remove, bench_ordered_iteration, bench_queries);
criterion_main!(benches);
