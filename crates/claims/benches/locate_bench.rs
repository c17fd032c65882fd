//! Criterion benchmark: point-to-claim resolution over large claim sets.
//!
//! Compares the data store's native lookup with the brute-force scan, and
//! measures id lookup through the whole hierarchy. Each top-level claim holds
//! two subdivisions, one of which is nested once more.
//!
//! Run with: cargo bench -p claims --bench locate_bench --features bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use claims::test_harness::{ClaimSpec, ForkProfile, TestHost};

const CLAIM_SIZE: i64 = 40;
const SPACING: i64 = 64;

/// A square grid of `count` top-level claims with nested subdivisions.
fn claim_grid(count: usize) -> Vec<ClaimSpec> {
    let side = (count as f64).sqrt().ceil() as i64;
    (0..count as i64)
        .map(|i| {
            let x = (i % side) * SPACING;
            let z = (i / side) * SPACING;
            let id = i * 10;
            ClaimSpec::column(id, x, z, x + CLAIM_SIZE, z + CLAIM_SIZE)
                .child(ClaimSpec::column(id + 1, x + 2, z + 2, x + 10, z + 10))
                .child(
                    ClaimSpec::column(id + 2, x + 20, z + 20, x + 35, z + 35)
                        .child(ClaimSpec::new(id + 3, (x + 25, 64, z + 25), (x + 25, 64, z + 25))),
                )
        })
        .collect()
}

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate");
    for count in [100usize, 1_000, 5_000] {
        let side = (count as f64).sqrt().ceil() as i64;
        // Deepest subdivision of the last claim in the grid.
        let last = count as i64 - 1;
        let x = (last % side) * SPACING + 25;
        let z = (last / side) * SPACING + 25;

        for (label, fork) in [("native", ForkProfile::legacy()), ("scan", ForkProfile::bare())] {
            let mut host = TestHost::new(fork).with_claims(claim_grid(count));
            let bridge = host.bridge();
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, _| {
                b.iter(|| black_box(bridge.locate("world", x as f64, 64.0, z as f64)))
            });
        }
    }
    group.finish();
}

fn bench_find_by_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_by_id");
    for count in [100usize, 1_000, 5_000] {
        let mut host = TestHost::new(ForkProfile::three_d()).with_claims(claim_grid(count));
        let bridge = host.bridge();
        let target = ((count as i64 - 1) * 10 + 3).to_string();
        group.bench_with_input(BenchmarkId::from_parameter(count), &target, |b, id| {
            b.iter(|| black_box(bridge.find_by_id(id)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_locate, bench_find_by_id);
criterion_main!(benches);
