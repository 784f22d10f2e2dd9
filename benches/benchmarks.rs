use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};

use supertree::{build_supertree, decompose, generate_tree, SupertreeConfig};

fn from_elem(c: &mut Criterion) {
    for n_leaves in [20, 50, 100] {
        let guide = generate_tree(n_leaves, true).unwrap();

        c.bench_with_input(
            BenchmarkId::new("decompose", n_leaves),
            &guide,
            |b, guide| {
                b.iter(|| decompose(guide, n_leaves / 4 + 3).unwrap());
            },
        );

        // reassemble the overlapping subproblems into a supertree
        let subproblems = decompose(&guide, n_leaves / 4 + 3).unwrap();
        c.bench_with_input(
            BenchmarkId::new("build_supertree", n_leaves),
            &subproblems,
            |b, subproblems| {
                b.iter(|| build_supertree(subproblems, None, SupertreeConfig::default()).unwrap());
            },
        );
    }
}

criterion_group!(benches, from_elem);
criterion_main!(benches);
