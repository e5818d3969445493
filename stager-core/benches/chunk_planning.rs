use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::num::NonZeroU64;
use stager_core::{chunk, fit_chunk_size, limits};

fn bench_chunk_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_planning");
    let preferred = NonZeroU64::new(limits::DEFAULT_CHUNK_SIZE).unwrap();

    for gib in [1u64, 50, 500] {
        let file_size = gib * 1024 * 1024 * 1024;
        let chunk_size = fit_chunk_size(file_size, preferred);

        group.bench_with_input(BenchmarkId::from_parameter(format!("{}GiB", gib)), &file_size, |b, &size| {
            b.iter(|| chunk(black_box(size), chunk_size).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chunk_planning);
criterion_main!(benches);
