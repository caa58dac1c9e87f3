use amq_filters::bloom::BloomFilter;
use amq_filters::hash::mix64;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const KEY_COUNT: u64 = 100_000;

fn bench_build(c: &mut Criterion) {
    let keys: Vec<u64> = (0..KEY_COUNT).map(mix64).collect();
    for bits_per_key in &[8, 10, 16] {
        c.bench_function(&format!("bench build bloom {}", bits_per_key), |b| {
            b.iter(|| BloomFilter::new(black_box(&keys), *bits_per_key))
        });
    }
}

fn bench_query(c: &mut Criterion) {
    let keys: Vec<u64> = (0..KEY_COUNT).map(mix64).collect();
    let probes: Vec<u64> = (KEY_COUNT..KEY_COUNT + 1_024).map(mix64).collect();
    for bits_per_key in &[8, 10, 16] {
        let filter = BloomFilter::new(&keys, *bits_per_key).unwrap();
        c.bench_function(&format!("bench query bloom {}", bits_per_key), |b| {
            b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
        });
    }
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
