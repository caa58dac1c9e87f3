use amq_filters::cuckoo::{Cuckoo16x4, Cuckoo8x4, CuckooFilter, CuckooFilterBuilder};
use amq_filters::hash::mix64;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const KEY_COUNT: u64 = 100_000;

fn keys() -> Vec<u64> {
    (0..KEY_COUNT).map(mix64).collect()
}

fn bench_build(c: &mut Criterion) {
    let keys = keys();
    let builder = CuckooFilterBuilder::default().seed(0);
    c.bench_function("bench build cuckoo8x4", |b| {
        b.iter(|| builder.build_8x4(black_box(&keys)))
    });
    c.bench_function("bench build cuckoo16x4", |b| {
        b.iter(|| builder.build_16x4(black_box(&keys)))
    });
    for fingerprint_bits in &[8, 12] {
        let builder = builder.clone().fingerprint_bits(*fingerprint_bits);
        c.bench_function(&format!("bench build cuckoo {}", fingerprint_bits), |b| {
            b.iter(|| builder.build(black_box(&keys)))
        });
    }
}

fn bench_query(c: &mut Criterion) {
    let keys = keys();
    let probes: Vec<u64> = (KEY_COUNT..KEY_COUNT + 1_024).map(mix64).collect();

    let filter = Cuckoo8x4::new(&keys).unwrap();
    c.bench_function("bench query cuckoo8x4", |b| {
        b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
    });

    let filter = Cuckoo16x4::new(&keys).unwrap();
    c.bench_function("bench query cuckoo16x4", |b| {
        b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
    });

    let filter = CuckooFilter::new(&keys, 12).unwrap();
    c.bench_function("bench query cuckoo 12", |b| {
        b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
    });
}

criterion_group!(benches, bench_build, bench_query);
criterion_main!(benches);
