use amq_filters::hash::mix64;
use amq_filters::xor::{BlockedXor8, Xor16, Xor8, XorFilter};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const KEY_COUNT: u64 = 100_000;

fn keys() -> Vec<u64> {
    (0..KEY_COUNT).map(mix64).collect()
}

fn probes() -> Vec<u64> {
    (KEY_COUNT..KEY_COUNT + 1_024).map(mix64).collect()
}

fn bench_build(c: &mut Criterion) {
    let keys = keys();
    c.bench_function("bench build xor8", |b| {
        b.iter(|| Xor8::new(black_box(&keys)))
    });
    c.bench_function("bench build blocked xor8", |b| {
        b.iter(|| BlockedXor8::new(black_box(&keys)))
    });
    for fingerprint_bits in &[7, 8, 13] {
        c.bench_function(&format!("bench build xor {}", fingerprint_bits), |b| {
            b.iter(|| XorFilter::new(black_box(&keys), *fingerprint_bits))
        });
    }
}

fn bench_query(c: &mut Criterion) {
    let keys = keys();
    let probes = probes();

    let filter = Xor8::new(&keys).unwrap();
    c.bench_function("bench query xor8", |b| {
        b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
    });
    c.bench_function("bench batch query xor8", |b| {
        b.iter(|| filter.may_contain_batch(&probes))
    });

    let filter = Xor16::new(&keys).unwrap();
    c.bench_function("bench query xor16", |b| {
        b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
    });

    let filter = BlockedXor8::new(&keys).unwrap();
    c.bench_function("bench query blocked xor8", |b| {
        b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
    });

    for fingerprint_bits in &[7, 8, 13] {
        let filter = XorFilter::new(&keys, *fingerprint_bits).unwrap();
        c.bench_function(&format!("bench query xor {}", fingerprint_bits), |b| {
            b.iter(|| probes.iter().filter(|key| filter.may_contain(**key)).count())
        });
    }
}

fn bench_serialize(c: &mut Criterion) {
    let filter = XorFilter::new(&keys(), 8).unwrap();
    let bytes = filter.to_bytes();
    c.bench_function("bench xor to bytes", |b| b.iter(|| filter.to_bytes()));
    c.bench_function("bench xor from bytes", |b| {
        b.iter(|| XorFilter::from_bytes(black_box(&bytes)))
    });
}

criterion_group!(benches, bench_build, bench_query, bench_serialize);
criterion_main!(benches);
