//! Benchmarks for the allele-code conversion hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pgenio::{convert_allele_codes, Arena, ArenaPlan};

fn bench_convert(c: &mut Criterion) {
    let sample_count = 100_000u32;
    let mut arena = Arena::allocate(ArenaPlan::for_samples(sample_count), 0);

    // Mostly-biallelic input with occasional multiallelic overflow and
    // missing calls, roughly the shape of a real cohort.
    let mut codes: Vec<i32> = Vec::with_capacity(2 * sample_count as usize);
    for s in 0..sample_count as usize {
        match s % 499 {
            0 => codes.extend([3, 1]),
            1 => codes.extend([-9, -9]),
            _ => codes.extend([((s / 7) % 2) as i32, ((s / 3) % 2) as i32]),
        }
    }
    let phase: Vec<u8> = (0..sample_count as usize).map(|s| (s % 3 != 0) as u8).collect();

    c.bench_function("convert_unphased_100k", |b| {
        b.iter(|| {
            let mut views = arena.views();
            black_box(convert_allele_codes(black_box(&codes), None, &mut views).unwrap());
        })
    });

    c.bench_function("convert_phased_100k", |b| {
        b.iter(|| {
            let mut views = arena.views();
            black_box(
                convert_allele_codes(black_box(&codes), Some(&phase), &mut views).unwrap(),
            );
        })
    });
}

criterion_group!(benches, bench_convert);
criterion_main!(benches);
