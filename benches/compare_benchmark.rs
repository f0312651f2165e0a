use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{Rgba, RgbaImage};
use webdiff::diff::{CompareSettings, DistanceMetric, PixelComparator};

fn page(width: u32, height: u32, shift: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let band = ((y + shift) / 40 % 2) as u8;
        Rgba([(x % 256) as u8, 200 * band, (y % 256) as u8, 255])
    })
}

fn benchmark_compare(c: &mut Criterion) {
    let left = page(1280, 4000, 0);
    let same = left.clone();
    let shifted = page(1280, 4200, 3);

    let per_channel = PixelComparator::new(CompareSettings::default());
    let euclidean = PixelComparator::new(CompareSettings {
        tolerance: 8.0,
        metric: DistanceMetric::Euclidean,
        ..Default::default()
    });

    c.bench_function("compare_identical_1280x4000", |b| {
        b.iter(|| per_channel.compare(black_box(&left), black_box(&same)))
    });

    c.bench_function("compare_shifted_euclidean_1280x4200", |b| {
        b.iter(|| euclidean.compare(black_box(&left), black_box(&shifted)))
    });
}

criterion_group!(benches, benchmark_compare);
criterion_main!(benches);
