use criterion::{black_box, criterion_group, criterion_main, Criterion};

use image::{GrayImage, Luma, RgbImage};
use stereo_segm::prelude::*;

fn texture(x: u32, y: u32) -> u8 {
    ((x * 53 + y * 97 + (x * y) % 7 * 31) % 256) as u8
}

fn matcher_bench(c: &mut Criterion) {
    let (w, h) = (48, 32);

    // Build a pair with a foreground block sitting 4 pixels closer than the background
    let left = RgbImage::from_fn(w, h, |x, y| {
        let v = texture(x, y);
        image::Rgb([v, v / 2, 255 - v])
    });
    let right = RgbImage::from_fn(w, h, |x, y| {
        let shift = if (16..32).contains(&x) && (8..24).contains(&y) { 6 } else { 2 };
        let v = texture(x + shift, y);
        image::Rgb([v, v / 2, 255 - v])
    });
    let mut mask = GrayImage::new(w, h);
    for x in 18..34 {
        for y in 8..24 {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    let input = StereoInput::new(
        CameraInput::new(&left, mask.clone()),
        CameraInput::new(&right, mask),
    );
    let roi = GrayImage::from_pixel(w, h, Luma([255]));

    // Build the matcher
    let mut matcher = StereoSegmMatcher::new(Params::with_disparity_range(0, 8)).unwrap();
    matcher.initialize(&[roi.clone(), roi], LEFT).unwrap();

    c.bench_function("features 48x32", |b| {
        b.iter(|| matcher.calc_features(black_box(&input)))
    });
    c.bench_function("stereo_segm 48x32", |b| b.iter(|| matcher.compute(black_box(&input))));
}

criterion_group!(benches, matcher_bench);
criterion_main!(benches);
