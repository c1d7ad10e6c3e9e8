use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sparseflow_image::Image;
use sparseflow_imgproc::parallel::ExecutionStrategy;
use sparseflow_tracking::{LkParams, PyrLkTracker};

fn texture(width: usize, height: usize, dx: f32) -> Image<u8, 1> {
    let data = (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                let (x, y) = (x as f32 - dx, y as f32);
                (128.0 + 60.0 * (0.13 * x + 0.07 * y).sin() + 60.0 * (0.09 * y - 0.05 * x).cos())
                    as u8
            })
        })
        .collect();
    Image::new([width, height].into(), data).unwrap()
}

fn bench_lk(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pyramidal LK");

    let (width, height) = (640, 480);
    let prev = texture(width, height, 0.0);
    let next = texture(width, height, 2.5);

    for num_points in [100, 500, 1000] {
        let points: Vec<[f32; 2]> = (0..num_points)
            .map(|i| {
                [
                    30.0 + (i * 37 % (width - 60)) as f32,
                    30.0 + (i * 53 % (height - 60)) as f32,
                ]
            })
            .collect();

        for (name, strategy) in [
            ("serial", ExecutionStrategy::Serial),
            ("parallel", ExecutionStrategy::Parallel),
        ] {
            let tracker = PyrLkTracker::new(LkParams::default())
                .unwrap()
                .with_strategy(strategy);
            let prev_pyramid = tracker.build_pyramid(&prev, true).unwrap();
            let next_pyramid = tracker.build_pyramid(&next, false).unwrap();

            group.bench_with_input(
                BenchmarkId::new(format!("track_{}", name), num_points),
                &points,
                |b, p| {
                    b.iter(|| {
                        black_box(tracker.track(&prev_pyramid, &next_pyramid, p, None)).unwrap();
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_lk);
criterion_main!(benches);
