use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sparseflow_image::Image;
use sparseflow_imgproc::derivative::{spatial_derivative, SpatialDerivative};
use sparseflow_imgproc::parallel::ExecutionStrategy;

fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spatial Derivative");

    for (width, height) in [(320, 240), (640, 480), (1280, 960)].iter() {
        group.throughput(criterion::Throughput::Elements((*width * *height) as u64));

        let parameter_string = format!("{}x{}", width, height);

        let image_data = (0..(*width * *height)).map(|x| (x * 7 % 256) as u8).collect();
        let image = Image::<u8, 1>::new([*width, *height].into(), image_data).unwrap();
        let gradient = Image::<i16, 2>::from_size_val(image.size(), 0).unwrap();

        for kind in SpatialDerivative::ALL {
            for (strategy_name, strategy) in [
                ("serial", ExecutionStrategy::Serial),
                ("parallel", ExecutionStrategy::Parallel),
            ] {
                group.bench_with_input(
                    BenchmarkId::new(
                        format!("{}_{}", kind.name().to_lowercase(), strategy_name),
                        &parameter_string,
                    ),
                    &(&image, &gradient),
                    |b, i| {
                        let (src, mut dst) = (i.0, i.1.clone());
                        b.iter(|| {
                            black_box(spatial_derivative(src, &mut dst, kind, strategy)).unwrap();
                        })
                    },
                );
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_gradient);
criterion_main!(benches);
