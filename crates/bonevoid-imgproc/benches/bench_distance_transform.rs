use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use bonevoid_imgproc::distance_transform::signed_distance_transform;
use bonevoid_imgproc::parallel::ExecutionStrategy;
use bonevoid_volume::{BinaryVolume, Volume, VolumeGeometry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn create_test_volume(side: usize) -> BinaryVolume {
    let mut rng = StdRng::seed_from_u64(42);
    let geometry = VolumeGeometry::new([side, side, side]);
    let data: Vec<u8> = (0..geometry.size.num_voxels())
        .map(|_| u8::from(rng.random_bool(0.95)))
        .collect();
    Volume::new(geometry, data).unwrap()
}

fn bench_distance_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("DistanceTransform");

    for side in [32, 64, 128] {
        let src = create_test_volume(side);
        let id = format!("{side}^3");

        group.bench_with_input(BenchmarkId::new("serial", &id), &src, |b, src| {
            let mut dst = Volume::from_geometry_val(*src.geometry(), 0.0f32);
            b.iter(|| {
                signed_distance_transform(src, &mut dst, 0, [1.0; 3], ExecutionStrategy::Serial)
                    .unwrap();
            })
        });

        group.bench_with_input(BenchmarkId::new("parallel_slices", &id), &src, |b, src| {
            let mut dst = Volume::from_geometry_val(*src.geometry(), 0.0f32);
            b.iter(|| {
                signed_distance_transform(
                    src,
                    &mut dst,
                    0,
                    [1.0; 3],
                    ExecutionStrategy::ParallelSlices,
                )
                .unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distance_transform);
criterion_main!(benches);
