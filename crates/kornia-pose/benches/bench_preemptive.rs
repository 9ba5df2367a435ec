use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use glam::DVec3;
use kornia_pose as kpose;
use rand::{rngs::StdRng, Rng, SeedableRng};

type PoseDataset = (Vec<[f64; 3]>, Vec<[f64; 2]>, kpose::CameraModel);

fn generate_dataset_with_seed(num_points: usize, outlier_ratio: f64, seed: u64) -> PoseDataset {
    let camera = kpose::CameraModel::pinhole(kpose::CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0));
    let camera_from_world =
        kpose::Pose::from_rvec(DVec3::new(0.1, -0.2, 0.05), DVec3::new(0.2, -0.1, 0.3));
    let world_from_camera = camera_from_world.inverse();

    let num_outliers = (outlier_ratio * num_points as f64) as usize;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = Vec::with_capacity(num_points);
    let mut image = Vec::with_capacity(num_points);
    while world.len() < num_points {
        let pc = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(3.0..6.0),
        );
        let Some(uv) = camera.project_point(pc) else {
            continue;
        };
        let (du, dv) = if world.len() < num_outliers {
            let angle = rng.random_range(0.0..std::f64::consts::TAU);
            let radius = rng.random_range(300.0..800.0);
            (radius * angle.cos(), radius * angle.sin())
        } else {
            (rng.random_range(-0.5..0.5), rng.random_range(-0.5..0.5))
        };
        world.push(world_from_camera.transform_point(pc).to_array());
        image.push([uv[0] + du, uv[1] + dv]);
    }

    (world, image, camera)
}

fn bench_preemptive(c: &mut Criterion) {
    let mut group = c.benchmark_group("preemptive_ransac");
    group.sample_size(10);
    for &k in &[64usize, 256, 1024] {
        let (world, image, camera) = generate_dataset_with_seed(1000, 0.3, 42);
        let params = kpose::PreemptiveRansacParams::default().with_num_hypotheses(k);
        let solver = kpose::P3PSolver::default();
        group.throughput(Throughput::Elements(k as u64));
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, _| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let res =
                    kpose::preemptive_ransac(&world, &image, &camera, &solver, &params, &mut rng);
                std::hint::black_box(res.ok());
            });
        });
    }
    group.finish();
}

fn bench_single_shot(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_shot_ransac");
    for &n in &[32usize, 128, 512, 2048] {
        let (world, image, camera) = generate_dataset_with_seed(n, 0.2, 10_000);
        let params = kpose::RobustPoseParams {
            max_iterations: 200,
            ..Default::default()
        };
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let res = kpose::estimate_camera_pose(&world, &image, &camera, &params, &mut rng);
                std::hint::black_box(res.ok());
            });
        });
    }
    group.finish();
}

fn bench_rotation_to_quaternion(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let rotations: Vec<glam::DMat3> = (0..1024)
        .map(|_| {
            let rvec = DVec3::new(
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
                rng.random_range(-3.0..3.0),
            );
            kpose::Pose::from_rvec(rvec, DVec3::ZERO).rotation
        })
        .collect();

    c.bench_function("rotation_to_quaternion", |b| {
        b.iter(|| {
            for r in &rotations {
                std::hint::black_box(kpose::rotation_to_quaternion(r));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_preemptive,
    bench_single_shot,
    bench_rotation_to_quaternion
);
criterion_main!(benches);
