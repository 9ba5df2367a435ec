use argh::FromArgs;
use glam::DVec3;
use rand::{rngs::StdRng, Rng, SeedableRng};

use kornia_pose::{
    estimate_camera_pose, pose_distance, preemptive_ransac, rotation_to_euler_angles,
    CameraIntrinsics, CameraModel, P3PSolver, Pose, PreemptiveRansacParams, RobustPoseParams,
};

#[derive(FromArgs)]
/// Relocalize a camera against a synthetic map with preemptive RANSAC
struct Args {
    /// number of 2D-3D correspondences
    #[argh(option, default = "1000")]
    num_points: usize,

    /// fraction of mismatched correspondences
    #[argh(option, default = "0.3")]
    outlier_ratio: f64,

    /// pixel noise on the correct correspondences
    #[argh(option, default = "1.0")]
    noise_px: f64,

    /// number of initial hypotheses
    #[argh(option, default = "1024")]
    num_hypotheses: usize,

    /// random seed, drawn from the OS when omitted
    #[argh(option)]
    seed: Option<u64>,

    /// also run the single-shot robust estimator for comparison
    #[argh(switch)]
    single_shot: bool,
}

fn print_pose(label: &str, world_from_camera: &Pose, gt: &Pose) {
    let euler = rotation_to_euler_angles(&world_from_camera.rotation);
    let (angle, dist) = pose_distance(world_from_camera, gt);
    println!("{label}:");
    println!("  camera center: {:?}", world_from_camera.translation);
    println!("  euler angles (deg): {euler:?}");
    println!("  error: {angle:.4} deg, {dist:.4} units");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let camera = CameraModel::pinhole(CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0));

    // ground truth camera looking at the map from a few meters away
    let camera_from_world =
        Pose::from_rvec(DVec3::new(0.15, -0.3, 0.05), DVec3::new(0.5, -0.3, 2.0));
    let world_from_camera = camera_from_world.inverse();

    let num_outliers = (args.outlier_ratio.clamp(0.0, 1.0) * args.num_points as f64) as usize;
    let mut world = Vec::with_capacity(args.num_points);
    let mut image = Vec::with_capacity(args.num_points);
    while world.len() < args.num_points {
        let pc = DVec3::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(-2.0..2.0),
            rng.random_range(4.0..10.0),
        );
        let Some(uv) = camera.project_point(pc) else {
            continue;
        };
        let (du, dv) = if world.len() < num_outliers {
            let angle = rng.random_range(0.0..std::f64::consts::TAU);
            let radius = rng.random_range(50.0..400.0);
            (radius * angle.cos(), radius * angle.sin())
        } else if args.noise_px > 0.0 {
            (
                rng.random_range(-args.noise_px..args.noise_px),
                rng.random_range(-args.noise_px..args.noise_px),
            )
        } else {
            (0.0, 0.0)
        };
        world.push(world_from_camera.transform_point(pc).to_array());
        image.push([uv[0] + du, uv[1] + dv]);
    }
    println!(
        "Map: #{} correspondences, #{num_outliers} outliers",
        world.len()
    );

    let params = PreemptiveRansacParams::default().with_num_hypotheses(args.num_hypotheses);
    let solver = P3PSolver::default();

    let start = std::time::Instant::now();
    let estimate = preemptive_ransac(&world, &image, &camera, &solver, &params, &mut rng)?;
    println!(
        "Preemptive RANSAC: {} hypotheses, {} rounds, loss {}, {:?}",
        estimate.num_hypotheses,
        estimate.rounds,
        estimate.loss,
        start.elapsed()
    );
    print_pose("preemptive", &estimate.world_from_camera, &world_from_camera);

    if args.single_shot {
        let start = std::time::Instant::now();
        let single = estimate_camera_pose(
            &world,
            &image,
            &camera,
            &RobustPoseParams::default(),
            &mut rng,
        )?;
        println!(
            "Single-shot RANSAC: #{} inliers, {:.1}% bad reprojections, {:?}",
            single.inliers.len(),
            100.0 * single.bad_reprojection_ratio,
            start.elapsed()
        );
        print_pose("single-shot", &single.world_from_camera, &world_from_camera);
    }

    log::info!("ground truth camera center: {:?}", world_from_camera.translation);

    Ok(())
}
