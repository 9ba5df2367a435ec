//! Single-shot robust pose estimation.

use glam::DVec3;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::{check_lengths, PoseError};
use crate::ops::{is_collinear, is_inlier, reprojection_error};
use crate::pose::Pose;
use crate::solver::{P3PSolver, PnPSolver};

/// Minimal sample: three points for P3P plus one to pick among its solutions.
const SAMPLE_SIZE: usize = 4;

/// Relative scatter below which the world points are treated as collinear.
const COLLINEARITY_TOL: f64 = 1e-10;

/// Parameters for the single-shot robust estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobustPoseParams {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Pixel error threshold to classify an observation as an inlier.
    pub reproj_threshold_px: f64,
    /// Desired probability that at least one sample set is outlier-free.
    pub confidence: f64,
    /// Reprojection error above which a point is reported as badly reprojected.
    pub bad_reprojection_px: f64,
    /// Whether to refit on all inliers.
    pub refine: bool,
}

impl Default for RobustPoseParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            reproj_threshold_px: 8.0,
            confidence: 0.99,
            bad_reprojection_px: 10.0,
            refine: true,
        }
    }
}

/// RANSAC result.
#[derive(Debug, Clone)]
pub struct PnPRansacResult {
    /// Best pose found, world to camera.
    pub camera_from_world: Pose,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Result of [`estimate_camera_pose`].
#[derive(Debug, Clone)]
pub struct CameraPoseEstimate {
    /// Camera pose in the world frame.
    pub world_from_camera: Pose,
    /// Inverse of `world_from_camera`.
    pub camera_from_world: Pose,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    /// Number of points reprojecting further than `bad_reprojection_px`.
    pub bad_reprojections: usize,
    /// `bad_reprojections` over the number of correspondences.
    pub bad_reprojection_ratio: f64,
}

fn classify_inliers(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    pose: &Pose,
    threshold_px: f64,
) -> Vec<usize> {
    world
        .iter()
        .zip(image.iter())
        .enumerate()
        .filter(|(_, (pw, uv))| is_inlier(camera, pose, pw, uv, threshold_px))
        .map(|(i, _)| i)
        .collect()
}

fn required_iterations(num_inliers: usize, n: usize, confidence: f64, cap: usize) -> usize {
    let w = num_inliers as f64 / n as f64;
    if w >= 1.0 {
        return 1;
    }
    let ws = w.powi(SAMPLE_SIZE as i32);
    if ws <= 1e-12 {
        return cap;
    }
    let log_conf = (1.0 - confidence).max(1e-12).ln();
    let est = (log_conf / (1.0 - ws).ln()).ceil();
    if est.is_finite() && est > 0.0 {
        (est as usize).min(cap)
    } else {
        cap
    }
}

/// Solve the pose robustly with a RANSAC loop around `solver`.
///
/// - Each iteration solves four distinct correspondences.
/// - Inliers are scored on all correspondences with the pixel reprojection error.
/// - The iteration count adapts to the inlier ratio and the desired confidence.
/// - With `params.refine` the best model is refit on its inliers, seeded by itself.
pub fn solve_pnp_ransac<S, R>(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    solver: &S,
    params: &RobustPoseParams,
    rng: &mut R,
) -> Result<PnPRansacResult, PoseError>
where
    S: PnPSolver + ?Sized,
    R: Rng + ?Sized,
{
    check_lengths(world.len(), image.len())?;
    let n = world.len();
    if n < SAMPLE_SIZE {
        return Err(PoseError::InsufficientCorrespondences {
            required: SAMPLE_SIZE,
            actual: n,
        });
    }

    let points: Vec<DVec3> = world.iter().map(|p| DVec3::from_array(*p)).collect();
    if is_collinear(&points, COLLINEARITY_TOL) {
        return Err(PoseError::DegenerateConfiguration(
            "world points are collinear",
        ));
    }

    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_pose: Option<Pose> = None;

    let mut iter = 0;
    let mut required_iters = params.max_iterations;

    while iter < required_iters {
        iter += 1;

        let sample = index::sample(rng, n, SAMPLE_SIZE);
        let w_min: Vec<[f64; 3]> = sample.iter().map(|i| world[i]).collect();
        let i_min: Vec<[f64; 2]> = sample.iter().map(|i| image[i]).collect();

        let pose = match solver.solve(&w_min, &i_min, camera, None) {
            Ok(pose) => pose,
            Err(e) => {
                log::trace!("minimal solve failed at iteration {iter}: {e}");
                continue;
            }
        };

        // cheirality on the minimal set
        if !w_min
            .iter()
            .all(|p| pose.transform_point(DVec3::from_array(*p)).z > 0.0)
        {
            continue;
        }

        let inliers = classify_inliers(world, image, camera, &pose, params.reproj_threshold_px);
        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            best_pose = Some(pose);
            if best_inliers.len() >= SAMPLE_SIZE {
                required_iters = required_iterations(
                    best_inliers.len(),
                    n,
                    params.confidence,
                    params.max_iterations,
                )
                .max(iter);
            }
        }
    }

    let Some(mut pose) = best_pose else {
        return Err(PoseError::NoModelFound { iterations: iter });
    };
    if best_inliers.len() < SAMPLE_SIZE {
        return Err(PoseError::InsufficientInliers {
            required: SAMPLE_SIZE,
            actual: best_inliers.len(),
        });
    }

    if params.refine {
        let w_in: Vec<[f64; 3]> = best_inliers.iter().map(|&i| world[i]).collect();
        let i_in: Vec<[f64; 2]> = best_inliers.iter().map(|&i| image[i]).collect();
        match solver.solve(&w_in, &i_in, camera, Some(&pose)) {
            Ok(refined) => {
                pose = refined;
                best_inliers =
                    classify_inliers(world, image, camera, &pose, params.reproj_threshold_px);
            }
            Err(e) => log::debug!("refit on {} inliers failed: {e}", w_in.len()),
        }
    }

    log::debug!(
        "RANSAC finished after {iter} iterations with {}/{n} inliers",
        best_inliers.len()
    );

    Ok(PnPRansacResult {
        camera_from_world: pose,
        inliers: best_inliers,
        iterations: iter,
    })
}

/// Count correspondences whose reprojection error exceeds `max_error_px`.
///
/// Points that project behind the camera count as bad.
pub fn count_bad_reprojections(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    camera_from_world: &Pose,
    max_error_px: f64,
) -> usize {
    world
        .iter()
        .zip(image.iter())
        .filter(|(pw, uv)| {
            reprojection_error(camera, camera_from_world, pw, uv).map_or(true, |e| e > max_error_px)
        })
        .count()
}

/// Estimate the camera pose in the world frame with a single robust solve.
///
/// Runs [`solve_pnp_ransac`] with the default [`P3PSolver`] and reports the
/// inverse of the solved pose. The number of correspondences reprojecting
/// further than `params.bad_reprojection_px` is logged and returned as a
/// diagnostic; it does not affect success.
///
/// # Errors
///
/// - [`PoseError::InsufficientCorrespondences`] with fewer than four correspondences.
/// - [`PoseError::DegenerateConfiguration`] if the world points are collinear.
/// - [`PoseError::NoModelFound`] or [`PoseError::InsufficientInliers`] if no
///   acceptable model was found.
pub fn estimate_camera_pose<R: Rng + ?Sized>(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    params: &RobustPoseParams,
    rng: &mut R,
) -> Result<CameraPoseEstimate, PoseError> {
    let result = solve_pnp_ransac(world, image, camera, &P3PSolver::default(), params, rng)?;
    let camera_from_world = result.camera_from_world;

    let n = world.len();
    let bad_reprojections = count_bad_reprojections(
        world,
        image,
        camera,
        &camera_from_world,
        params.bad_reprojection_px,
    );
    let bad_reprojection_ratio = bad_reprojections as f64 / n as f64;

    log::info!(
        "{bad_reprojections}/{n} points ({:.1}%) reproject further than {} px",
        100.0 * bad_reprojection_ratio,
        params.bad_reprojection_px
    );

    Ok(CameraPoseEstimate {
        world_from_camera: camera_from_world.inverse(),
        camera_from_world,
        inliers: result.inliers,
        bad_reprojections,
        bad_reprojection_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::rotation::pose_distance;
    use rand::{rngs::StdRng, SeedableRng};

    fn scene(n: usize, num_outliers: usize) -> (CameraModel, Pose, Vec<[f64; 3]>, Vec<[f64; 2]>) {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0));
        let gt = Pose::from_rvec(DVec3::new(0.05, -0.1, 0.02), DVec3::new(0.2, -0.1, 0.3));
        let mut rng = StdRng::seed_from_u64(5);
        let world: Vec<[f64; 3]> = (0..n)
            .map(|_| {
                [
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(4.0..6.0),
                ]
            })
            .collect();
        let mut image: Vec<[f64; 2]> = world
            .iter()
            .filter_map(|p| camera.project_point(gt.transform_point(DVec3::from_array(*p))))
            .collect();
        for uv in image.iter_mut().take(num_outliers) {
            uv[0] += 150.0;
            uv[1] -= 90.0;
        }
        (camera, gt, world, image)
    }

    #[test]
    fn test_ransac_with_outliers() -> Result<(), PoseError> {
        let (camera, gt, world, image) = scene(60, 15);
        let mut rng = StdRng::seed_from_u64(42);
        let est = estimate_camera_pose(&world, &image, &camera, &RobustPoseParams::default(), &mut rng)?;

        let (angle, dist) = pose_distance(&est.camera_from_world, &gt);
        assert!(angle < 1e-3, "rotation error {angle}");
        assert!(dist < 1e-4, "translation error {dist}");
        assert_eq!(est.inliers, (15..60).collect::<Vec<_>>());
        assert_eq!(est.bad_reprojections, 15);
        approx::assert_relative_eq!(est.bad_reprojection_ratio, 0.25);

        let back = est.world_from_camera * est.camera_from_world;
        assert!(back.translation.abs_diff_eq(DVec3::ZERO, 1e-9));
        Ok(())
    }

    #[test]
    fn test_ransac_perfect_data_without_refit() -> Result<(), PoseError> {
        let (camera, gt, world, image) = scene(12, 0);
        let params = RobustPoseParams {
            refine: false,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let res = solve_pnp_ransac(&world, &image, &camera, &P3PSolver::default(), &params, &mut rng)?;
        assert_eq!(res.inliers.len(), 12);
        // an all-inlier model stops the loop right away
        assert!(res.iterations < 5, "{} iterations", res.iterations);
        let (angle, dist) = pose_distance(&res.camera_from_world, &gt);
        assert!(angle < 1e-4 && dist < 1e-6);
        Ok(())
    }

    #[test]
    fn test_ransac_error_cases() {
        let camera = CameraModel::default();
        let params = RobustPoseParams::default();
        let mut rng = StdRng::seed_from_u64(0);

        let world = [[0.0, 0.0, 4.0], [1.0, 0.0, 4.0], [0.0, 1.0, 4.0]];
        let image = [[640.0, 480.0], [890.0, 480.0], [640.0, 730.0]];
        assert!(matches!(
            estimate_camera_pose(&world, &image, &camera, &params, &mut rng),
            Err(PoseError::InsufficientCorrespondences { required: 4, actual: 3 })
        ));

        let world: Vec<[f64; 3]> = (0..8).map(|i| [i as f64, 0.0, 4.0]).collect();
        let image: Vec<[f64; 2]> = (0..8).map(|i| [640.0 + 250.0 * i as f64, 480.0]).collect();
        assert!(matches!(
            estimate_camera_pose(&world, &image, &camera, &params, &mut rng),
            Err(PoseError::DegenerateConfiguration(_))
        ));
    }

    #[test]
    fn test_required_iterations() {
        assert_eq!(required_iterations(10, 10, 0.99, 1000), 1);
        assert_eq!(required_iterations(0, 10, 0.99, 1000), 1000);
        // w = 0.5, w^4 = 1/16: ln(0.01) / ln(15/16) = 71.4
        assert_eq!(required_iterations(5, 10, 0.99, 1000), 72);
        assert_eq!(required_iterations(5, 10, 0.99, 50), 50);
    }
}
