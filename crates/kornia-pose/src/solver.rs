//! Pose-from-correspondences solvers used by the robust estimators.

use glam::DVec3;

use crate::camera::CameraModel;
use crate::error::{check_lengths, PoseError};
use crate::ops::reprojection_error;
use crate::p3p::solve_p3p;
use crate::pose::Pose;
use crate::refine::{refine_pose_lm, LMRefineParams};

/// Trait for pose solvers.
///
/// Poses produced and consumed by a solver map world points into the camera
/// frame (`camera_from_world`).
pub trait PnPSolver {
    /// Solve for the camera pose given 2D-3D correspondences.
    ///
    /// # Arguments
    /// * `world` – 3-D coordinates in the world frame.
    /// * `image` – Corresponding pixel coordinates.
    /// * `camera` – Camera model with intrinsics and optional distortion.
    /// * `initial` – Optional pose estimate used to seed an iterative solve.
    fn solve(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        initial: Option<&Pose>,
    ) -> Result<Pose, PoseError>;

    /// Project world points through a `camera_from_world` pose.
    ///
    /// Points behind the camera yield `None`.
    fn project(
        &self,
        world: &[[f64; 3]],
        camera_from_world: &Pose,
        camera: &CameraModel,
    ) -> Vec<Option<[f64; 2]>> {
        world
            .iter()
            .map(|p| camera.project_point(camera_from_world.transform_point(DVec3::from_array(*p))))
            .collect()
    }
}

/// Default solver: closed-form P3P seeding and Levenberg–Marquardt refinement.
///
/// Without an initial estimate the first three correspondences are solved with
/// P3P. Any further correspondences only select among the P3P candidates, by
/// smallest summed squared reprojection error. With an initial estimate all
/// correspondences are used in an LM refinement.
#[derive(Debug, Clone, Default)]
pub struct P3PSolver {
    /// Parameters of the iterative refinement.
    pub refine: LMRefineParams,
}

impl P3PSolver {
    /// Create a solver with custom refinement parameters.
    pub fn new(refine: LMRefineParams) -> Self {
        Self { refine }
    }
}

impl PnPSolver for P3PSolver {
    fn solve(
        &self,
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        initial: Option<&Pose>,
    ) -> Result<Pose, PoseError> {
        check_lengths(world.len(), image.len())?;
        if world.len() < 3 {
            return Err(PoseError::InsufficientCorrespondences {
                required: 3,
                actual: world.len(),
            });
        }

        if let Some(initial) = initial {
            let outcome = refine_pose_lm(world, image, camera, initial, &self.refine)?;
            return Ok(outcome.camera_from_world);
        }

        let candidates = solve_p3p(&world[..3], &image[..3], camera)?;
        if world.len() == 3 {
            // nearest to the camera
            return candidates
                .first()
                .map(|c| c.camera_from_world)
                .ok_or_else(|| PoseError::SolverFailed("P3P returned no candidate".to_string()));
        }

        let score = |pose: &Pose| -> f64 {
            world
                .iter()
                .zip(image.iter())
                .map(|(pw, uv)| match reprojection_error(camera, pose, pw, uv) {
                    Some(e) => e * e,
                    None => f64::INFINITY,
                })
                .sum()
        };

        candidates
            .iter()
            .map(|c| (score(&c.camera_from_world), c.camera_from_world))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, pose)| pose)
            .ok_or_else(|| PoseError::SolverFailed("P3P returned no candidate".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::rotation::pose_distance;

    fn scene() -> (CameraModel, Pose, Vec<[f64; 3]>, Vec<[f64; 2]>) {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0));
        let gt = Pose::from_rvec(DVec3::new(0.1, 0.2, -0.1), DVec3::new(0.2, 0.1, 0.5));
        let world = vec![
            [0.3, -0.2, 3.0],
            [-0.4, 0.1, 3.5],
            [0.1, 0.5, 4.0],
            [-0.2, -0.4, 3.2],
            [0.5, 0.4, 3.8],
            [0.0, 0.0, 4.4],
        ];
        let solver = P3PSolver::default();
        let image = solver
            .project(&world, &gt, &camera)
            .into_iter()
            .flatten()
            .collect();
        (camera, gt, world, image)
    }

    #[test]
    fn test_solver_disambiguates_with_extra_points() -> Result<(), PoseError> {
        let (camera, gt, world, image) = scene();
        let pose = P3PSolver::default().solve(&world, &image, &camera, None)?;
        let (angle, dist) = pose_distance(&pose, &gt);
        assert!(angle < 1e-4, "rotation error {angle}");
        assert!(dist < 1e-6, "translation error {dist}");
        Ok(())
    }

    #[test]
    fn test_solver_refines_from_initial_estimate() -> Result<(), PoseError> {
        let (camera, gt, world, image) = scene();
        let init = Pose::from_rvec(DVec3::new(0.01, 0.0, 0.01), DVec3::new(0.02, 0.0, 0.0)) * gt;
        let pose = P3PSolver::default().solve(&world, &image, &camera, Some(&init))?;
        let (angle, dist) = pose_distance(&pose, &gt);
        assert!(angle < 1e-3, "rotation error {angle}");
        assert!(dist < 1e-4, "translation error {dist}");
        Ok(())
    }

    #[test]
    fn test_solver_input_validation() {
        let (camera, _, world, image) = scene();
        let solver = P3PSolver::default();
        assert!(matches!(
            solver.solve(&world[..2], &image[..2], &camera, None),
            Err(PoseError::InsufficientCorrespondences { required: 3, actual: 2 })
        ));
        assert!(matches!(
            solver.solve(&world, &image[..4], &camera, None),
            Err(PoseError::MismatchedArrayLengths { .. })
        ));
    }

    #[test]
    fn test_project_marks_points_behind_camera() {
        let camera = CameraModel::default();
        let solver = P3PSolver::default();
        let projected = solver.project(&[[0.0, 0.0, 2.0], [0.0, 0.0, -2.0]], &Pose::IDENTITY, &camera);
        assert_eq!(projected, vec![Some([640.0, 480.0]), None]);
    }
}
