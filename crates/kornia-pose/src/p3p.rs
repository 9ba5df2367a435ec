//! Perspective-3-Point minimal solver.
//!
//! Implements the Grunert formulation of P3P: the side lengths of the world
//! triangle and the angles between the viewing rays lead to a quartic in the
//! depth ratio `u = |PB| / |PA|`. Every real root is lifted to three camera
//! frame points which are aligned to the world points with Kabsch to obtain a
//! `camera_from_world` pose.

use glam::DVec3;

use crate::camera::CameraModel;
use crate::error::PoseError;
use crate::ops::{align_rigid, is_collinear, solve_quartic_real};
use crate::pose::Pose;

/// Relative scatter below which a triple is treated as collinear.
const COLLINEARITY_TOL: f64 = 1e-10;

fn poly_mul(a: &[f64; 5], b: &[f64; 5]) -> [f64; 5] {
    let mut out = [0.0; 5];
    for i in 0..5 {
        for j in 0..5 - i {
            out[i + j] += a[i] * b[j];
        }
    }
    out
}

/// A P3P solution.
#[derive(Debug, Clone, Copy)]
pub struct P3PCandidate {
    /// Estimated pose, world to camera.
    pub camera_from_world: Pose,
    /// Distance from the camera center to the first world point.
    pub depth: f64,
}

/// Solve P3P for exactly three correspondences.
///
/// Returns up to four candidates sorted by the distance of the first point to
/// the camera (nearest first).
pub fn solve_p3p(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
) -> Result<Vec<P3PCandidate>, PoseError> {
    crate::error::check_lengths(world.len(), image.len())?;
    if world.len() != 3 {
        return Err(PoseError::InsufficientCorrespondences {
            required: 3,
            actual: world.len(),
        });
    }

    let pw = [
        DVec3::from_array(world[0]),
        DVec3::from_array(world[1]),
        DVec3::from_array(world[2]),
    ];
    if is_collinear(&pw, COLLINEARITY_TOL) {
        return Err(PoseError::DegenerateConfiguration(
            "P3P world points are collinear",
        ));
    }

    let f = [
        camera.bearing(&image[0]),
        camera.bearing(&image[1]),
        camera.bearing(&image[2]),
    ];

    let a = (pw[1] - pw[2]).length();
    let b = (pw[0] - pw[2]).length();
    let c = (pw[0] - pw[1]).length();

    let cos_alpha = f[1].dot(f[2]);
    let cos_beta = f[0].dot(f[2]);
    let cos_gamma = f[0].dot(f[1]);

    let (a2, b2, c2) = (a * a, b * b, c * c);
    let d = (b2 - a2) / c2;
    let e = b2 / c2;

    // v = N(u) / D(u) with N, D and the remaining constraint E(u) D(u)^2
    let n_poly = [1.0 - d, 2.0 * d * cos_gamma, -(1.0 + d), 0.0, 0.0];
    let d_poly = [2.0 * cos_beta, -2.0 * cos_alpha, 0.0, 0.0, 0.0];
    let e_poly = [1.0 - e, 2.0 * e * cos_gamma, -e, 0.0, 0.0];

    let n2 = poly_mul(&n_poly, &n_poly);
    let nd = poly_mul(&n_poly, &d_poly);
    let ed2 = poly_mul(&e_poly, &poly_mul(&d_poly, &d_poly));

    let mut coeffs = [0.0; 5];
    for i in 0..5 {
        coeffs[i] = n2[i] - 2.0 * cos_beta * nd[i] + ed2[i];
    }

    let mut candidates = Vec::with_capacity(4);
    for u in solve_quartic_real(coeffs) {
        let den = d_poly[0] + d_poly[1] * u;
        if den.abs() < 1e-12 {
            continue;
        }
        let k = 1.0 + u * u - 2.0 * u * cos_gamma;
        if k.abs() < 1e-12 {
            continue;
        }
        let v = (n_poly[0] + n_poly[1] * u + n_poly[2] * u * u) / den;

        let x2 = c2 / k;
        if x2 <= 0.0 {
            continue;
        }
        let x = x2.sqrt();
        let (y, z) = (u * x, v * x);
        if y <= 0.0 || z <= 0.0 {
            continue;
        }

        let pc = [f[0] * x, f[1] * y, f[2] * z];
        if let Ok(camera_from_world) = align_rigid(&pw, &pc) {
            candidates.push(P3PCandidate {
                camera_from_world,
                depth: x,
            });
        }
    }

    if candidates.is_empty() {
        return Err(PoseError::SolverFailed(
            "P3P polynomial has no admissible root".to_string(),
        ));
    }

    candidates.sort_by(|l, r| l.depth.total_cmp(&r.depth));
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::rotation::pose_distance;

    fn project_all(camera: &CameraModel, pose: &Pose, world: &[[f64; 3]]) -> Vec<[f64; 2]> {
        world
            .iter()
            .filter_map(|p| camera.project_point(pose.transform_point(DVec3::from_array(*p))))
            .collect()
    }

    #[test]
    fn test_p3p_recovers_pose_from_minimal_set() -> Result<(), PoseError> {
        let camera = CameraModel::pinhole(CameraIntrinsics::new(800.0, 780.0, 640.0, 360.0));
        let gt = Pose::from_rvec(DVec3::new(0.1, -0.05, 0.2), DVec3::new(0.1, -0.05, 1.0));

        let world = [[0.2, -0.1, 0.8], [-0.1, 0.2, 1.1], [0.15, 0.1, 0.9]];
        let image = project_all(&camera, &gt, &world);

        let candidates = solve_p3p(&world, &image, &camera)?;
        assert!(!candidates.is_empty() && candidates.len() <= 4);

        let best = candidates
            .iter()
            .map(|c| pose_distance(&c.camera_from_world, &gt))
            .fold((f64::INFINITY, f64::INFINITY), |acc, d| {
                (acc.0.min(d.0), acc.1.min(d.1))
            });
        assert!(best.0 < 1e-4, "rotation error too large: {}", best.0);
        assert!(best.1 < 1e-6, "translation error too large: {}", best.1);

        for pair in candidates.windows(2) {
            assert!(pair[0].depth <= pair[1].depth);
        }
        Ok(())
    }

    #[test]
    fn test_p3p_rejects_collinear_points() {
        let camera = CameraModel::default();
        let world = [[0.0, 0.0, 4.0], [1.0, 0.0, 4.0], [2.0, 0.0, 4.0]];
        let image = [[640.0, 480.0], [890.0, 480.0], [1140.0, 480.0]];
        assert!(matches!(
            solve_p3p(&world, &image, &camera),
            Err(PoseError::DegenerateConfiguration(_))
        ));
    }

    #[test]
    fn test_p3p_requires_three_points() {
        let camera = CameraModel::default();
        let world = [[0.0, 0.0, 4.0], [1.0, 0.0, 4.0]];
        let image = [[640.0, 480.0], [890.0, 480.0]];
        assert!(matches!(
            solve_p3p(&world, &image, &camera),
            Err(PoseError::InsufficientCorrespondences { required: 3, actual: 2 })
        ));
    }
}
