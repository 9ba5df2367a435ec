use glam::{DMat3, DVec3};
use nalgebra::{Matrix3, Matrix4, Schur};

use crate::camera::CameraModel;
use crate::error::PoseError;
use crate::pose::Pose;

const EPS: f64 = 1e-12;
const ROOT_DEDUP_TOL: f64 = 1e-8;
const NEWTON_STEPS: usize = 3;

pub(crate) fn from_na(m: &Matrix3<f64>) -> DMat3 {
    DMat3::from_cols_slice(m.as_slice())
}

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(pts: &[DVec3]) -> DVec3 {
    let n = pts.len().max(1) as f64;
    pts.iter().fold(DVec3::ZERO, |acc, &p| acc + p) / n
}

fn sort_dedup(mut roots: Vec<f64>) -> Vec<f64> {
    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() < ROOT_DEDUP_TOL);
    roots
}

/// Real roots of `c[2] x^2 + c[1] x + c[0]`.
pub(crate) fn solve_quadratic_real(c: [f64; 3]) -> Vec<f64> {
    let [c0, c1, c2] = c;
    if c2.abs() < EPS {
        if c1.abs() < EPS {
            return Vec::new();
        }
        return vec![-c0 / c1];
    }
    let disc = c1 * c1 - 4.0 * c2 * c0;
    if disc.abs() < EPS {
        return vec![-c1 / (2.0 * c2)];
    }
    if disc < 0.0 {
        return Vec::new();
    }
    let sqrt_disc = disc.sqrt();
    sort_dedup(vec![
        (-c1 + sqrt_disc) / (2.0 * c2),
        (-c1 - sqrt_disc) / (2.0 * c2),
    ])
}

/// Real roots of `c[3] x^3 + c[2] x^2 + c[1] x + c[0]` with Cardano's formula.
pub(crate) fn solve_cubic_real(c: [f64; 4]) -> Vec<f64> {
    if c[3].abs() < EPS {
        return solve_quadratic_real([c[0], c[1], c[2]]);
    }

    let inv = 1.0 / c[3];
    let (b, c1, d) = (c[2] * inv, c[1] * inv, c[0] * inv);

    // depressed cubic y^3 + p y + q = 0 with x = y - b / 3
    let p = c1 - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c1 / 3.0 + d;
    let disc = (q * 0.5).powi(2) + (p / 3.0).powi(3);
    let shift = b / 3.0;

    let mut roots = Vec::with_capacity(3);
    if disc > EPS {
        let sqrt_disc = disc.sqrt();
        let u = (-q * 0.5 + sqrt_disc).cbrt();
        let v = (-q * 0.5 - sqrt_disc).cbrt();
        roots.push(u + v - shift);
    } else if disc.abs() <= EPS {
        let u = (-q * 0.5).cbrt();
        roots.push(2.0 * u - shift);
        roots.push(-u - shift);
    } else {
        let r = (-p / 3.0).sqrt();
        let phi = ((-q * 0.5) / (r * r * r)).clamp(-1.0, 1.0).acos();
        let tau = 2.0 * std::f64::consts::PI;
        for k in 0..3 {
            roots.push(2.0 * r * ((phi + k as f64 * tau) / 3.0).cos() - shift);
        }
    }

    sort_dedup(roots)
}

fn eval_poly(c: &[f64; 5], x: f64) -> (f64, f64) {
    let mut p = 0.0;
    let mut dp = 0.0;
    for &ci in c.iter().rev() {
        dp = dp * x + p;
        p = p * x + ci;
    }
    (p, dp)
}

/// Real roots of the quartic `sum_i c[i] x^i`.
///
/// Roots are the real eigenvalues of the companion matrix, polished with a
/// few Newton steps on the original polynomial. Falls back to the cubic solver
/// when the leading coefficient vanishes.
pub(crate) fn solve_quartic_real(c: [f64; 5]) -> Vec<f64> {
    if c[4].abs() < EPS {
        return solve_cubic_real([c[0], c[1], c[2], c[3]]);
    }

    let inv = 1.0 / c[4];
    #[rustfmt::skip]
    let companion = Matrix4::new(
        -c[3] * inv, -c[2] * inv, -c[1] * inv, -c[0] * inv,
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
    );

    let eigvals = Schur::new(companion).complex_eigenvalues();

    let roots = eigvals
        .iter()
        .filter(|z| z.im.abs() < ROOT_DEDUP_TOL)
        .map(|z| {
            let mut x = z.re;
            for _ in 0..NEWTON_STEPS {
                let (p, dp) = eval_poly(&c, x);
                if dp.abs() < EPS {
                    break;
                }
                let next = x - p / dp;
                if eval_poly(&c, next).0.abs() >= p.abs() {
                    break;
                }
                x = next;
            }
            x
        })
        .collect();

    sort_dedup(roots)
}

/// Rigid transform `dst_T_src` minimizing the squared distance between the
/// transformed `src` points and `dst` (Kabsch alignment, no scale).
pub(crate) fn align_rigid(src: &[DVec3], dst: &[DVec3]) -> Result<Pose, PoseError> {
    if src.len() != dst.len() {
        return Err(PoseError::MismatchedArrayLengths {
            left_name: "source points",
            left_len: src.len(),
            right_name: "destination points",
            right_len: dst.len(),
        });
    }
    if src.len() < 3 {
        return Err(PoseError::InsufficientCorrespondences {
            required: 3,
            actual: src.len(),
        });
    }

    let mu_s = compute_centroid(src);
    let mu_d = compute_centroid(dst);

    // H = sum (dst_i - mu_d) (src_i - mu_s)^T
    let mut h = Matrix3::<f64>::zeros();
    for (s, d) in src.iter().zip(dst.iter()) {
        let sc = *s - mu_s;
        let dc = *d - mu_d;
        h += nalgebra::Vector3::new(dc.x, dc.y, dc.z)
            * nalgebra::RowVector3::new(sc.x, sc.y, sc.z);
    }

    let svd = h.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(PoseError::SolverFailed(
            "SVD of the cross-covariance did not converge".to_string(),
        ));
    };

    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        // reflection
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }

    let rotation = from_na(&r);
    let translation = mu_d - rotation * mu_s;
    Ok(Pose::new(rotation, translation))
}

/// Check whether the points are (nearly) collinear or coincident.
///
/// Uses the ratio between the two largest eigenvalues of the scatter matrix.
pub(crate) fn is_collinear(pts: &[DVec3], tol: f64) -> bool {
    if pts.len() < 3 {
        return true;
    }
    let mu = compute_centroid(pts);
    let mut cov = Matrix3::<f64>::zeros();
    for p in pts {
        let d = *p - mu;
        let v = nalgebra::Vector3::new(d.x, d.y, d.z);
        cov += v * v.transpose();
    }

    let mut eig = cov.symmetric_eigen().eigenvalues.as_slice().to_vec();
    eig.sort_by(|a, b| b.total_cmp(a));
    if eig[0] <= EPS {
        return true;
    }
    eig[1] <= tol * eig[0]
}

/// Pixel reprojection error of a single correspondence.
///
/// Returns `None` when the point projects behind the camera.
pub(crate) fn reprojection_error(
    camera: &CameraModel,
    camera_from_world: &Pose,
    world: &[f64; 3],
    image: &[f64; 2],
) -> Option<f64> {
    let pc = camera_from_world.transform_point(DVec3::from_array(*world));
    let uv = camera.project_point(pc)?;
    Some((uv[0] - image[0]).hypot(uv[1] - image[1]))
}

/// Whether the correspondence is an inlier of the pose under `threshold_px`.
#[inline]
pub(crate) fn is_inlier(
    camera: &CameraModel,
    camera_from_world: &Pose,
    world: &[f64; 3],
    image: &[f64; 2],
    threshold_px: f64,
) -> bool {
    reprojection_error(camera, camera_from_world, world, image).is_some_and(|e| e <= threshold_px)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compute_centroid() {
        let pts = [
            DVec3::new(1.0, 2.0, 3.0),
            DVec3::new(4.0, 5.0, 6.0),
            DVec3::new(7.0, 8.0, 9.0),
        ];
        assert_eq!(compute_centroid(&pts), DVec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_quartic_four_roots() {
        // (x - 1)(x + 2)(x - 3)(x + 0.5)
        let c = [3.0, 3.5, -6.0, -1.5, 1.0];
        let roots = solve_quartic_real(c);
        assert_eq!(roots.len(), 4);
        for (r, e) in roots.iter().zip([-2.0, -0.5, 1.0, 3.0]) {
            assert_relative_eq!(*r, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_quartic_complex_pair() {
        // (x^2 + 1)(x - 2)(x + 1) = x^4 - x^3 - x^2 - x - 2
        let roots = solve_quartic_real([-2.0, -1.0, -1.0, -1.0, 1.0]);
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots[0], -1.0, epsilon = 1e-9);
        assert_relative_eq!(roots[1], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quartic_falls_back_to_lower_degree() {
        // (x - 1)(x - 2)(x - 3)
        let roots = solve_quartic_real([-6.0, 11.0, -6.0, 1.0, 0.0]);
        assert_eq!(roots.len(), 3);
        assert_relative_eq!(roots[2], 3.0, epsilon = 1e-9);

        let roots = solve_quadratic_real([1.0, 0.0, 1.0]);
        assert!(roots.is_empty());
    }

    #[test]
    fn test_align_rigid_recovers_transform() -> Result<(), PoseError> {
        let gt = Pose::from_rvec(DVec3::new(0.2, -0.1, 0.4), DVec3::new(0.5, 1.0, -2.0));
        let src = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.2),
            DVec3::new(0.0, 1.0, -0.3),
            DVec3::new(0.3, 0.4, 1.0),
        ];
        let dst: Vec<DVec3> = src.iter().map(|&p| gt.transform_point(p)).collect();

        let est = align_rigid(&src, &dst)?;
        assert!(est.rotation.abs_diff_eq(gt.rotation, 1e-9));
        assert!(est.translation.abs_diff_eq(gt.translation, 1e-9));
        assert_relative_eq!(est.rotation.determinant(), 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_is_collinear() {
        let line: Vec<DVec3> = (0..5).map(|i| DVec3::splat(i as f64)).collect();
        assert!(is_collinear(&line, 1e-10));

        let plane = [DVec3::ZERO, DVec3::X, DVec3::Y];
        assert!(!is_collinear(&plane, 1e-10));
    }

    #[test]
    fn test_reprojection_error_behind_camera() {
        let camera = CameraModel::default();
        let pose = Pose::IDENTITY;
        assert!(reprojection_error(&camera, &pose, &[0.0, 0.0, -1.0], &[640.0, 480.0]).is_none());
        let err = reprojection_error(&camera, &pose, &[0.0, 0.0, 1.0], &[643.0, 484.0]);
        assert_eq!(err, Some(5.0));
        assert!(is_inlier(&camera, &pose, &[0.0, 0.0, 1.0], &[643.0, 484.0], 8.0));
    }
}
