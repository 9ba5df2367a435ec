//! Levenberg–Marquardt pose refinement.

use glam::{DMat3, DQuat, DVec3};
use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::{check_lengths, PoseError};
use crate::pose::Pose;

/// Parameters controlling the LM pose refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LMRefineParams {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the decrease of the squared reprojection error.
    pub eps: f64,
    /// Initial damping factor (lambda).
    pub lambda_init: f64,
    /// Multiplicative factor to increase/decrease lambda.
    pub lambda_mul: f64,
}

impl Default for LMRefineParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            eps: 1e-6,
            lambda_init: 1e-3,
            lambda_mul: 10.0,
        }
    }
}

impl LMRefineParams {
    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the convergence threshold.
    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Set the initial damping factor.
    pub fn with_lambda_init(mut self, lambda_init: f64) -> Self {
        self.lambda_init = lambda_init;
        self
    }

    /// Set the damping multiplier.
    pub fn with_lambda_mul(mut self, lambda_mul: f64) -> Self {
        self.lambda_mul = lambda_mul;
        self
    }
}

/// Outcome of [`refine_pose_lm`].
#[derive(Debug, Clone, Copy)]
pub struct RefineOutcome {
    /// Refined pose, world to camera.
    pub camera_from_world: Pose,
    /// Root-mean-square reprojection error in pixels over the points in front of the camera.
    pub rmse: f64,
    /// Number of LM iterations performed.
    pub iterations: usize,
    /// Whether the cost decrease fell below the threshold.
    pub converged: bool,
}

fn rotate(delta: DVec3, rotation: &DMat3) -> DMat3 {
    DMat3::from_quat(DQuat::from_scaled_axis(delta)) * *rotation
}

fn apply_step(pose: &Pose, step: &Vector6<f64>) -> Pose {
    Pose {
        rotation: rotate(DVec3::new(step[0], step[1], step[2]), &pose.rotation),
        translation: pose.translation + DVec3::new(step[3], step[4], step[5]),
    }
}

/// Write the residuals of all correspondences and return `(cost, num_valid)`.
///
/// Points behind the camera contribute a zero residual.
fn residuals(
    world: &[DVec3],
    image: &[[f64; 2]],
    camera: &CameraModel,
    pose: &Pose,
    out: &mut [f64],
) -> (f64, usize) {
    let mut cost = 0.0;
    let mut valid = 0;
    for (i, (pw, uv)) in world.iter().zip(image.iter()).enumerate() {
        match camera.project_point(pose.transform_point(*pw)) {
            Some(proj) => {
                let du = proj[0] - uv[0];
                let dv = proj[1] - uv[1];
                out[2 * i] = du;
                out[2 * i + 1] = dv;
                cost += du.mul_add(du, dv * dv);
                valid += 1;
            }
            None => {
                out[2 * i] = 0.0;
                out[2 * i + 1] = 0.0;
            }
        }
    }
    (cost, valid)
}

/// Analytic Jacobian of the pinhole projection with respect to a left
/// perturbation `[w, dt]` of the pose.
fn jacobian_pinhole(world: &[DVec3], camera: &CameraModel, pose: &Pose, jac: &mut [[f64; 6]]) {
    let intr = &camera.intrinsics;
    for (i, pw) in world.iter().enumerate() {
        let q = pose.rotation * *pw;
        let pc = q + pose.translation;
        if pc.z <= f64::EPSILON {
            jac[2 * i] = [0.0; 6];
            jac[2 * i + 1] = [0.0; 6];
            continue;
        }
        let inv_z = 1.0 / pc.z;
        let du = DVec3::new(intr.fx * inv_z, 0.0, -intr.fx * pc.x * inv_z * inv_z);
        let dv = DVec3::new(0.0, intr.fy * inv_z, -intr.fy * pc.y * inv_z * inv_z);
        // d(pc)/dw = -[q]x, so row . (-[q]x) = q x row
        let ru = q.cross(du);
        let rv = q.cross(dv);
        jac[2 * i] = [ru.x, ru.y, ru.z, du.x, du.y, du.z];
        jac[2 * i + 1] = [rv.x, rv.y, rv.z, dv.x, dv.y, dv.z];
    }
}

/// Central-difference Jacobian, used when the camera has lens distortion.
fn jacobian_numeric(
    world: &[DVec3],
    image: &[[f64; 2]],
    camera: &CameraModel,
    pose: &Pose,
    jac: &mut [[f64; 6]],
    res_p: &mut [f64],
    res_m: &mut [f64],
) {
    const H_ROT: f64 = 1e-6;
    let t_scale = pose.translation.abs().max_element().max(1.0);
    let h_trans = 1e-6 * t_scale;

    for k in 0..6 {
        let h = if k < 3 { H_ROT } else { h_trans };
        let mut step = Vector6::zeros();
        step[k] = h;
        residuals(world, image, camera, &apply_step(pose, &step), res_p);
        residuals(world, image, camera, &apply_step(pose, &(-step)), res_m);
        for (row, (p, m)) in jac.iter_mut().zip(res_p.iter().zip(res_m.iter())) {
            row[k] = (p - m) / (2.0 * h);
        }
    }
}

/// Refine a `camera_from_world` pose with Levenberg–Marquardt to minimize the
/// pixel reprojection error.
///
/// The rotation is updated multiplicatively on the left, `R <- exp(w) R`, and
/// the result is re-orthonormalized through a unit quaternion. Steps that move
/// any point behind the camera are rejected.
pub fn refine_pose_lm(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    initial: &Pose,
    params: &LMRefineParams,
) -> Result<RefineOutcome, PoseError> {
    check_lengths(world.len(), image.len())?;
    let n = world.len();
    if n < 3 {
        return Err(PoseError::InsufficientCorrespondences {
            required: 3,
            actual: n,
        });
    }

    let world: Vec<DVec3> = world.iter().map(|p| DVec3::from_array(*p)).collect();
    let numeric = camera.has_distortion();

    let mut pose = *initial;
    let mut res = vec![0.0; 2 * n];
    let mut res_new = vec![0.0; 2 * n];
    let mut res_m = if numeric { vec![0.0; 2 * n] } else { Vec::new() };
    let mut jac = vec![[0.0; 6]; 2 * n];

    let (mut cost, mut valid) = residuals(&world, image, camera, &pose, &mut res);
    if valid < 3 || !cost.is_finite() {
        return Err(PoseError::SolverFailed(format!(
            "only {valid} of {n} points lie in front of the initial pose"
        )));
    }

    let mut lambda = params.lambda_init;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations {
        iterations += 1;

        if numeric {
            jacobian_numeric(
                &world,
                image,
                camera,
                &pose,
                &mut jac,
                &mut res_new,
                &mut res_m,
            );
        } else {
            jacobian_pinhole(&world, camera, &pose, &mut jac);
        }

        // (J^T J + lambda I) delta = -J^T r
        let mut a = Matrix6::<f64>::zeros();
        let mut b = Vector6::<f64>::zeros();
        for (row, &r) in jac.iter().zip(res.iter()) {
            let j = Vector6::from_row_slice(row);
            a += j * j.transpose();
            b += j * r;
        }
        for d in 0..6 {
            a[(d, d)] += lambda;
        }

        let Some(chol) = a.cholesky() else {
            lambda *= params.lambda_mul;
            continue;
        };
        let delta = chol.solve(&(-b));

        let candidate = apply_step(&pose, &delta);
        let (cost_new, valid_new) = residuals(&world, image, camera, &candidate, &mut res_new);
        // a step may not hide points behind the camera to drop their residuals
        if cost_new.is_finite() && cost_new < cost && valid_new >= valid {
            let decrease = cost - cost_new;
            pose = candidate;
            cost = cost_new;
            valid = valid_new;
            std::mem::swap(&mut res, &mut res_new);
            if decrease < params.eps {
                converged = true;
                break;
            }
            lambda = (lambda / params.lambda_mul).max(1e-12);
        } else {
            lambda *= params.lambda_mul;
        }
    }

    let rmse = if valid > 0 {
        (cost / valid as f64).sqrt()
    } else {
        0.0
    };

    Ok(RefineOutcome {
        camera_from_world: pose.orthonormalized(),
        rmse,
        iterations,
        converged,
    })
}
