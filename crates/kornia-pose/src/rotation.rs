//! Rotation representations and pose comparison.

use glam::{DMat3, DQuat, DVec3};

use crate::pose::Pose;

#[inline]
fn sign(x: f64) -> f64 {
    if x >= 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Convert an orthonormal rotation matrix to a unit quaternion.
///
/// The component with the largest magnitude is used as pivot and the signs of
/// the remaining components are recovered from the off-diagonal terms, which
/// keeps the conversion stable close to 180 degree rotations. The scalar part
/// `w` is non-negative whenever it is the pivot.
///
/// The four squared-magnitude candidates always sum to one, so at least one of
/// them is a pivot and the final normalization never divides by zero.
pub fn rotation_to_quaternion(rotation: &DMat3) -> DQuat {
    let [[r11, r12, r13], [r21, r22, r23], [r31, r32, r33]] =
        rotation.transpose().to_cols_array_2d();

    let mut q0 = ((r11 + r22 + r33 + 1.0) / 4.0).max(0.0).sqrt();
    let mut q1 = ((r11 - r22 - r33 + 1.0) / 4.0).max(0.0).sqrt();
    let mut q2 = ((-r11 + r22 - r33 + 1.0) / 4.0).max(0.0).sqrt();
    let mut q3 = ((-r11 - r22 + r33 + 1.0) / 4.0).max(0.0).sqrt();

    if q0 >= q1 && q0 >= q2 && q0 >= q3 {
        q1 *= sign(r32 - r23);
        q2 *= sign(r13 - r31);
        q3 *= sign(r21 - r12);
    } else if q1 >= q2 && q1 >= q3 {
        q0 *= sign(r32 - r23);
        q2 *= sign(r21 + r12);
        q3 *= sign(r13 + r31);
    } else if q2 >= q3 {
        q0 *= sign(r13 - r31);
        q1 *= sign(r21 + r12);
        q3 *= sign(r32 + r23);
    } else {
        q0 *= sign(r21 - r12);
        q1 *= sign(r31 + r13);
        q2 *= sign(r32 + r23);
    }

    let norm = (q0 * q0 + q1 * q1 + q2 * q2 + q3 * q3).sqrt();
    DQuat::from_xyzw(q1 / norm, q2 / norm, q3 / norm, q0 / norm)
}

/// Convert a unit quaternion to a rotation matrix.
pub fn quaternion_to_rotation(q: &DQuat) -> DMat3 {
    DMat3::from_quat(q.normalize())
}

/// Decompose a rotation matrix into three angles in degrees.
///
/// Uses the decomposition from "Euler angle computation" (M. Day, 2012):
///
/// - `theta_x = atan2(r12, r22)`
/// - `theta_y = atan2(-r02, hypot(r00, r01))`
/// - `theta_z = atan2(sin(theta_x) r20 - cos(theta_x) r10, cos(theta_x) r11 - sin(theta_x) r21)`
///
/// with `rij` the row `i`, column `j` entry. Gimbal lock (`hypot(r00, r01) ~ 0`)
/// is not treated specially.
pub fn rotation_to_euler_angles(rotation: &DMat3) -> DVec3 {
    let r = rotation.transpose().to_cols_array_2d();

    let theta1 = r[1][2].atan2(r[2][2]);
    let c2 = r[0][0].hypot(r[0][1]);
    let theta2 = (-r[0][2]).atan2(c2);
    let (s1, c1) = theta1.sin_cos();
    let theta3 = (s1 * r[2][0] - c1 * r[1][0]).atan2(c1 * r[1][1] - s1 * r[2][1]);

    DVec3::new(theta1.to_degrees(), theta2.to_degrees(), theta3.to_degrees())
}

/// Distance between two poses.
///
/// Returns `(angle_degrees, euclidean_distance)` where the angle is the
/// geodesic distance between the two rotations computed on unit quaternions as
/// `2 acos(|q1 . q2|)`, in `[0, 180]`, and the distance is the L2 norm of the
/// translation difference.
pub fn pose_distance(src: &Pose, dst: &Pose) -> (f64, f64) {
    let q1 = rotation_to_quaternion(&src.rotation);
    let q2 = rotation_to_quaternion(&dst.rotation);

    let dot = q1.dot(q2).abs().clamp(-1.0, 1.0);
    let angle = (2.0 * dot.acos()).to_degrees();

    let distance = (src.translation - dst.translation).length();

    (angle, distance)
}
