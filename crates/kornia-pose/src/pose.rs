//! Rigid body transforms.

use glam::{DMat3, DQuat, DVec3};
use std::ops::Mul;

/// A rigid transform `dst_T_src` made of a rotation and a translation.
///
/// A point `p` in the source frame maps to `rotation * p + translation` in the
/// destination frame. The rotation is kept orthonormal with determinant +1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Rotation from the source to the destination frame.
    pub rotation: DMat3,
    /// Translation from the source to the destination frame.
    pub translation: DVec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: DMat3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a pose from a rotation matrix and a translation vector.
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pose from a row-major rotation matrix and a translation vector.
    pub fn from_rt(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        Self {
            rotation: DMat3::from_cols_array_2d(rotation).transpose(),
            translation: DVec3::from_array(*translation),
        }
    }

    /// Create a pose from a Rodrigues axis-angle vector and a translation.
    pub fn from_rvec(rvec: DVec3, translation: DVec3) -> Self {
        Self {
            rotation: DMat3::from_quat(DQuat::from_scaled_axis(rvec)),
            translation,
        }
    }

    /// Create a pose from the upper 3x4 block of a row-major homogeneous matrix.
    ///
    /// The bottom row is ignored.
    pub fn from_matrix(m: &[[f64; 4]; 4]) -> Self {
        let rotation = [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ];
        Self::from_rt(&rotation, &[m[0][3], m[1][3], m[2][3]])
    }

    /// Row-major 4x4 homogeneous matrix with bottom row `(0, 0, 0, 1)`.
    pub fn to_matrix(&self) -> [[f64; 4]; 4] {
        let r = self.rotation_rows();
        let t = self.translation;
        [
            [r[0][0], r[0][1], r[0][2], t.x],
            [r[1][0], r[1][1], r[1][2], t.y],
            [r[2][0], r[2][1], r[2][2], t.z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Row-major copy of the rotation matrix.
    pub fn rotation_rows(&self) -> [[f64; 3]; 3] {
        self.rotation.transpose().to_cols_array_2d()
    }

    /// Rodrigues axis-angle representation of the rotation.
    pub fn rvec(&self) -> DVec3 {
        let q = DQuat::from_mat3(&self.rotation).normalize();
        // keep the angle in [0, pi]
        let q = if q.w < 0.0 { -q } else { q };
        q.to_scaled_axis()
    }

    /// Inverse transform `src_T_dst`: `[R^T | -R^T t]`.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.transpose();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.translation
    }

    /// Origin of the destination frame expressed in the source frame, `-R^T t`.
    ///
    /// For a camera-from-world pose this is the camera center in world coordinates.
    pub fn camera_center(&self) -> DVec3 {
        -(self.rotation.transpose() * self.translation)
    }

    /// Project the rotation back onto SO(3) through a unit quaternion.
    pub fn orthonormalized(&self) -> Self {
        let q = DQuat::from_mat3(&self.rotation).normalize();
        Self {
            rotation: DMat3::from_quat(q),
            translation: self.translation,
        }
    }
}

impl Mul for Pose {
    type Output = Pose;

    /// Compose `a_T_b * b_T_c = a_T_c`.
    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            rotation: self.rotation * rhs.rotation,
            translation: self.rotation * rhs.translation + self.translation,
        }
    }
}
