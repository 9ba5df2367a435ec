//! Camera models and distortion handling for pose solvers.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Invalid camera intrinsics matrix
    #[error("Invalid camera intrinsics matrix: {0}")]
    InvalidIntrinsics(String),

    /// Invalid distortion parameters
    #[error("Invalid distortion parameters: {0}")]
    InvalidDistortion(String),
}

/// Represents the intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Create camera intrinsics from a 3x3 row-major intrinsics matrix.
    ///
    /// The matrix must have the form `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]` with
    /// strictly positive focal lengths.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> Result<Self, CameraError> {
        const TOL: f64 = 1e-12;
        let off_diagonal = [k[0][1], k[1][0], k[2][0], k[2][1]];
        if off_diagonal.iter().any(|v| v.abs() > TOL) || (k[2][2] - 1.0).abs() > TOL {
            return Err(CameraError::InvalidIntrinsics(
                "intrinsics matrix must have form [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]"
                    .to_string(),
            ));
        }
        if k[0][0] <= 0.0 || k[1][1] <= 0.0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                k[0][0], k[1][1]
            )));
        }

        Ok(Self {
            fx: k[0][0],
            fy: k[1][1],
            cx: k[0][2],
            cy: k[1][2],
        })
    }

    /// Convert to 3x3 row-major intrinsics matrix.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }
}

/// Polynomial distortion parameters of the Brown-Conrady rational model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolynomialDistortion {
    /// First radial coefficient (numerator).
    pub k1: f64,
    /// Second radial coefficient (numerator).
    pub k2: f64,
    /// Third radial coefficient (numerator).
    pub k3: f64,
    /// First radial coefficient (denominator).
    pub k4: f64,
    /// Second radial coefficient (denominator).
    pub k5: f64,
    /// Third radial coefficient (denominator).
    pub k6: f64,
    /// First tangential coefficient.
    pub p1: f64,
    /// Second tangential coefficient.
    pub p2: f64,
}

impl PolynomialDistortion {
    /// Create distortion parameters with all coefficients set to zero (no distortion).
    pub fn none() -> Self {
        Self::default()
    }

    /// Create distortion parameters with only the first two radial coefficients.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Self {
            k1,
            k2,
            ..Self::default()
        }
    }

    /// Create distortion parameters from a coefficient vector ordered as
    /// `(k1, k2, p1, p2[, k3[, k4, k5, k6]])`.
    ///
    /// Accepted lengths are 0, 4, 5 and 8. An empty slice yields zero distortion.
    pub fn from_coefficients(coeffs: &[f64]) -> Result<Self, CameraError> {
        let mut d = Self::default();
        match coeffs.len() {
            0 => {}
            4 | 5 | 8 => {
                d.k1 = coeffs[0];
                d.k2 = coeffs[1];
                d.p1 = coeffs[2];
                d.p2 = coeffs[3];
                if coeffs.len() >= 5 {
                    d.k3 = coeffs[4];
                }
                if coeffs.len() == 8 {
                    d.k4 = coeffs[5];
                    d.k5 = coeffs[6];
                    d.k6 = coeffs[7];
                }
            }
            n => {
                return Err(CameraError::InvalidDistortion(format!(
                    "expected 0, 4, 5 or 8 coefficients, got {n}"
                )))
            }
        }
        Ok(d)
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        [
            self.k1, self.k2, self.k3, self.k4, self.k5, self.k6, self.p1, self.p2,
        ]
        .iter()
        .any(|&c| c != 0.0)
    }

    /// Apply the distortion model to normalized image coordinates.
    pub fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        // radial distortion
        let kr = (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6);

        // tangential distortion
        let xy_2 = 2.0 * x * y;
        let xd = x * kr + xy_2 * self.p1 + self.p2 * (r2 + 2.0 * x * x);
        let yd = y * kr + self.p1 * (r2 + 2.0 * y * y) + xy_2 * self.p2;

        (xd, yd)
    }
}

/// A complete camera model with intrinsics and optional distortion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraModel {
    /// Camera intrinsics
    pub intrinsics: CameraIntrinsics,
    /// Distortion parameters (None for no distortion)
    pub distortion: Option<PolynomialDistortion>,
}

impl CameraModel {
    /// Create a camera model without distortion.
    pub fn pinhole(intrinsics: CameraIntrinsics) -> Self {
        Self {
            intrinsics,
            distortion: None,
        }
    }

    /// Create a camera model with distortion.
    pub fn with_distortion(intrinsics: CameraIntrinsics, distortion: PolynomialDistortion) -> Self {
        Self {
            intrinsics,
            distortion: Some(distortion),
        }
    }

    /// Create a camera model from an intrinsics matrix and a distortion coefficient vector.
    ///
    /// An empty or all-zero coefficient vector produces a pinhole model.
    pub fn from_calibration(k: &[[f64; 3]; 3], dist_coeffs: &[f64]) -> Result<Self, CameraError> {
        let intrinsics = CameraIntrinsics::from_matrix(k)?;
        let distortion = PolynomialDistortion::from_coefficients(dist_coeffs)?;
        Ok(if distortion.has_distortion() {
            Self::with_distortion(intrinsics, distortion)
        } else {
            Self::pinhole(intrinsics)
        })
    }

    /// Check if the camera has distortion.
    pub fn has_distortion(&self) -> bool {
        self.distortion.as_ref().is_some_and(|d| d.has_distortion())
    }

    /// Project a point given in the camera frame to pixel coordinates.
    ///
    /// Returns `None` for points with non-positive depth.
    pub fn project_point(&self, pc: DVec3) -> Option<[f64; 2]> {
        if pc.z <= f64::EPSILON {
            return None;
        }
        let inv_z = 1.0 / pc.z;
        let (x, y) = (pc.x * inv_z, pc.y * inv_z);
        let (xd, yd) = match &self.distortion {
            Some(d) => d.distort_normalized(x, y),
            None => (x, y),
        };
        let intr = &self.intrinsics;
        Some([intr.fx * xd + intr.cx, intr.fy * yd + intr.cy])
    }

    /// Undistort a pixel and return its normalized image coordinates.
    pub fn undistort_point(&self, pixel: &[f64; 2]) -> (f64, f64) {
        let intr = &self.intrinsics;
        let x = (pixel[0] - intr.cx) / intr.fx;
        let y = (pixel[1] - intr.cy) / intr.fy;

        let Some(distortion) = self.distortion.as_ref().filter(|d| d.has_distortion()) else {
            return (x, y);
        };

        // fixed point iteration starting from the distorted coordinates
        const MAX_ITERATIONS: usize = 20;
        const EPSILON: f64 = 1e-12;

        let (mut xu, mut yu) = (x, y);
        for _ in 0..MAX_ITERATIONS {
            let (xd, yd) = distortion.distort_normalized(xu, yu);
            let dx = x - xd;
            let dy = y - yd;
            xu += dx;
            yu += dy;
            if dx.abs() < EPSILON && dy.abs() < EPSILON {
                break;
            }
        }

        (xu, yu)
    }

    /// Unit bearing vector in the camera frame for a pixel observation.
    pub fn bearing(&self, pixel: &[f64; 2]) -> DVec3 {
        let (x, y) = self.undistort_point(pixel);
        DVec3::new(x, y, 1.0).normalize()
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::pinhole(CameraIntrinsics::new(1000.0, 1000.0, 640.0, 480.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_camera_intrinsics_from_matrix() -> Result<(), CameraError> {
        let k = [[1000.0, 0.0, 640.0], [0.0, 1000.0, 480.0], [0.0, 0.0, 1.0]];
        let intrinsics = CameraIntrinsics::from_matrix(&k)?;
        assert_eq!(intrinsics.fx, 1000.0);
        assert_eq!(intrinsics.fy, 1000.0);
        assert_eq!(intrinsics.cx, 640.0);
        assert_eq!(intrinsics.cy, 480.0);
        assert_eq!(intrinsics.to_matrix(), k);
        Ok(())
    }

    #[test]
    fn test_camera_intrinsics_rejects_skew() {
        let k = [[1000.0, 2.0, 640.0], [0.0, 1000.0, 480.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            CameraIntrinsics::from_matrix(&k),
            Err(CameraError::InvalidIntrinsics(_))
        ));
    }

    #[test]
    fn test_distortion_from_coefficients() -> Result<(), CameraError> {
        let d = PolynomialDistortion::from_coefficients(&[0.1, 0.01, 0.001, 0.002, 0.3])?;
        assert_eq!(d.k1, 0.1);
        assert_eq!(d.k2, 0.01);
        assert_eq!(d.p1, 0.001);
        assert_eq!(d.p2, 0.002);
        assert_eq!(d.k3, 0.3);
        assert!(!PolynomialDistortion::from_coefficients(&[])?.has_distortion());
        assert!(PolynomialDistortion::from_coefficients(&[0.1, 0.2]).is_err());
        Ok(())
    }

    #[test]
    fn test_from_calibration_zero_coeffs_is_pinhole() -> Result<(), CameraError> {
        let k = [[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]];
        let camera = CameraModel::from_calibration(&k, &[0.0; 5])?;
        assert!(camera.distortion.is_none());
        Ok(())
    }

    #[test]
    fn test_project_point_behind_camera() {
        let camera = CameraModel::default();
        assert!(camera.project_point(DVec3::new(0.0, 0.0, -1.0)).is_none());
        let uv = camera.project_point(DVec3::new(0.0, 0.0, 2.0));
        assert_eq!(uv, Some([640.0, 480.0]));
    }

    #[test]
    fn test_distort_undistort_roundtrip() {
        let intrinsics = CameraIntrinsics::new(1000.0, 1000.0, 640.0, 480.0);
        let distortion = PolynomialDistortion::radial(0.1, 0.01);
        let camera = CameraModel::with_distortion(intrinsics, distortion);

        let pc = DVec3::new(-0.3, 0.2, 1.0);
        let Some(uv) = camera.project_point(pc) else {
            panic!("point in front of the camera must project");
        };
        let (x, y) = camera.undistort_point(&uv);

        assert_relative_eq!(x, -0.3, epsilon = 1e-9);
        assert_relative_eq!(y, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_is_unit() {
        let camera = CameraModel::default();
        let b = camera.bearing(&[100.0, 900.0]);
        assert_relative_eq!(b.length(), 1.0, epsilon = 1e-12);
        assert!(b.z > 0.0);
    }
}
