#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Kornia Pose
//!
//! Camera pose estimation from 2D-3D point correspondences with a high
//! fraction of mismatches, for visual relocalization and loop closure.
//!
//! ## Key Features
//!
//! - **Preemptive RANSAC**: hypothesis tournament scored on random blocks of correspondences
//! - **Single-shot RANSAC**: P3P + LM robust solve with reprojection diagnostics
//! - **Pose utilities**: rotation/quaternion/Euler conversions and pose distances
//! - **Distortion Handling**: Brown-Conrady lens distortion in projection and bearings
//!
//! ## Example: Preemptive RANSAC
//!
//! ```rust
//! use kornia_pose::{preemptive_ransac, CameraModel, P3PSolver, PreemptiveRansacParams};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! # let world: Vec<[f64; 3]> = (0..20)
//! #     .map(|i| [(i % 5) as f64 * 0.2 - 0.4, (i / 5) as f64 * 0.2 - 0.4, 4.0 + (i % 3) as f64 * 0.1])
//! #     .collect();
//! # let camera = CameraModel::default();
//! # let image: Vec<[f64; 2]> = world
//! #     .iter()
//! #     .filter_map(|p| camera.project_point(glam::DVec3::from_array(*p)))
//! #     .collect();
//! let params = PreemptiveRansacParams::default()
//!     .with_num_hypotheses(64)
//!     .with_block_size(16);
//! let mut rng = StdRng::seed_from_u64(0);
//!
//! let estimate = preemptive_ransac(&world, &image, &camera, &P3PSolver::default(), &params, &mut rng)?;
//! println!("camera center: {:?}", estimate.world_from_camera.translation);
//! # Ok::<(), kornia_pose::PoseError>(())
//! ```

/// Camera intrinsics, lens distortion and projection.
pub mod camera;

/// Error types for the pose estimation pipeline.
pub mod error;

/// Candidate poses and the hypothesis pool of the preemptive tournament.
pub mod hypothesis;

/// Perspective-3-Point minimal solver.
pub mod p3p;

/// Rigid transforms between world and camera frames.
pub mod pose;

/// Preemptive RANSAC engine.
pub mod preemptive;

/// Single-shot robust estimation and reprojection diagnostics.
pub mod ransac;

/// Levenberg–Marquardt pose refinement.
pub mod refine;

/// Rotation representations and pose comparison.
pub mod rotation;

/// The geometry solver interface and its default implementation.
pub mod solver;

mod ops;

pub use camera::{CameraError, CameraIntrinsics, CameraModel, PolynomialDistortion};
pub use error::PoseError;
pub use hypothesis::{EvaluationBlock, Hypothesis, HypothesisPool};
pub use pose::Pose;
pub use preemptive::{preemptive_ransac, PreemptivePoseEstimate, PreemptiveRansacParams};
pub use ransac::{
    count_bad_reprojections, estimate_camera_pose, solve_pnp_ransac, CameraPoseEstimate,
    PnPRansacResult, RobustPoseParams,
};
pub use refine::{refine_pose_lm, LMRefineParams};
pub use rotation::{
    pose_distance, quaternion_to_rotation, rotation_to_euler_angles, rotation_to_quaternion,
};
pub use solver::{P3PSolver, PnPSolver};
