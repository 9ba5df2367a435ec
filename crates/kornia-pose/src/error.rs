use thiserror::Error;

use crate::camera::CameraError;

/// Error types for the pose estimation pipeline.
#[derive(Debug, Error)]
pub enum PoseError {
    /// Invalid input data - insufficient correspondences for the specific solver.
    #[error("pose solver requires at least {required} 2D-3D correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences required by the solver.
        required: usize,
        /// Actual number of correspondences provided.
        actual: usize,
    },

    /// Invalid input data - mismatched array lengths with descriptive labels.
    #[error("Mismatched array lengths: {left_name} ({left_len}) != {right_name} ({right_len})")]
    MismatchedArrayLengths {
        /// Label for the left-hand slice.
        left_name: &'static str,
        /// Length of the left-hand slice.
        left_len: usize,
        /// Label for the right-hand slice.
        right_name: &'static str,
        /// Length of the right-hand slice.
        right_len: usize,
    },

    /// The point configuration does not constrain a unique pose (e.g. collinear points).
    #[error("degenerate point configuration: {0}")]
    DegenerateConfiguration(&'static str),

    /// The geometry solver could not produce a pose for the given sample.
    #[error("pose solver failed: {0}")]
    SolverFailed(String),

    /// Hypothesis seeding produced no candidate pose.
    #[error("no pose hypothesis could be generated after {attempts} sampling attempts")]
    EmptyHypothesisPool {
        /// Number of minimal samples drawn before giving up.
        attempts: usize,
    },

    /// The best model does not have enough inliers to be trusted.
    #[error("robust estimation requires at least {required} inliers, got {actual}")]
    InsufficientInliers {
        /// Minimum number of inliers required.
        required: usize,
        /// Number of inliers of the best model.
        actual: usize,
    },

    /// No minimal sample produced a valid model.
    #[error("no valid pose model found after {iterations} iterations")]
    NoModelFound {
        /// Number of iterations performed.
        iterations: usize,
    },

    /// Camera model error.
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Check that the world and image slices are index-aligned.
pub(crate) fn check_lengths(world_len: usize, image_len: usize) -> Result<(), PoseError> {
    if world_len != image_len {
        return Err(PoseError::MismatchedArrayLengths {
            left_name: "world points",
            left_len: world_len,
            right_name: "image points",
            right_len: image_len,
        });
    }
    Ok(())
}
