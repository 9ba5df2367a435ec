//! Preemptive RANSAC camera pose estimation.
//!
//! A population of pose hypotheses is generated from random minimal samples
//! and then reduced by a tournament: every round scores the survivors against
//! a fresh random block of correspondences, keeps the better half by
//! cumulative outlier count and refines the survivors on their block inliers.
//! Each round costs `O(pool size * block size)` instead of scoring every
//! hypothesis against all correspondences.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::{check_lengths, PoseError};
use crate::hypothesis::{EvaluationBlock, HypothesisPool, MINIMAL_SAMPLE_SIZE};
use crate::pose::Pose;
use crate::solver::PnPSolver;

/// Parameters for preemptive RANSAC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptiveRansacParams {
    /// Pixel error threshold to classify an observation as an inlier.
    pub reproj_threshold_px: f64,
    /// Number of correspondences drawn for each scoring round.
    pub block_size: usize,
    /// Target number of initial hypotheses.
    pub num_hypotheses: usize,
    /// Maximum number of minimal samples drawn while seeding.
    pub max_sampling_iterations: usize,
    /// Minimum number of round inliers required to refine a hypothesis.
    pub min_refine_inliers: usize,
}

impl Default for PreemptiveRansacParams {
    fn default() -> Self {
        Self {
            reproj_threshold_px: 8.0,
            block_size: 500,
            num_hypotheses: 1024,
            max_sampling_iterations: 2048,
            min_refine_inliers: 5,
        }
    }
}

impl PreemptiveRansacParams {
    /// Set the inlier threshold in pixels.
    pub fn with_reproj_threshold_px(mut self, reproj_threshold_px: f64) -> Self {
        self.reproj_threshold_px = reproj_threshold_px;
        self
    }

    /// Set the evaluation block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the target number of initial hypotheses.
    pub fn with_num_hypotheses(mut self, num_hypotheses: usize) -> Self {
        self.num_hypotheses = num_hypotheses;
        self
    }

    /// Set the cap on minimal samples drawn while seeding.
    pub fn with_max_sampling_iterations(mut self, max_sampling_iterations: usize) -> Self {
        self.max_sampling_iterations = max_sampling_iterations;
        self
    }

    /// Set the minimum number of inliers needed to refine a hypothesis.
    pub fn with_min_refine_inliers(mut self, min_refine_inliers: usize) -> Self {
        self.min_refine_inliers = min_refine_inliers;
        self
    }
}

/// Result of [`preemptive_ransac`].
#[derive(Debug, Clone)]
pub struct PreemptivePoseEstimate {
    /// Camera pose in the world frame.
    pub world_from_camera: Pose,
    /// Inverse of `world_from_camera`.
    pub camera_from_world: Pose,
    /// Cumulative outlier count of the surviving hypothesis.
    pub loss: usize,
    /// Sorted correspondence indices that were inliers of the survivor in the last round.
    pub inliers: Vec<usize>,
    /// Number of hypotheses the tournament started with.
    pub num_hypotheses: usize,
    /// Number of tournament rounds executed.
    pub rounds: usize,
}

/// Estimate the camera pose with preemptive RANSAC.
///
/// The pool is seeded with up to `params.num_hypotheses` hypotheses from
/// three-point samples. While more than one hypothesis is alive, a round draws
/// `params.block_size` correspondences with replacement, accumulates the
/// outlier count of every hypothesis on that block, drops the worse half and
/// refines each survivor with at least `params.min_refine_inliers` inliers.
/// A pool of `K` hypotheses needs at most `ceil(log2(K))` rounds.
///
/// The block is drawn once per round and shared by all hypotheses; scoring and
/// refinement run in parallel across hypotheses.
///
/// # Errors
///
/// - [`PoseError::MismatchedArrayLengths`] if `world` and `image` differ in length.
/// - [`PoseError::InsufficientCorrespondences`] with fewer than three correspondences.
/// - [`PoseError::EmptyHypothesisPool`] if no minimal sample could be solved.
pub fn preemptive_ransac<S, R>(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    camera: &CameraModel,
    solver: &S,
    params: &PreemptiveRansacParams,
    rng: &mut R,
) -> Result<PreemptivePoseEstimate, PoseError>
where
    S: PnPSolver + Sync + ?Sized,
    R: Rng + ?Sized,
{
    check_lengths(world.len(), image.len())?;
    let n = world.len();
    if n < MINIMAL_SAMPLE_SIZE {
        return Err(PoseError::InsufficientCorrespondences {
            required: MINIMAL_SAMPLE_SIZE,
            actual: n,
        });
    }
    if n <= params.block_size {
        log::warn!(
            "preemptive RANSAC on {n} correspondences with a block of {}; blocks will repeat most points",
            params.block_size
        );
    }

    let mut pool = HypothesisPool::seed(
        world,
        image,
        camera,
        solver,
        params.num_hypotheses,
        params.max_sampling_iterations,
        rng,
    )?;
    let num_hypotheses = pool.len();

    let mut rounds = 0;
    let mut last_block = None;
    while pool.len() > 1 {
        rounds += 1;

        let block = EvaluationBlock::draw(world, image, params.block_size, rng);
        pool.score(&block, camera, solver, params.reproj_threshold_px);
        pool.prune();
        let failed = pool.refine(&block, camera, solver, params.min_refine_inliers);

        log::debug!(
            "round {rounds}: {} survivors, best loss {:?}, {failed} failed refinements",
            pool.len(),
            pool.best_loss()
        );
        last_block = Some(block);
    }

    let survivor = pool
        .into_survivor()
        .ok_or(PoseError::EmptyHypothesisPool { attempts: 0 })?;

    let mut inliers: Vec<usize> = match &last_block {
        Some(block) => survivor.inliers.iter().map(|&i| block.indices[i]).collect(),
        None => Vec::new(),
    };
    inliers.sort_unstable();
    inliers.dedup();

    log::info!(
        "preemptive RANSAC kept 1 of {num_hypotheses} hypotheses after {rounds} rounds (loss {})",
        survivor.loss
    );

    let camera_from_world = survivor.camera_from_world;
    Ok(PreemptivePoseEstimate {
        world_from_camera: camera_from_world.inverse(),
        camera_from_world,
        loss: survivor.loss,
        inliers,
        num_hypotheses,
        rounds,
    })
}
