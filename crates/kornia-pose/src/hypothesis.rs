//! Population of candidate poses scored by the preemptive tournament.

use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;

use crate::camera::CameraModel;
use crate::error::PoseError;
use crate::pose::Pose;
use crate::solver::PnPSolver;

/// Number of correspondences in a minimal sample.
pub const MINIMAL_SAMPLE_SIZE: usize = 3;

/// A candidate pose with its accumulated score.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Candidate pose, world to camera.
    pub camera_from_world: Pose,
    /// Cumulative number of outliers over all scoring rounds.
    pub loss: usize,
    /// Block-local indices of the inliers found in the most recent round.
    pub inliers: Vec<usize>,
}

impl Hypothesis {
    /// Create a fresh hypothesis with zero loss and no inliers.
    pub fn new(camera_from_world: Pose) -> Self {
        Self {
            camera_from_world,
            loss: 0,
            inliers: Vec::new(),
        }
    }
}

/// A random subset of correspondences shared by all hypotheses in one round.
#[derive(Debug, Clone)]
pub struct EvaluationBlock {
    /// Correspondence indices, drawn with replacement.
    pub indices: Vec<usize>,
    /// World points of the block.
    pub world: Vec<[f64; 3]>,
    /// Pixel observations of the block.
    pub image: Vec<[f64; 2]>,
}

impl EvaluationBlock {
    /// Draw `size` correspondence indices uniformly with replacement.
    pub fn draw<R: Rng + ?Sized>(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        size: usize,
        rng: &mut R,
    ) -> Self {
        let n = world.len().min(image.len());
        let indices: Vec<usize> = if n == 0 {
            Vec::new()
        } else {
            (0..size).map(|_| rng.random_range(0..n)).collect()
        };
        Self {
            world: indices.iter().map(|&i| world[i]).collect(),
            image: indices.iter().map(|&i| image[i]).collect(),
            indices,
        }
    }

    /// Number of entries in the block.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the block is empty.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Draw [`MINIMAL_SAMPLE_SIZE`] distinct correspondence indices.
pub fn draw_minimal_sample<R: Rng + ?Sized>(
    num_correspondences: usize,
    rng: &mut R,
) -> Result<[usize; MINIMAL_SAMPLE_SIZE], PoseError> {
    if num_correspondences < MINIMAL_SAMPLE_SIZE {
        return Err(PoseError::InsufficientCorrespondences {
            required: MINIMAL_SAMPLE_SIZE,
            actual: num_correspondences,
        });
    }
    let sample = index::sample(rng, num_correspondences, MINIMAL_SAMPLE_SIZE);
    Ok([sample.index(0), sample.index(1), sample.index(2)])
}

/// The set of live hypotheses of a preemptive RANSAC run.
///
/// The pool owns every hypothesis; pruning drops the worse half in place.
#[derive(Debug, Clone, Default)]
pub struct HypothesisPool {
    hypotheses: Vec<Hypothesis>,
}

impl HypothesisPool {
    /// Create a pool from existing poses, each with zero loss.
    pub fn from_poses(poses: impl IntoIterator<Item = Pose>) -> Self {
        Self {
            hypotheses: poses.into_iter().map(Hypothesis::new).collect(),
        }
    }

    /// Seed the pool by solving random minimal samples.
    ///
    /// Sampling stops when `target` hypotheses were generated or after
    /// `max_attempts` samples. Solver failures are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PoseError::EmptyHypothesisPool`] when no sample produced a pose.
    pub fn seed<S, R>(
        world: &[[f64; 3]],
        image: &[[f64; 2]],
        camera: &CameraModel,
        solver: &S,
        target: usize,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<Self, PoseError>
    where
        S: PnPSolver + ?Sized,
        R: Rng + ?Sized,
    {
        crate::error::check_lengths(world.len(), image.len())?;

        let mut hypotheses = Vec::with_capacity(target.min(max_attempts));
        let mut attempts = 0;
        let mut failures = 0;

        while hypotheses.len() < target && attempts < max_attempts {
            attempts += 1;
            let sample = draw_minimal_sample(world.len(), rng)?;
            let w = sample.map(|i| world[i]);
            let p = sample.map(|i| image[i]);
            match solver.solve(&w, &p, camera, None) {
                Ok(pose) => hypotheses.push(Hypothesis::new(pose)),
                Err(_) => failures += 1,
            }
        }

        log::debug!(
            "seeded {} hypotheses from {attempts} samples ({failures} solver failures)",
            hypotheses.len()
        );

        if hypotheses.is_empty() {
            return Err(PoseError::EmptyHypothesisPool { attempts });
        }
        Ok(Self { hypotheses })
    }

    /// Number of live hypotheses.
    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    /// Live hypotheses, in pool order.
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Score every hypothesis against the block.
    ///
    /// Each block entry whose reprojection error exceeds `threshold_px`, or
    /// that projects behind the camera, adds one to the hypothesis loss. The
    /// inlier set is replaced by the block-local indices of this round.
    pub fn score<S>(
        &mut self,
        block: &EvaluationBlock,
        camera: &CameraModel,
        solver: &S,
        threshold_px: f64,
    ) where
        S: PnPSolver + Sync + ?Sized,
    {
        self.hypotheses.par_iter_mut().for_each(|h| {
            let projected = solver.project(&block.world, &h.camera_from_world, camera);
            h.inliers.clear();
            for (i, (proj, uv)) in projected.iter().zip(block.image.iter()).enumerate() {
                match proj {
                    Some(p) if (p[0] - uv[0]).hypot(p[1] - uv[1]) <= threshold_px => {
                        h.inliers.push(i)
                    }
                    _ => h.loss += 1,
                }
            }
        });
    }

    /// Keep the better half of the pool, ranked by cumulative loss.
    ///
    /// A pool with a single hypothesis is left untouched.
    pub fn prune(&mut self) {
        if self.hypotheses.len() <= 1 {
            return;
        }
        self.hypotheses.sort_unstable_by_key(|h| h.loss);
        self.hypotheses.truncate(self.hypotheses.len() / 2);
    }

    /// Refine every hypothesis with at least `min_inliers` inliers in the
    /// current round, seeded by its own pose and restricted to those inliers.
    ///
    /// A failed refinement keeps the previous pose. Returns the number of
    /// failed refinements.
    pub fn refine<S>(
        &mut self,
        block: &EvaluationBlock,
        camera: &CameraModel,
        solver: &S,
        min_inliers: usize,
    ) -> usize
    where
        S: PnPSolver + Sync + ?Sized,
    {
        self.hypotheses
            .par_iter_mut()
            .filter(|h| h.inliers.len() >= min_inliers)
            .map(|h| {
                let world: Vec<[f64; 3]> = h.inliers.iter().map(|&i| block.world[i]).collect();
                let image: Vec<[f64; 2]> = h.inliers.iter().map(|&i| block.image[i]).collect();
                match solver.solve(&world, &image, camera, Some(&h.camera_from_world)) {
                    Ok(pose) => {
                        h.camera_from_world = pose;
                        0
                    }
                    Err(e) => {
                        log::debug!("refinement on {} inliers failed: {e}", world.len());
                        1
                    }
                }
            })
            .sum()
    }

    /// Lowest loss among the live hypotheses.
    pub fn best_loss(&self) -> Option<usize> {
        self.hypotheses.iter().map(|h| h.loss).min()
    }

    /// Consume the pool and return its best hypothesis.
    pub fn into_survivor(self) -> Option<Hypothesis> {
        self.hypotheses.into_iter().min_by_key(|h| h.loss)
    }
}
