use glam::{DMat3, DVec2, DVec3};
use rand::prelude::*;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::correspondence::CorrespondenceSet;
use crate::error::PoseError;
use crate::linalg;
use crate::pose::{
    essential_8point, has_collinear_triplet, has_degenerate_layout, homography_dlt,
    homography_transfer_error, sampson_distance, TwoViewModel,
};

/// Per-direction error cap of the essential score.
const ESSENTIAL_SCORE_THRESHOLD: f64 = 4.0;

/// Per-direction error cap of the homography score.
const HOMOGRAPHY_SCORE_THRESHOLD: f64 = 6.0;

/// Redraws allowed per iteration when a sample is rejected as degenerate.
const MAX_SAMPLE_ATTEMPTS: usize = 10;

/// Parameters for least-median-of-squares model estimation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmedsParams {
    /// Probability that at least one drawn sample is outlier free.
    pub confidence: f64,
    /// Assumed fraction of outliers, used to size the number of iterations.
    pub outlier_ratio: f64,
    /// Maximum number of sampling iterations.
    pub max_iterations: usize,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
    /// Refit the best model on all of its inliers.
    pub refine: bool,
}

impl Default for LmedsParams {
    fn default() -> Self {
        Self {
            confidence: 0.99,
            outlier_ratio: 0.45,
            max_iterations: 1000,
            random_seed: Some(0),
            refine: true,
        }
    }
}

impl LmedsParams {
    /// Number of samples needed to draw an outlier free one with the configured
    /// confidence, capped by `max_iterations`.
    pub fn num_iterations(&self, sample_size: usize) -> usize {
        let num = (1.0 - self.confidence).max(f64::MIN_POSITIVE);
        let denom = 1.0 - (1.0 - self.outlier_ratio).powi(sample_size as i32);
        if denom < f64::MIN_POSITIVE {
            return 0;
        }

        let num = num.ln();
        let denom = denom.ln();
        if denom >= 0.0 || -num >= self.max_iterations as f64 * (-denom) {
            self.max_iterations
        } else {
            (num / denom).round() as usize
        }
    }
}

/// Result of a robust model fit.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionModel {
    /// Estimated model.
    pub model: TwoViewModel,
    /// Per-correspondence inlier mask.
    pub inliers: Vec<bool>,
    /// Total inlier count.
    pub inlier_count: usize,
    /// Clipped symmetric transfer score over the inliers (higher is better).
    pub score: f64,
}

/// A minimal solver plugged into the least-median-of-squares loop.
trait TwoViewSolver {
    /// Number of correspondences in a minimal sample.
    const SAMPLE_SIZE: usize;

    /// Fit a model to a sample (or to all inliers when refining).
    fn fit(x1: &[DVec2], x2: &[DVec2]) -> Option<DMat3>;

    /// Squared residual of one correspondence.
    fn residual(model: &DMat3, x1: &DVec2, x2: &DVec2) -> f64;

    /// Reject samples that cannot produce a meaningful model.
    fn accept_sample(_x1: &[DVec2], _x2: &[DVec2]) -> bool {
        true
    }
}

struct EssentialSolver;

impl TwoViewSolver for EssentialSolver {
    const SAMPLE_SIZE: usize = 8;

    fn fit(x1: &[DVec2], x2: &[DVec2]) -> Option<DMat3> {
        essential_8point(x1, x2)
    }

    fn residual(model: &DMat3, x1: &DVec2, x2: &DVec2) -> f64 {
        sampson_distance(model, x1, x2)
    }

    fn accept_sample(x1: &[DVec2], x2: &[DVec2]) -> bool {
        !has_degenerate_layout(x1) && !has_degenerate_layout(x2)
    }
}

struct HomographySolver;

impl TwoViewSolver for HomographySolver {
    const SAMPLE_SIZE: usize = 4;

    fn fit(x1: &[DVec2], x2: &[DVec2]) -> Option<DMat3> {
        homography_dlt(x1, x2)
    }

    fn residual(model: &DMat3, x1: &DVec2, x2: &DVec2) -> f64 {
        homography_transfer_error(model, x1, x2)
    }

    fn accept_sample(x1: &[DVec2], x2: &[DVec2]) -> bool {
        !has_collinear_triplet(x1) && !has_collinear_triplet(x2)
    }
}

struct LmedsFit {
    model: DMat3,
    inliers: Vec<bool>,
    inlier_count: usize,
}

/// Estimate an essential matrix with least-median-of-squares and the 8-point solver.
///
/// Residuals are squared Sampson distances in calibrated coordinates.
pub fn estimate_essential(
    set: &CorrespondenceSet,
    params: &LmedsParams,
) -> Result<MotionModel, PoseError> {
    let fit = lmeds::<EssentialSolver>(set, params)?;
    let score = essential_score(&fit.model, set, &fit.inliers);
    log::debug!(
        "essential: {}/{} inliers, score {:.3}",
        fit.inlier_count,
        set.len(),
        score
    );
    Ok(MotionModel {
        model: TwoViewModel::Essential(fit.model),
        inliers: fit.inliers,
        inlier_count: fit.inlier_count,
        score,
    })
}

/// Estimate a homography with least-median-of-squares and the 4-point DLT solver.
///
/// Residuals are squared forward transfer errors in calibrated coordinates.
pub fn estimate_homography(
    set: &CorrespondenceSet,
    params: &LmedsParams,
) -> Result<MotionModel, PoseError> {
    let fit = lmeds::<HomographySolver>(set, params)?;
    let score = homography_score(&fit.model, set, &fit.inliers);
    log::debug!(
        "homography: {}/{} inliers, score {:.3}",
        fit.inlier_count,
        set.len(),
        score
    );
    Ok(MotionModel {
        model: TwoViewModel::Homography(fit.model),
        inliers: fit.inliers,
        inlier_count: fit.inlier_count,
        score,
    })
}

/// Clipped symmetric epipolar score of `e` over the masked correspondences.
///
/// For each pair, the squared distance of each point to the epipolar line of its
/// counterpart contributes `max(4 - d, 0)`. A perfect fit scores `8` per pair.
pub fn essential_score(e: &DMat3, set: &CorrespondenceSet, mask: &[bool]) -> f64 {
    set.iter()
        .zip(mask.iter())
        .filter(|(_, inlier)| **inlier)
        .map(|((p1, p2), _)| {
            let x1 = p1.extend(1.0);
            let x2 = p2.extend(1.0);
            // line of p2 in image 1 and of p1 in image 2
            let e1 = point_line_error(x1, e.transpose() * x2);
            let e2 = point_line_error(x2, *e * x1);
            clipped(ESSENTIAL_SCORE_THRESHOLD, e1) + clipped(ESSENTIAL_SCORE_THRESHOLD, e2)
        })
        .sum()
}

/// Clipped symmetric transfer score of `h` over the masked correspondences.
///
/// Forward (`H p1` vs `p2`) and backward (`H^-1 p2` vs `p1`) squared transfer
/// errors each contribute `max(6 - d, 0)`. A perfect fit scores `12` per pair.
pub fn homography_score(h: &DMat3, set: &CorrespondenceSet, mask: &[bool]) -> f64 {
    let h_inv = linalg::try_inverse(h);
    set.iter()
        .zip(mask.iter())
        .filter(|(_, inlier)| **inlier)
        .map(|((p1, p2), _)| {
            let forward = homography_transfer_error(h, p1, p2);
            let backward = h_inv
                .map(|h_inv| homography_transfer_error(&h_inv, p2, p1))
                .unwrap_or(f64::INFINITY);
            clipped(HOMOGRAPHY_SCORE_THRESHOLD, forward)
                + clipped(HOMOGRAPHY_SCORE_THRESHOLD, backward)
        })
        .sum()
}

fn point_line_error(point: DVec3, line: DVec3) -> f64 {
    let norm = line.x * line.x + line.y * line.y;
    if norm <= f64::EPSILON {
        return f64::INFINITY;
    }
    let d = point.dot(line);
    d * d / norm
}

fn clipped(threshold: f64, error: f64) -> f64 {
    if error.is_finite() {
        (threshold - error).max(0.0)
    } else {
        0.0
    }
}

fn lmeds<S: TwoViewSolver>(
    set: &CorrespondenceSet,
    params: &LmedsParams,
) -> Result<LmedsFit, PoseError> {
    let n = set.len();
    let (x1, x2) = (set.points1(), set.points2());
    if n < S::SAMPLE_SIZE {
        return Err(PoseError::DegenerateConfiguration(format!(
            "need at least {} correspondences, got {n}",
            S::SAMPLE_SIZE
        )));
    }

    let mut rng = match params.random_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => {
            let mut tr = rand::rng();
            StdRng::from_rng(&mut tr)
        }
    };

    let iterations = if n == S::SAMPLE_SIZE {
        1
    } else {
        params.num_iterations(S::SAMPLE_SIZE).max(1)
    };

    let mut s1 = Vec::with_capacity(S::SAMPLE_SIZE);
    let mut s2 = Vec::with_capacity(S::SAMPLE_SIZE);
    let mut residuals = vec![0.0; n];
    let mut scratch = vec![0.0; n];
    let mut best_model = None;
    let mut best_median = f64::INFINITY;

    for _ in 0..iterations {
        let mut accepted = false;
        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let sample = rand::seq::index::sample(&mut rng, n, S::SAMPLE_SIZE);
            s1.clear();
            s2.clear();
            for idx in sample.iter() {
                s1.push(x1[idx]);
                s2.push(x2[idx]);
            }
            if S::accept_sample(&s1, &s2) {
                accepted = true;
                break;
            }
        }
        if !accepted {
            continue;
        }

        let Some(model) = S::fit(&s1, &s2) else {
            continue;
        };

        compute_residuals::<S>(&model, x1, x2, &mut residuals);
        scratch.copy_from_slice(&residuals);
        let median = median(&mut scratch);
        if median.is_finite() && median < best_median {
            best_median = median;
            best_model = Some(model);
        }
    }

    let Some(mut model) = best_model else {
        return Err(PoseError::DegenerateConfiguration(
            "no sample produced a finite median residual".to_string(),
        ));
    };

    // robust standard deviation from the minimum median
    let dof = (n - S::SAMPLE_SIZE).max(1) as f64;
    let sigma = (2.5 * 1.4826 * (1.0 + 5.0 / dof) * best_median.sqrt()).max(0.001);
    let threshold = sigma * sigma;

    compute_residuals::<S>(&model, x1, x2, &mut residuals);
    let mut inliers = inlier_mask(&residuals, threshold);
    let mut inlier_count = inliers.iter().filter(|m| **m).count();

    if params.refine && inlier_count > S::SAMPLE_SIZE {
        let (r1, r2): (Vec<DVec2>, Vec<DVec2>) = set
            .iter()
            .zip(inliers.iter())
            .filter(|(_, inlier)| **inlier)
            .map(|((p1, p2), _)| (*p1, *p2))
            .unzip();

        match S::fit(&r1, &r2) {
            Some(refit) => {
                compute_residuals::<S>(&refit, x1, x2, &mut residuals);
                let refit_inliers = inlier_mask(&residuals, threshold);
                let refit_count = refit_inliers.iter().filter(|m| **m).count();
                if refit_count >= inlier_count {
                    model = refit;
                    inliers = refit_inliers;
                    inlier_count = refit_count;
                } else {
                    log::warn!(
                        "refit rejected: support dropped from {inlier_count} to {refit_count}"
                    );
                }
            }
            None => log::warn!("refit on {inlier_count} inliers failed"),
        }
    }

    log::trace!(
        "lmeds: {iterations} iterations, median {best_median:.3e}, sigma {sigma:.3e}"
    );

    Ok(LmedsFit {
        model,
        inliers,
        inlier_count,
    })
}

fn compute_residuals<S: TwoViewSolver>(
    model: &DMat3,
    x1: &[DVec2],
    x2: &[DVec2],
    out: &mut [f64],
) {
    for ((r, p1), p2) in out.iter_mut().zip(x1.iter()).zip(x2.iter()) {
        let e = S::residual(model, p1, p2);
        *r = if e.is_nan() { f64::INFINITY } else { e };
    }
}

fn inlier_mask(residuals: &[f64], threshold: f64) -> Vec<bool> {
    residuals.iter().map(|r| *r <= threshold).collect()
}

/// Upper median; reorders `values`.
fn median(values: &mut [f64]) -> f64 {
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}
