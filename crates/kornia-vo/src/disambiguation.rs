use glam::{DMat3, DVec3};

use crate::correspondence::CorrespondenceSet;
use crate::error::PoseError;
use crate::linalg;
use crate::pose::PoseCandidate;
use crate::triangulation::{MidpointTriangulator, ProjectionMatrix, TriangulationParams};

/// Which of several equally plausible candidates is returned.
#[derive(Clone, Copy, Debug, Default)]
pub enum TieBreak {
    /// The second tied candidate when two or more tie, otherwise the only one.
    #[default]
    SecondWhenTied,
    /// Always the first tied candidate.
    First,
    /// A caller supplied policy; the returned index is clamped to the tied set.
    Custom(fn(&[PoseCandidate]) -> usize),
}

impl TieBreak {
    /// Index of the chosen candidate among the tied ones (non empty).
    pub fn pick(&self, tied: &[PoseCandidate]) -> usize {
        let last = tied.len().saturating_sub(1);
        match self {
            TieBreak::SecondWhenTied => usize::from(tied.len() >= 2),
            TieBreak::First => 0,
            TieBreak::Custom(policy) => policy(tied).min(last),
        }
    }
}

/// Outcome of the cheirality vote.
#[derive(Clone, Debug)]
pub struct Disambiguation {
    /// Candidates tied at the minimum violation count, translation normalized.
    pub solutions: Vec<PoseCandidate>,
    /// Index of the returned candidate in `solutions`.
    pub selected: usize,
    /// Fraction of correspondences in front of both cameras for the best candidates.
    pub valid_fraction: f64,
    /// Violation count of every input candidate, in input order.
    pub violations: Vec<usize>,
    /// Number of correspondences of the selected candidate that could not be
    /// triangulated.
    pub degenerate_points: usize,
    /// Triangulated points of the selected candidate, in camera 1.
    pub points3d: Vec<DVec3>,
}

impl Disambiguation {
    /// The selected candidate.
    pub fn pose(&self) -> &PoseCandidate {
        &self.solutions[self.selected]
    }
}

struct CandidateVote {
    violations: usize,
    degenerate: usize,
    points: Vec<DVec3>,
}

/// Picks the physically realizable candidate by counting points that end up
/// behind either camera.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseDisambiguator {
    triangulator: MidpointTriangulator,
    tie_break: TieBreak,
}

impl PoseDisambiguator {
    /// Create a disambiguator.
    pub fn new(params: TriangulationParams, tie_break: TieBreak) -> Self {
        Self {
            triangulator: MidpointTriangulator::new(params),
            tie_break,
        }
    }

    /// The tie-break policy.
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Vote among `candidates` with the correspondences of `set`.
    ///
    /// `k` is the intrinsics matrix of the point coordinates (identity for
    /// calibrated points). Points that fail to triangulate do not vote.
    pub fn disambiguate(
        &self,
        candidates: &[PoseCandidate],
        k: &DMat3,
        set: &CorrespondenceSet,
    ) -> Result<Disambiguation, PoseError> {
        if candidates.is_empty() {
            return Err(PoseError::ImproperRotation);
        }
        if set.is_empty() {
            return Err(PoseError::DegenerateConfiguration(
                "no correspondences to triangulate".to_string(),
            ));
        }

        let p1 = ProjectionMatrix::identity(k);
        let mut votes: Vec<CandidateVote> = candidates
            .iter()
            .map(|c| self.vote(c, &p1, k, set))
            .collect();

        for (i, vote) in votes.iter().enumerate() {
            log::trace!(
                "candidate {i}: {} behind camera, {} degenerate",
                vote.violations,
                vote.degenerate
            );
        }

        let min = votes.iter().map(|v| v.violations).min().unwrap_or(0);
        let tied: Vec<usize> = (0..votes.len())
            .filter(|i| votes[*i].violations == min)
            .collect();
        let solutions: Vec<PoseCandidate> = tied.iter().map(|i| candidates[*i].normalized()).collect();

        let selected = self.tie_break.pick(&solutions).min(solutions.len() - 1);
        let violations = votes.iter().map(|v| v.violations).collect();
        let winner = votes.swap_remove(tied[selected]);

        let valid_fraction = 1.0 - min as f64 / set.len() as f64;
        log::debug!(
            "{} of {} candidates tied with {min} violations, picked #{selected}",
            solutions.len(),
            candidates.len()
        );

        Ok(Disambiguation {
            solutions,
            selected,
            valid_fraction,
            violations,
            degenerate_points: winner.degenerate,
            points3d: winner.points,
        })
    }

    fn vote(
        &self,
        candidate: &PoseCandidate,
        p1: &ProjectionMatrix,
        k: &DMat3,
        set: &CorrespondenceSet,
    ) -> CandidateVote {
        let p2 = ProjectionMatrix::from_pose(k, &candidate.rotation, &candidate.translation);
        let results = self
            .triangulator
            .triangulate(p1, &p2, set.points1(), set.points2());

        let points: Vec<DVec3> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        let degenerate = results.len() - points.len();

        let in_cam2 = linalg::transform_points(&points, &candidate.rotation, &candidate.translation);
        let violations = points
            .iter()
            .zip(in_cam2.iter())
            .filter(|(q1, q2)| q1.z < 0.0 || q2.z < 0.0)
            .count();

        CandidateVote {
            violations,
            degenerate,
            points,
        }
    }
}
