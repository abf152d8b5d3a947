use glam::{DMat3, DVec2};
use serde::{Deserialize, Serialize};

use crate::camera::PointNormalizer;
use crate::correspondence::CorrespondenceSet;
use crate::disambiguation::{PoseDisambiguator, TieBreak};
use crate::error::PoseError;
use crate::estimator::{estimate_essential, estimate_homography, LmedsParams};
use crate::pose::RelativePose;
use crate::selection::{ModelSelector, SelectionParams};
use crate::triangulation::TriangulationParams;

/// Configuration of the relative pose pipeline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Frame pairs with fewer correspondences are rejected.
    pub min_matches: usize,
    /// Only every n-th inlier takes part in the cheirality vote.
    pub disambiguation_stride: usize,
    /// Estimation settings for the essential matrix.
    pub essential: LmedsParams,
    /// Estimation settings for the homography.
    pub homography: LmedsParams,
    /// Model selection thresholds.
    pub selection: SelectionParams,
    /// Triangulation settings.
    pub triangulation: TriangulationParams,
    /// Tie-break policy of the cheirality vote.
    #[serde(skip)]
    pub tie_break: TieBreak,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_matches: 100,
            disambiguation_stride: 2,
            essential: LmedsParams::default(),
            homography: LmedsParams::default(),
            selection: SelectionParams::default(),
            triangulation: TriangulationParams::default(),
            tie_break: TieBreak::default(),
        }
    }
}

/// Estimates the relative pose between two frames from point correspondences.
///
/// The pipeline fits a homography and an essential matrix, selects one of them,
/// decomposes it into candidate poses and keeps the candidate that places the
/// most triangulated inliers in front of both cameras.
#[derive(Clone, Debug, Default)]
pub struct RelativePoseResolver {
    config: ResolverConfig,
    selector: ModelSelector,
    disambiguator: PoseDisambiguator,
}

impl RelativePoseResolver {
    /// Create a resolver from its configuration.
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            selector: ModelSelector::new(config.selection),
            disambiguator: PoseDisambiguator::new(config.triangulation, config.tie_break),
            config,
        }
    }

    /// The resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the pose from two index-aligned pixel lists.
    pub fn resolve(
        &self,
        normalizer: &PointNormalizer,
        pixels1: &[DVec2],
        pixels2: &[DVec2],
    ) -> Result<RelativePose, PoseError> {
        let set = CorrespondenceSet::from_pixels(normalizer, pixels1, pixels2)?;
        self.resolve_calibrated(&set)
    }

    /// Resolve the pose from keypoints and `(query, train)` index matches.
    pub fn resolve_matches(
        &self,
        normalizer: &PointNormalizer,
        keypoints1: &[DVec2],
        keypoints2: &[DVec2],
        matches: &[(usize, usize)],
    ) -> Result<RelativePose, PoseError> {
        let set = CorrespondenceSet::from_matches(normalizer, keypoints1, keypoints2, matches)?;
        self.resolve_calibrated(&set)
    }

    /// Resolve the pose from calibrated correspondences.
    pub fn resolve_calibrated(&self, set: &CorrespondenceSet) -> Result<RelativePose, PoseError> {
        if set.len() < self.config.min_matches {
            return Err(PoseError::InsufficientCorrespondences {
                required: self.config.min_matches,
                actual: set.len(),
            });
        }

        let homography = estimate_homography(set, &self.config.homography);
        let essential = estimate_essential(set, &self.config.essential);
        let chosen = self.selector.select(homography, essential)?;

        let voters = set
            .select(&chosen.inliers)?
            .step_by(self.config.disambiguation_stride);

        // points are calibrated, so both cameras use K = I
        let candidates = chosen.model.decompose(&DMat3::IDENTITY)?;
        let vote = self
            .disambiguator
            .disambiguate(&candidates, &DMat3::IDENTITY, &voters)?;
        let pose = vote.pose();

        log::debug!(
            "{:?} pose from {} inliers, valid fraction {:.3}",
            chosen.model.kind(),
            chosen.inlier_count,
            vote.valid_fraction
        );

        Ok(RelativePose {
            rotation: pose.rotation,
            translation: pose.translation,
            valid_fraction: vote.valid_fraction,
            model: chosen.model.kind(),
            inlier_count: chosen.inlier_count,
        })
    }
}
