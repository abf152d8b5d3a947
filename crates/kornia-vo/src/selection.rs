use serde::{Deserialize, Serialize};

use crate::error::PoseError;
use crate::estimator::MotionModel;

/// Thresholds of the homography vs essential decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionParams {
    /// The homography is preferred when its inlier count exceeds this value.
    pub homography_min_inliers: usize,
    /// Minimum inlier count of the selected model.
    pub min_inliers: usize,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            homography_min_inliers: 1000,
            min_inliers: 100,
        }
    }
}

/// Chooses which motion model explains a frame pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModelSelector {
    params: SelectionParams,
}

impl ModelSelector {
    /// Create a selector with the given thresholds.
    pub fn new(params: SelectionParams) -> Self {
        Self { params }
    }

    /// The selection thresholds.
    pub fn params(&self) -> &SelectionParams {
        &self.params
    }

    /// Select between the homography and the essential estimate.
    ///
    /// The homography wins when its support exceeds `homography_min_inliers`,
    /// otherwise the essential estimate is used and its error, if any, is
    /// returned. The chosen model must have at least `min_inliers` inliers.
    pub fn select(
        &self,
        homography: Result<MotionModel, PoseError>,
        essential: Result<MotionModel, PoseError>,
    ) -> Result<MotionModel, PoseError> {
        let chosen = match homography {
            Ok(h) if h.inlier_count > self.params.homography_min_inliers => h,
            _ => essential?,
        };

        log::debug!(
            "selected {:?} with {} inliers (score {:.3})",
            chosen.model.kind(),
            chosen.inlier_count,
            chosen.score
        );

        if chosen.inlier_count < self.params.min_inliers {
            return Err(PoseError::InsufficientInliers {
                required: self.params.min_inliers,
                actual: chosen.inlier_count,
            });
        }
        Ok(chosen)
    }
}
