use glam::DVec2;

use crate::camera::{CalibratedPoint, PointNormalizer};
use crate::error::PoseError;

/// Two index-aligned lists of calibrated points; `points1()[i]` in view 1
/// corresponds to `points2()[i]` in view 2.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceSet {
    points1: Vec<CalibratedPoint>,
    points2: Vec<CalibratedPoint>,
}

impl CorrespondenceSet {
    /// Create a set from calibrated points.
    ///
    /// Fails with [`PoseError::MismatchedLengths`] when the lists differ in length.
    pub fn new(
        points1: Vec<CalibratedPoint>,
        points2: Vec<CalibratedPoint>,
    ) -> Result<Self, PoseError> {
        if points1.len() != points2.len() {
            return Err(PoseError::MismatchedLengths(points1.len(), points2.len()));
        }
        Ok(Self { points1, points2 })
    }

    /// Create a set from pixel coordinates, normalized with `normalizer`.
    pub fn from_pixels(
        normalizer: &PointNormalizer,
        pixels1: &[DVec2],
        pixels2: &[DVec2],
    ) -> Result<Self, PoseError> {
        if pixels1.len() != pixels2.len() {
            return Err(PoseError::MismatchedLengths(pixels1.len(), pixels2.len()));
        }
        Ok(Self {
            points1: normalizer.normalize_points(pixels1),
            points2: normalizer.normalize_points(pixels2),
        })
    }

    /// Create a set from two keypoint lists and `(query, train)` index matches.
    ///
    /// `keypoints1` is indexed by the query index and `keypoints2` by the train
    /// index. Fails with [`PoseError::InvalidMatch`] on the first out-of-range match.
    pub fn from_matches(
        normalizer: &PointNormalizer,
        keypoints1: &[DVec2],
        keypoints2: &[DVec2],
        matches: &[(usize, usize)],
    ) -> Result<Self, PoseError> {
        let mut points1 = Vec::with_capacity(matches.len());
        let mut points2 = Vec::with_capacity(matches.len());
        for (index, &(query, train)) in matches.iter().enumerate() {
            let (Some(p1), Some(p2)) = (keypoints1.get(query), keypoints2.get(train)) else {
                return Err(PoseError::InvalidMatch { index });
            };
            points1.push(normalizer.normalize(*p1));
            points2.push(normalizer.normalize(*p2));
        }
        Ok(Self { points1, points2 })
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.points1.len()
    }

    /// Whether the set holds no correspondences.
    pub fn is_empty(&self) -> bool {
        self.points1.is_empty()
    }

    /// Points of view 1.
    pub fn points1(&self) -> &[CalibratedPoint] {
        &self.points1
    }

    /// Points of view 2.
    pub fn points2(&self) -> &[CalibratedPoint] {
        &self.points2
    }

    /// Iterate over the `(view 1, view 2)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&CalibratedPoint, &CalibratedPoint)> {
        self.points1.iter().zip(self.points2.iter())
    }

    /// Keep the correspondences whose mask entry is `true`.
    ///
    /// Fails with [`PoseError::MismatchedLengths`] when the mask length differs.
    pub fn select(&self, mask: &[bool]) -> Result<Self, PoseError> {
        if mask.len() != self.len() {
            return Err(PoseError::MismatchedLengths(self.len(), mask.len()));
        }
        let (points1, points2) = self
            .iter()
            .zip(mask.iter())
            .filter(|(_, keep)| **keep)
            .map(|((p1, p2), _)| (*p1, *p2))
            .unzip();
        Ok(Self { points1, points2 })
    }

    /// Keep every `stride`-th correspondence starting at the first one.
    ///
    /// A stride of zero is treated as one.
    pub fn step_by(&self, stride: usize) -> Self {
        let stride = stride.max(1);
        let (points1, points2) = self
            .iter()
            .step_by(stride)
            .map(|(p1, p2)| (*p1, *p2))
            .unzip();
        Self { points1, points2 }
    }
}
