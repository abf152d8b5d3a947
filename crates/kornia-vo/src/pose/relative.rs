use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::PoseError;
use crate::linalg;
use crate::pose::{decompose_essential, decompose_homography};

/// Tolerance used to accept a decomposed rotation as proper.
const ROTATION_TOL: f64 = 1e-6;

/// Kind of two-view model a pose was recovered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionModelKind {
    /// Planar homography.
    Homography,
    /// Essential matrix.
    Essential,
}

/// Two-view motion model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TwoViewModel {
    /// Homography mapping points of view 1 onto view 2.
    Homography(DMat3),
    /// Essential matrix with `x2^T E x1 = 0`.
    Essential(DMat3),
}

impl TwoViewModel {
    /// The kind of the model.
    pub fn kind(&self) -> MotionModelKind {
        match self {
            TwoViewModel::Homography(_) => MotionModelKind::Homography,
            TwoViewModel::Essential(_) => MotionModelKind::Essential,
        }
    }

    /// The underlying 3x3 matrix.
    pub fn matrix(&self) -> DMat3 {
        match self {
            TwoViewModel::Homography(m) | TwoViewModel::Essential(m) => *m,
        }
    }

    /// Decompose the model into its candidate relative poses.
    ///
    /// `k` is the intrinsics matrix of the coordinates the model was estimated in
    /// (identity for calibrated points). Candidates whose rotation is not proper
    /// are dropped.
    pub fn decompose(&self, k: &DMat3) -> Result<Vec<PoseCandidate>, PoseError> {
        let candidates = match self {
            TwoViewModel::Essential(e) => decompose_essential(e),
            TwoViewModel::Homography(h) => decompose_homography(h, k)?,
        };

        let total = candidates.len();
        let valid: Vec<PoseCandidate> = candidates
            .into_iter()
            .filter(|c| linalg::is_rotation(&c.rotation, ROTATION_TOL) && c.translation.is_finite())
            .collect();
        if valid.len() < total {
            log::warn!(
                "dropped {} of {} {:?} candidates with improper rotation",
                total - valid.len(),
                total,
                self.kind()
            );
        }
        if valid.is_empty() {
            return Err(PoseError::ImproperRotation);
        }
        Ok(valid)
    }
}

/// One algebraic solution `(R, t)` of a two-view model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseCandidate {
    /// Rotation from camera 1 to camera 2.
    pub rotation: DMat3,
    /// Translation from camera 1 to camera 2, up to scale.
    pub translation: DVec3,
    /// Plane normal in camera 1, for homography solutions.
    pub normal: Option<DVec3>,
}

impl PoseCandidate {
    /// Candidate without a plane normal.
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
            normal: None,
        }
    }

    /// Copy with the translation scaled to unit length; a zero translation is kept.
    pub fn normalized(&self) -> Self {
        let norm = self.translation.length();
        let translation = if norm != 0.0 {
            self.translation / norm
        } else {
            self.translation
        };
        Self {
            translation,
            ..*self
        }
    }
}

/// Rigid body transform `p -> R p + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Isometry3 {
    /// Rotation part.
    pub rotation: DMat3,
    /// Translation part.
    pub translation: DVec3,
}

impl Isometry3 {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        rotation: DMat3::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// The identity transform.
    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Create a transform from its parts.
    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// The inverse transform `p -> R^T p - R^T t`.
    pub fn inverse(&self) -> Self {
        let rt = self.rotation.transpose();
        Self {
            rotation: rt,
            translation: -(rt * self.translation),
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: DVec3) -> DVec3 {
        self.rotation * p + self.translation
    }

    /// `self ∘ other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Isometry3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// 4x4 homogeneous matrix.
    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_cols(
            self.rotation.x_axis.extend(0.0),
            self.rotation.y_axis.extend(0.0),
            self.rotation.z_axis.extend(0.0),
            self.translation.extend(1.0),
        )
    }
}

impl std::ops::Mul for Isometry3 {
    type Output = Isometry3;

    fn mul(self, rhs: Isometry3) -> Isometry3 {
        self.compose(&rhs)
    }
}

/// Relative pose between two frames, `p2 = rotation * p1 + translation`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativePose {
    /// Rotation from camera 1 to camera 2.
    pub rotation: DMat3,
    /// Unit translation direction (zero when degenerate).
    pub translation: DVec3,
    /// Fraction of correspondences passing the cheirality check.
    pub valid_fraction: f64,
    /// Model the pose was recovered from.
    pub model: MotionModelKind,
    /// Inlier support of the selected model.
    pub inlier_count: usize,
}

impl RelativePose {
    /// The rigid transform from camera 1 to camera 2.
    pub fn isometry(&self) -> Isometry3 {
        Isometry3::new(self.rotation, self.translation)
    }

    /// The rigid transform from camera 2 back to camera 1.
    pub fn inverse(&self) -> Isometry3 {
        self.isometry().inverse()
    }

    /// 4x4 homogeneous matrix of the transform.
    pub fn to_matrix(&self) -> DMat4 {
        self.isometry().to_matrix()
    }
}
