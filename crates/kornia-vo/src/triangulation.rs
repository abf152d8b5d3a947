use glam::{DMat3, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::PoseError;
use crate::linalg;

/// A 3x4 camera projection matrix `P = [M | p4]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionMatrix {
    /// Left 3x3 block `K R`.
    pub m: DMat3,
    /// Last column `K t`.
    pub p4: DVec3,
}

impl ProjectionMatrix {
    /// `P = K [R | t]`.
    pub fn from_pose(k: &DMat3, rotation: &DMat3, translation: &DVec3) -> Self {
        Self {
            m: *k * *rotation,
            p4: *k * *translation,
        }
    }

    /// `P = K [I | 0]`.
    pub fn identity(k: &DMat3) -> Self {
        Self::from_pose(k, &DMat3::IDENTITY, &DVec3::ZERO)
    }

    /// Build from the three rows of a 3x4 matrix.
    pub fn from_rows(rows: [[f64; 4]; 3]) -> Self {
        let m = linalg::mat3_from_rows([
            [rows[0][0], rows[0][1], rows[0][2]],
            [rows[1][0], rows[1][1], rows[1][2]],
            [rows[2][0], rows[2][1], rows[2][2]],
        ]);
        Self {
            m,
            p4: DVec3::new(rows[0][3], rows[1][3], rows[2][3]),
        }
    }

    /// Project a 3d point to image coordinates.
    pub fn project(&self, point: &DVec3) -> DVec2 {
        let x = self.m * *point + self.p4;
        x.truncate() / x.z
    }

    /// Optical centre, the least-squares solution of `M c = -p4`.
    pub fn center(&self) -> DVec3 {
        linalg::pinv3(&self.m) * (-self.p4)
    }
}

/// Parameters of the midpoint triangulation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationParams {
    /// Reciprocal condition number of the 2x2 normal matrix below which a point
    /// is reported as degenerate.
    pub rcond_threshold: f64,
}

impl Default for TriangulationParams {
    fn default() -> Self {
        Self {
            rcond_threshold: f64::EPSILON,
        }
    }
}

/// Triangulates correspondences as the midpoint of the closest points of the
/// two back-projected rays.
#[derive(Clone, Copy, Debug, Default)]
pub struct MidpointTriangulator {
    params: TriangulationParams,
}

impl MidpointTriangulator {
    /// Create a triangulator.
    pub fn new(params: TriangulationParams) -> Self {
        Self { params }
    }

    /// Triangulate every correspondence `(x1[i], x2[i])`.
    ///
    /// Returns one result per correspondence: the 3d point in the frame of the
    /// projection matrices, or [`PoseError::DegenerateTriangulation`] when the
    /// rays are (nearly) parallel.
    pub fn triangulate(
        &self,
        p1: &ProjectionMatrix,
        p2: &ProjectionMatrix,
        x1: &[DVec2],
        x2: &[DVec2],
    ) -> Vec<Result<DVec3, PoseError>> {
        let m1_pinv = linalg::pinv3(&p1.m);
        let m2_pinv = linalg::pinv3(&p2.m);
        let c1 = m1_pinv * (-p1.p4);
        let c2 = m2_pinv * (-p2.p4);
        let baseline = c2 - c1;

        // ray directions of the whole batch
        let rays1 = linalg::mul_homogeneous_batch(&m1_pinv, x1);
        let rays2 = linalg::mul_homogeneous_batch(&m2_pinv, x2);

        rays1
            .iter()
            .zip(rays2.iter())
            .enumerate()
            .map(|(index, (a1, a2))| {
                // normal equations of [a1, -a2] * alpha = c2 - c1
                let a11 = a1.dot(*a1);
                let a12 = -a1.dot(*a2);
                let a22 = a2.dot(*a2);
                let b1 = a1.dot(baseline);
                let b2 = -a2.dot(baseline);

                let det = a11 * a22 - a12 * a12;
                let norm1 = (a11.abs() + a12.abs()).max(a12.abs() + a22.abs());
                let rcond = det.abs() / (norm1 * norm1);
                if rcond.is_nan() || rcond < self.params.rcond_threshold {
                    return Err(PoseError::DegenerateTriangulation { index });
                }

                let alpha0 = (a22 * b1 - a12 * b2) / det;
                let alpha1 = (a11 * b2 - a12 * b1) / det;
                Ok((c1 + *a1 * alpha0 + c2 + *a2 * alpha1) * 0.5)
            })
            .collect()
    }
}
