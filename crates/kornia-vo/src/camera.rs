use glam::{DMat3, DVec2};
use serde::{Deserialize, Serialize};

use crate::error::PoseError;
use crate::linalg;

/// A 2d point in normalized camera-ray coordinates, i.e. `K^-1 * undistort(pixel)`.
pub type CalibratedPoint = DVec2;

/// Maximum number of fixed-point iterations when removing lens distortion.
const UNDISTORT_MAX_ITERATIONS: usize = 20;

/// Convergence threshold of the undistortion in normalized coordinates.
const UNDISTORT_EPSILON: f64 = 1e-14;

/// Represents the intrinsic parameters of a pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
    /// Axis skew
    #[serde(default)]
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Create camera intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            skew: 0.0,
        }
    }

    /// Intrinsics of an already calibrated camera (`K = I`).
    pub fn identity() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0)
    }

    /// Create camera intrinsics from a 3x3 upper triangular intrinsics matrix.
    pub fn from_matrix(k: &DMat3) -> Result<Self, PoseError> {
        if k.x_axis.y != 0.0 || k.x_axis.z != 0.0 || k.y_axis.z != 0.0 || k.z_axis.z != 1.0 {
            return Err(PoseError::InvalidIntrinsics(
                "intrinsics matrix must have form [[fx, s, cx], [0, fy, cy], [0, 0, 1]]".to_string(),
            ));
        }

        Ok(Self {
            fx: k.x_axis.x,
            fy: k.y_axis.y,
            cx: k.z_axis.x,
            cy: k.z_axis.y,
            skew: k.y_axis.x,
        })
    }

    /// Convert to a 3x3 intrinsics matrix.
    pub fn matrix(&self) -> DMat3 {
        linalg::mat3_from_rows([
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ])
    }
}

/// Polynomial (Brown-Conrady) lens distortion, OpenCV coefficient order
/// `k1, k2, p1, p2, k3, k4, k5, k6`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct PolynomialDistortion {
    /// Radial distortion coefficients
    pub k1: f64,
    pub k2: f64,
    /// Tangential distortion coefficients
    pub p1: f64,
    pub p2: f64,
    /// Higher order radial coefficients (rational model)
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl PolynomialDistortion {
    /// Distortion with all coefficients set to zero.
    pub fn none() -> Self {
        Self::default()
    }

    /// Distortion with only the first two radial coefficients.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Self {
            k1,
            k2,
            ..Self::default()
        }
    }

    /// Distortion from an OpenCV style coefficient list; missing trailing
    /// coefficients are zero.
    pub fn from_coefficients(coeffs: &[f64]) -> Self {
        let c = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Self {
            k1: c(0),
            k2: c(1),
            p1: c(2),
            p2: c(3),
            k3: c(4),
            k4: c(5),
            k5: c(6),
            k6: c(7),
        }
    }

    /// Check if there is any distortion.
    pub fn has_distortion(&self) -> bool {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
        .iter()
        .any(|c| *c != 0.0)
    }

    fn is_finite(&self) -> bool {
        [
            self.k1, self.k2, self.p1, self.p2, self.k3, self.k4, self.k5, self.k6,
        ]
        .iter()
        .all(|c| c.is_finite())
    }

    /// Ratio of the radial polynomials at squared radius `r2`.
    fn radial_factor(&self, r2: f64) -> f64 {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        (1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6)
            / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6)
    }

    fn tangential(&self, p: DVec2, r2: f64) -> DVec2 {
        let xy2 = 2.0 * p.x * p.y;
        DVec2::new(
            self.p1 * xy2 + self.p2 * (r2 + 2.0 * p.x * p.x),
            self.p1 * (r2 + 2.0 * p.y * p.y) + self.p2 * xy2,
        )
    }

    /// Apply the distortion to a normalized point.
    pub fn distort(&self, p: DVec2) -> DVec2 {
        let r2 = p.length_squared();
        p * self.radial_factor(r2) + self.tangential(p, r2)
    }

    /// Remove the distortion from a normalized point by fixed-point iteration.
    pub fn undistort(&self, distorted: DVec2) -> DVec2 {
        let mut p = distorted;
        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let r2 = p.length_squared();
            let factor = self.radial_factor(r2);
            if !factor.is_finite() || factor == 0.0 {
                break;
            }
            let next = (distorted - self.tangential(p, r2)) / factor;
            let step = (next - p).abs().max_element();
            p = next;
            if step < UNDISTORT_EPSILON {
                break;
            }
        }
        p
    }
}

/// Maps pixel coordinates to calibrated points and back.
#[derive(Debug, Clone)]
pub struct PointNormalizer {
    intrinsics: CameraIntrinsics,
    k: DMat3,
    k_inv: DMat3,
    distortion: PolynomialDistortion,
}

impl PointNormalizer {
    /// Create a normalizer from intrinsics and an optional lens distortion.
    ///
    /// Fails with [`PoseError::InvalidIntrinsics`] when `K` is singular or any
    /// parameter is not finite.
    pub fn new(
        intrinsics: CameraIntrinsics,
        distortion: Option<PolynomialDistortion>,
    ) -> Result<Self, PoseError> {
        let distortion = distortion.unwrap_or_default();
        if !distortion.is_finite() {
            return Err(PoseError::InvalidIntrinsics(
                "distortion coefficients must be finite".to_string(),
            ));
        }

        let k = intrinsics.matrix();
        if !k.is_finite() {
            return Err(PoseError::InvalidIntrinsics(format!(
                "intrinsics must be finite: {intrinsics:?}"
            )));
        }
        let k_inv = linalg::try_inverse(&k).ok_or_else(|| {
            PoseError::InvalidIntrinsics(format!("intrinsics matrix is singular: {intrinsics:?}"))
        })?;

        Ok(Self {
            intrinsics,
            k,
            k_inv,
            distortion,
        })
    }

    /// Normalizer for points that are already calibrated.
    pub fn identity() -> Self {
        Self {
            intrinsics: CameraIntrinsics::identity(),
            k: DMat3::IDENTITY,
            k_inv: DMat3::IDENTITY,
            distortion: PolynomialDistortion::none(),
        }
    }

    /// The camera intrinsics.
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// The intrinsics matrix `K`.
    pub fn camera_matrix(&self) -> DMat3 {
        self.k
    }

    /// The lens distortion.
    pub fn distortion(&self) -> &PolynomialDistortion {
        &self.distortion
    }

    /// Map a pixel to its calibrated point.
    pub fn normalize(&self, pixel: DVec2) -> CalibratedPoint {
        let p = self.k_inv * pixel.extend(1.0);
        let distorted = p.truncate() / p.z;
        if self.distortion.has_distortion() {
            self.distortion.undistort(distorted)
        } else {
            distorted
        }
    }

    /// Map a list of pixels to calibrated points.
    pub fn normalize_points(&self, pixels: &[DVec2]) -> Vec<CalibratedPoint> {
        pixels.iter().map(|p| self.normalize(*p)).collect()
    }

    /// Map a calibrated point back to pixel coordinates (distort, then apply `K`).
    pub fn denormalize(&self, point: CalibratedPoint) -> DVec2 {
        let distorted = if self.distortion.has_distortion() {
            self.distortion.distort(point)
        } else {
            point
        };
        let p = self.k * distorted.extend(1.0);
        p.truncate() / p.z
    }
}
