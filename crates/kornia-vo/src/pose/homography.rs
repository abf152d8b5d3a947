use glam::{DMat3, DVec2, DVec3};

use crate::error::PoseError;
use crate::linalg::{self, Svd3};
use crate::pose::utils::normalize_points_2d;
use crate::pose::PoseCandidate;

/// Relative gap between the first and last singular value under which a
/// homography is treated as a pure rotation.
const PURE_ROTATION_TOL: f64 = 1e-5;

/// Compute the homography mapping `x1` onto `x2` with the normalized DLT.
///
/// * `x1` - The source 2d points (at least 4).
/// * `x2` - The destination 2d points.
///
/// The result is scaled so that `h[2][2] = 1` when possible. Returns `None` when
/// the system is under-determined or the estimated homography is singular.
pub fn homography_dlt(x1: &[DVec2], x2: &[DVec2]) -> Option<DMat3> {
    if x1.len() != x2.len() || x1.len() < 4 {
        return None;
    }

    let (x1n, t1) = normalize_points_2d(x1);
    let (x2n, t2) = normalize_points_2d(x2);

    // two rows per correspondence
    let mut rows = Vec::with_capacity(2 * x1n.len());
    for (p, q) in x1n.iter().zip(x2n.iter()) {
        let (x, y) = (p.x, p.y);
        let (xp, yp) = (q.x, q.y);
        rows.push([x, y, 1.0, 0.0, 0.0, 0.0, -xp * x, -xp * y, -xp]);
        rows.push([0.0, 0.0, 0.0, x, y, 1.0, -yp * x, -yp * y, -yp]);
    }

    let h = linalg::null_vector9(&rows)?;
    let h_norm = linalg::mat3_from_rows([[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], h[8]]]);

    // undo the conditioning: H = T2^-1 * Hn * T1
    let t2_inv = linalg::try_inverse(&t2)?;
    let mut homo = t2_inv * h_norm * t1;

    // normalize the homography matrix
    let h33 = homo.z_axis.z;
    if h33.abs() > f64::EPSILON {
        homo *= 1.0 / h33;
    } else {
        let norm = linalg::frobenius_norm(&homo);
        if norm <= f64::EPSILON {
            return None;
        }
        homo *= 1.0 / norm;
    }

    if !homo.is_finite() || homo.determinant().abs() < 1e-8 {
        return None;
    }

    Some(homo)
}

/// Whether any three of the given points are (nearly) collinear.
///
/// Coincident points count as collinear.
pub fn has_collinear_triplet(points: &[DVec2]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let a = points[j] - points[i];
                let b = points[k] - points[i];
                let area = a.perp_dot(b).abs();
                if area <= 1e-9 * a.length() * b.length() || area <= f64::EPSILON {
                    return true;
                }
            }
        }
    }
    false
}

/// Squared forward transfer error `|x2 - H x1|^2` (dehomogenized).
///
/// Points mapped to infinity get an infinite error.
pub fn homography_transfer_error(h: &DMat3, x1: &DVec2, x2: &DVec2) -> f64 {
    let q = *h * x1.extend(1.0);
    if q.z.abs() <= f64::EPSILON {
        return f64::INFINITY;
    }
    (q.truncate() / q.z - *x2).length_squared()
}

/// Decompose a homography into its candidate (R, t, n) solutions.
///
/// `h` maps pixels of view 1 onto view 2 under intrinsics `k`. The euclidean
/// homography `A = K^-1 H K` is analysed with the SVD method of Faugeras and
/// Lustman, keeping the sign branch with a positive determinant. A general
/// motion yields 4 candidates with unit translation and the plane normal in
/// camera 1. A pure rotation yields a single candidate with zero translation.
///
/// Fails with [`PoseError::InvalidIntrinsics`] when `k` is singular and with
/// [`PoseError::DegenerateConfiguration`] when `h` is not finite or singular.
pub fn decompose_homography(h: &DMat3, k: &DMat3) -> Result<Vec<PoseCandidate>, PoseError> {
    let k_inv = linalg::try_inverse(k)
        .ok_or_else(|| PoseError::InvalidIntrinsics("singular camera matrix".into()))?;

    let mut a = k_inv * *h * *k;
    if !a.is_finite() {
        return Err(PoseError::DegenerateConfiguration(
            "homography is not finite".into(),
        ));
    }
    if a.determinant() < 0.0 {
        a = -a;
    }

    let Svd3 { u, s, v } = linalg::svd3(&a);
    let (d1, d2, d3) = (s.x, s.y, s.z);
    if d3 <= f64::EPSILON * d1 || d2 <= 0.0 {
        return Err(PoseError::DegenerateConfiguration(
            "homography is singular".into(),
        ));
    }

    if (d1 - d3) / d1 < PURE_ROTATION_TOL {
        log::debug!("homography is a pure rotation");
        return Ok(vec![PoseCandidate::new(
            linalg::nearest_rotation(&a),
            DVec3::ZERO,
        )]);
    }

    let sign = u.determinant() * v.determinant();
    let (d1s, d2s, d3s) = (d1 * d1, d2 * d2, d3 * d3);

    let aux1 = ((d1s - d2s) / (d1s - d3s)).max(0.0).sqrt();
    let aux3 = ((d2s - d3s) / (d1s - d3s)).max(0.0).sqrt();
    let x1 = [aux1, aux1, -aux1, -aux1];
    let x3 = [aux3, -aux3, aux3, -aux3];

    let aux_stheta = ((d1s - d2s) * (d2s - d3s)).max(0.0).sqrt() / ((d1 + d3) * d2);
    let ctheta = (d2s + d1 * d3) / ((d1 + d3) * d2);
    let stheta = [aux_stheta, -aux_stheta, -aux_stheta, aux_stheta];

    let vt = v.transpose();
    let candidates = (0..4)
        .map(|i| {
            let rp = linalg::mat3_from_rows([
                [ctheta, 0.0, -stheta[i]],
                [0.0, 1.0, 0.0],
                [stheta[i], 0.0, ctheta],
            ]);
            let rotation = u * rp * vt * sign;
            let tp = DVec3::new(x1[i] * (d1 - d3), 0.0, -x3[i] * (d1 - d3));
            let normal = v * DVec3::new(x1[i], 0.0, x3[i]);
            PoseCandidate {
                rotation,
                translation: u * tp,
                normal: Some(normal),
            }
            .normalized()
        })
        .collect();

    Ok(candidates)
}
