use glam::{DMat3, DVec2, DVec3};

use crate::linalg::{self, Svd3};
use crate::pose::utils::normalize_points_2d;
use crate::pose::PoseCandidate;

/// Estimate an essential matrix from calibrated correspondences with the normalized
/// 8-point algorithm.
///
/// - `x1`: calibrated points in view 1 (length >= 8).
/// - `x2`: corresponding calibrated points in view 2.
///
/// The result satisfies `x2^T E x1 ~ 0` and has singular values (1, 1, 0).
/// On critical configurations such as coplanar points the linear system has a
/// multi-dimensional null space; the smallest singular vector is used and the
/// caller judges the model by its residuals. Returns `None` when the inputs are
/// too few or the linear system is not finite.
pub fn essential_8point(x1: &[DVec2], x2: &[DVec2]) -> Option<DMat3> {
    if x1.len() != x2.len() || x1.len() < 8 {
        return None;
    }

    // condition the system with similarity transforms T1, T2
    let (x1n, t1) = normalize_points_2d(x1);
    let (x2n, t2) = normalize_points_2d(x2);

    // one row of A per correspondence for x2' * F * x1 = 0
    let rows: Vec<[f64; 9]> = x1n
        .iter()
        .zip(x2n.iter())
        .map(|(p, q)| {
            let (x, y) = (p.x, p.y);
            let (xp, yp) = (q.x, q.y);
            [xp * x, xp * y, xp, yp * x, yp * y, yp, x, y, 1.0]
        })
        .collect();

    let f = linalg::smallest_right_singular_vector9(&rows)?;
    let f_norm = linalg::mat3_from_rows([[f[0], f[1], f[2]], [f[3], f[4], f[5]], [f[6], f[7], f[8]]]);

    // undo the conditioning: E = T2^T * F * T1
    let e = t2.transpose() * f_norm * t1;
    let e = enforce_essential_constraints(&e);
    e.is_finite().then_some(e)
}

/// Whether a sample has two coincident points or all of its points on one line.
pub fn has_degenerate_layout(points: &[DVec2]) -> bool {
    let scale = points.iter().fold(1.0f64, |acc, p| acc.max(p.abs().max_element()));
    let tol = 1e-9 * scale;
    for (i, a) in points.iter().enumerate() {
        if points[i + 1..].iter().any(|b| a.distance(*b) <= tol) {
            return true;
        }
    }

    let Some(origin) = points.first() else {
        return true;
    };
    let Some(far) = points
        .iter()
        .max_by(|a, b| a.distance_squared(*origin).total_cmp(&b.distance_squared(*origin)))
    else {
        return true;
    };
    let dir = *far - *origin;
    points.iter().all(|p| {
        let d = *p - *origin;
        dir.perp_dot(d).abs() <= 1e-9 * dir.length() * d.length()
    })
}

/// Project a matrix onto the essential manifold (singular values 1, 1, 0).
pub fn enforce_essential_constraints(e: &DMat3) -> DMat3 {
    let Svd3 { u, v, .. } = linalg::svd3(e);
    u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, 0.0)) * v.transpose()
}

/// Squared Sampson distance of a correspondence to the epipolar geometry `f`.
pub fn sampson_distance(f: &DMat3, x1: &DVec2, x2: &DVec2) -> f64 {
    let x1h = x1.extend(1.0);
    let x2h = x2.extend(1.0);
    let fx1 = *f * x1h;
    let ftx2 = f.transpose() * x2h;
    let num = x2h.dot(fx1);
    let den = fx1.x * fx1.x + fx1.y * fx1.y + ftx2.x * ftx2.x + ftx2.y * ftx2.y;
    if den <= f64::EPSILON {
        return f64::INFINITY;
    }
    num * num / den
}

/// Decompose an essential matrix into its four possible (R, t) solutions.
///
/// The candidates are ordered `(R1, t), (R1, -t), (R2, t), (R2, -t)` and `t` has
/// unit length.
pub fn decompose_essential(e: &DMat3) -> Vec<PoseCandidate> {
    let Svd3 { mut u, mut v, .. } = linalg::svd3(e);

    if u.determinant() < 0.0 {
        u.z_axis = -u.z_axis;
    }
    if v.determinant() < 0.0 {
        v.z_axis = -v.z_axis;
    }

    let w = DMat3::from_cols(
        DVec3::new(0.0, 1.0, 0.0),
        DVec3::new(-1.0, 0.0, 0.0),
        DVec3::new(0.0, 0.0, 1.0),
    );

    let r1 = u * w * v.transpose();
    let r2 = u * w.transpose() * v.transpose();
    let t = u.z_axis;

    vec![
        PoseCandidate::new(r1, t),
        PoseCandidate::new(r1, -t),
        PoseCandidate::new(r2, t),
        PoseCandidate::new(r2, -t),
    ]
}
