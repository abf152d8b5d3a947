use glam::{DMat3, DVec2, DVec3};

use crate::utils;

/// Singular value decomposition of a 3x3 matrix, `m = u * diag(s) * v^T`.
///
/// Singular values are sorted in non-increasing order.
#[derive(Clone, Copy, Debug)]
pub struct Svd3 {
    /// Left singular vectors (columns).
    pub u: DMat3,
    /// Singular values.
    pub s: DVec3,
    /// Right singular vectors (columns).
    pub v: DMat3,
}

/// Compute the SVD of a 3x3 matrix in double precision.
pub fn svd3(m: &DMat3) -> Svd3 {
    let a = utils::dmat3_to_faer(m);
    let svd = a.svd();
    let s = svd.s_diagonal();
    Svd3 {
        u: utils::faer_to_dmat3(svd.u()),
        s: DVec3::new(s.read(0), s.read(1), s.read(2)),
        v: utils::faer_to_dmat3(svd.v()),
    }
}

/// Moore-Penrose pseudo-inverse of a 3x3 matrix.
///
/// Singular values below `3 * eps * s_max` are treated as zero, so `pinv3(m) * b`
/// is the minimum-norm least-squares solution of `m * x = b`.
pub fn pinv3(m: &DMat3) -> DMat3 {
    let Svd3 { u, s, v } = svd3(m);
    let tol = 3.0 * f64::EPSILON * s.x;
    let inv = |x: f64| if x > tol { 1.0 / x } else { 0.0 };
    let s_inv = DMat3::from_diagonal(DVec3::new(inv(s.x), inv(s.y), inv(s.z)));
    v * s_inv * u.transpose()
}

/// Inverse of a 3x3 matrix, or `None` when it is singular or not finite.
///
/// Singularity is judged relative to the scale of `m`: `|det| <= eps * |m|_F^3`.
pub fn try_inverse(m: &DMat3) -> Option<DMat3> {
    let det = m.determinant();
    let norm = frobenius_norm(m);
    if !det.is_finite() || det.abs() <= f64::EPSILON * norm * norm * norm {
        return None;
    }
    Some(m.inverse())
}

/// Frobenius norm of a 3x3 matrix.
pub fn frobenius_norm(m: &DMat3) -> f64 {
    (m.x_axis.length_squared() + m.y_axis.length_squared() + m.z_axis.length_squared()).sqrt()
}

/// Build a matrix from its rows.
pub fn mat3_from_rows(rows: [[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(&rows).transpose()
}

/// Cross-product matrix `[v]x` such that `[v]x * w = v x w`.
pub fn skew(v: &DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

/// Whether `r` is orthonormal with determinant +1 within `tol`.
pub fn is_rotation(r: &DMat3, tol: f64) -> bool {
    r.is_finite()
        && (r.transpose() * *r).abs_diff_eq(DMat3::IDENTITY, tol)
        && (r.determinant() - 1.0).abs() < tol
}

/// Closest rotation matrix in the Frobenius sense.
pub fn nearest_rotation(m: &DMat3) -> DMat3 {
    let Svd3 { u, v, .. } = svd3(m);
    let d = (u * v.transpose()).determinant().signum();
    u * DMat3::from_diagonal(DVec3::new(1.0, 1.0, d)) * v.transpose()
}

/// Right null vector of a stack of 9-column rows, i.e. the unit vector `x`
/// minimizing `|A x|`.
///
/// Small systems are decomposed directly (zero padded to 9x9); taller systems
/// go through the 9x9 normal matrix `A^T A`. Returns `None` when the null space
/// is not one-dimensional.
pub fn null_vector9(rows: &[[f64; 9]]) -> Option<[f64; 9]> {
    right_singular_vector9(rows, true)
}

/// Right singular vector of the smallest singular value of a stack of 9-column
/// rows.
///
/// Unlike [`null_vector9`] the rank of the system is not checked: with a
/// multi-dimensional null space any unit vector of it may be returned.
pub fn smallest_right_singular_vector9(rows: &[[f64; 9]]) -> Option<[f64; 9]> {
    right_singular_vector9(rows, false)
}

fn right_singular_vector9(rows: &[[f64; 9]], check_rank: bool) -> Option<[f64; 9]> {
    if rows.is_empty() {
        return None;
    }

    let direct = rows.len() <= 9;
    let a = if direct {
        faer::Mat::<f64>::from_fn(9, 9, |i, j| rows.get(i).map_or(0.0, |r| r[j]))
    } else {
        let mut ata = faer::Mat::<f64>::zeros(9, 9);
        for r in rows {
            for i in 0..9 {
                for j in i..9 {
                    ata.write(i, j, ata.read(i, j) + r[i] * r[j]);
                }
            }
        }
        for i in 0..9 {
            for j in 0..i {
                ata.write(i, j, ata.read(j, i));
            }
        }
        ata
    };

    let svd = a.svd();
    let s = svd.s_diagonal();
    // singular values of A^T A are squared
    let rank_tol = if direct { 1e-10 } else { 1e-20 };
    if check_rank && !(s.read(7) > rank_tol * s.read(0)) {
        return None;
    }

    let v = svd.v();
    let mut x = [0.0; 9];
    for (i, xi) in x.iter_mut().enumerate() {
        *xi = v.read(i, 8);
    }
    x.iter().all(|xi| xi.is_finite()).then_some(x)
}

/// Multiply every homogeneous point `[x, y, 1]` by `m` in one batched product.
pub fn mul_homogeneous_batch(m: &DMat3, points: &[DVec2]) -> Vec<DVec3> {
    let n = points.len();
    let pts = faer::Mat::<f64>::from_fn(3, n, |i, j| match i {
        0 => points[j].x,
        1 => points[j].y,
        _ => 1.0,
    });
    let out = &utils::dmat3_to_faer(m) * &pts;
    (0..n)
        .map(|j| DVec3::new(out.read(0, j), out.read(1, j), out.read(2, j)))
        .collect()
}

/// Apply `p -> rotation * p + translation` to a set of points.
pub fn transform_points(points: &[DVec3], rotation: &DMat3, translation: &DVec3) -> Vec<DVec3> {
    let n = points.len();
    let src = faer::Mat::<f64>::from_fn(3, n, |i, j| points[j][i]);
    let dst = &utils::dmat3_to_faer(rotation) * &src;
    (0..n)
        .map(|j| DVec3::new(dst.read(0, j), dst.read(1, j), dst.read(2, j)) + *translation)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_svd3_reconstruction() {
        let m = mat3_from_rows([[2.0, -1.0, 0.5], [0.3, 1.5, -2.0], [1.0, 0.0, 3.0]]);
        let Svd3 { u, s, v } = svd3(&m);
        assert!(s.x >= s.y && s.y >= s.z);
        let rec = u * DMat3::from_diagonal(s) * v.transpose();
        assert!(rec.abs_diff_eq(m, 1e-10));
    }

    #[test]
    fn test_pinv3_matches_inverse() {
        let m = mat3_from_rows([[4.0, 0.0, 1.0], [0.0, 3.0, 0.0], [1.0, 0.0, 2.0]]);
        assert!(pinv3(&m).abs_diff_eq(m.inverse(), 1e-12));
    }

    #[test]
    fn test_pinv3_rank_deficient() {
        // rank 1: least squares picks the minimum-norm solution
        let m = mat3_from_rows([[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
        let x = pinv3(&m) * DVec3::new(2.0, 2.0, 0.0);
        assert_relative_eq!(x.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(x.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(x.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_skew_cross_product() {
        let a = DVec3::new(1.0, -2.0, 0.5);
        let b = DVec3::new(0.3, 4.0, -1.0);
        assert!((skew(&a) * b).abs_diff_eq(a.cross(b), 1e-12));
    }

    #[test]
    fn test_nearest_rotation() {
        let r = DMat3::from_rotation_z(0.3) * DMat3::from_rotation_x(-0.2);
        let noisy = r + mat3_from_rows([[1e-3, 0.0, 0.0], [0.0, -1e-3, 0.0], [0.0, 0.0, 0.0]]);
        let fixed = nearest_rotation(&noisy);
        assert!(is_rotation(&fixed, 1e-9));
        assert!(fixed.abs_diff_eq(r, 2e-3));
    }

    #[test]
    fn test_null_vector9_tall_and_square() {
        // rows orthogonal to e_8
        let mut rows = Vec::new();
        for k in 0..12 {
            let mut r = [0.0; 9];
            r[k % 8] = 1.0 + k as f64;
            r[(k + 3) % 8] = -0.5;
            rows.push(r);
        }
        for subset in [&rows[..8], &rows[..]] {
            let x = null_vector9(subset).expect("null vector");
            assert_relative_eq!(x[8].abs(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_null_vector9_rank_deficient() {
        let rows = vec![[1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]; 8];
        assert!(null_vector9(&rows).is_none());
        assert!(null_vector9(&[]).is_none());

        // still a unit vector of the null space
        let x = smallest_right_singular_vector9(&rows).expect("singular vector");
        let norm = x.iter().map(|xi| xi * xi).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-9);
        let residual: f64 = rows[0].iter().zip(x.iter()).map(|(a, b)| a * b).sum();
        assert!(residual.abs() < 1e-9);
        assert!(smallest_right_singular_vector9(&[]).is_none());
    }

    #[test]
    fn test_try_inverse_is_scale_relative() {
        let small = DMat3::from_diagonal(DVec3::splat(1e-5));
        let inv = try_inverse(&small).expect("well-conditioned matrix");
        assert!((inv * small).abs_diff_eq(DMat3::IDENTITY, 1e-9));

        let large = mat3_from_rows([[1e4, 0.0, 0.0], [0.0, 1e4, 0.0], [0.0, 0.0, 1e4]]);
        assert!(try_inverse(&large).is_some());

        let singular = mat3_from_rows([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 1.0, 1.0]]);
        assert!(try_inverse(&singular).is_none());
        assert!(try_inverse(&DMat3::ZERO).is_none());
        assert!(try_inverse(&DMat3::from_diagonal(DVec3::new(1.0, f64::NAN, 1.0))).is_none());
    }

    #[test]
    fn test_transform_points() {
        let r = DMat3::from_rotation_y(0.5);
        let t = DVec3::new(1.0, 2.0, 3.0);
        let pts = vec![DVec3::new(2.0, 2.0, 2.0), DVec3::new(3.0, 4.0, 5.0)];
        let out = transform_points(&pts, &r, &t);
        for (p, q) in pts.iter().zip(out.iter()) {
            assert!((r * *p + t).abs_diff_eq(*q, 1e-12));
        }
        let back = transform_points(&out, &r.transpose(), &(-(r.transpose() * t)));
        for (p, q) in pts.iter().zip(back.iter()) {
            assert!(p.abs_diff_eq(*q, 1e-12));
        }
    }

    #[test]
    fn test_mul_homogeneous_batch() {
        let m = mat3_from_rows([[2.0, 0.0, 1.0], [0.0, 3.0, -1.0], [0.0, 0.0, 1.0]]);
        let out = mul_homogeneous_batch(&m, &[DVec2::new(1.0, 2.0)]);
        assert!(out[0].abs_diff_eq(DVec3::new(3.0, 5.0, 1.0), 1e-12));
    }
}
