use glam::{DMat3, DVec2};

/// Normalize points with a similarity transform `T` so that they have zero mean and
/// an average distance of sqrt(2) to the origin.
///
/// Returns the normalized points and `T`.
pub(crate) fn normalize_points_2d(x: &[DVec2]) -> (Vec<DVec2>, DMat3) {
    let n = x.len().max(1) as f64;
    let mean = x.iter().fold(DVec2::ZERO, |acc, p| acc + *p) / n;
    let mean_dist = x.iter().map(|p| (*p - mean).length()).sum::<f64>() / n;
    let scale = if mean_dist > 0.0 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let xn = x.iter().map(|p| (*p - mean) * scale).collect();

    // T = [[s, 0, -s*mx], [0, s, -s*my], [0, 0, 1]]
    let t = DMat3::from_cols_array(&[
        scale,
        0.0,
        0.0,
        0.0,
        scale,
        0.0,
        -scale * mean.x,
        -scale * mean.y,
        1.0,
    ]);
    (xn, t)
}
