#![allow(dead_code)]

use glam::{DMat3, DVec2, DVec3};
use kornia_vo::CorrespondenceSet;
use rand::rngs::StdRng;
use rand::Rng;

/// Random points with x, y in [-2, 2] and depth in [4, 8].
pub fn random_cloud(rng: &mut StdRng, n: usize) -> Vec<DVec3> {
    (0..n)
        .map(|_| {
            DVec3::new(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(4.0..8.0),
            )
        })
        .collect()
}

/// Project points into camera 1 (identity) and camera 2 (`p2 = R p1 + t`).
pub fn project(points: &[DVec3], r: &DMat3, t: &DVec3) -> (Vec<DVec2>, Vec<DVec2>) {
    points
        .iter()
        .map(|p| {
            let q = *r * *p + *t;
            (p.truncate() / p.z, q.truncate() / q.z)
        })
        .unzip()
}

pub fn correspondences(points: &[DVec3], r: &DMat3, t: &DVec3) -> CorrespondenceSet {
    let (x1, x2) = project(points, r, t);
    CorrespondenceSet::new(x1, x2).expect("aligned")
}

/// Geodesic distance between two rotations, in degrees.
pub fn rotation_error_deg(a: &DMat3, b: &DMat3) -> f64 {
    let d = a.transpose() * *b;
    let cos = ((d.x_axis.x + d.y_axis.y + d.z_axis.z - 1.0) / 2.0).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Angle between two directions, in degrees.
pub fn angle_deg(a: &DVec3, b: &DVec3) -> f64 {
    let cos = (a.dot(*b) / (a.length() * b.length())).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}
