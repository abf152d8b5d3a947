mod common;

use common::{angle_deg, correspondences, project, random_cloud, rotation_error_deg};
use glam::{DMat3, DMat4, DVec2, DVec3};
use kornia_vo::linalg::is_rotation;
use kornia_vo::{
    estimate_essential, CameraIntrinsics, CorrespondenceSet, LmedsParams, MotionModelKind,
    PointNormalizer, PolynomialDistortion, PoseError, RelativePoseResolver, ResolverConfig,
    TieBreak,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn kitti_intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::new(718.856, 718.856, 607.1928, 185.2157)
}

#[test]
fn test_rotation_about_y_with_lateral_motion() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(0);
    let r0 = DMat3::from_rotation_y(10f64.to_radians());
    let t0 = DVec3::X;
    let points = random_cloud(&mut rng, 200);
    let (x1, x2) = project(&points, &r0, &t0);

    // go through pixels so the normalization is part of the run
    let normalizer = PointNormalizer::new(kitti_intrinsics(), None)?;
    let px1: Vec<DVec2> = x1.iter().map(|p| normalizer.denormalize(*p)).collect();
    let px2: Vec<DVec2> = x2.iter().map(|p| normalizer.denormalize(*p)).collect();

    let pose = RelativePoseResolver::default().resolve(&normalizer, &px1, &px2)?;
    assert_eq!(pose.model, MotionModelKind::Essential);
    assert_eq!(pose.inlier_count, 200);
    assert!(is_rotation(&pose.rotation, 1e-9));
    assert!(rotation_error_deg(&pose.rotation, &r0) < 1e-3);
    assert!(angle_deg(&pose.translation, &t0) < 1.0);
    assert!((pose.translation.length() - 1.0).abs() < 1e-9);
    assert!(pose.valid_fraction > 0.99);
    Ok(())
}

#[test]
fn test_distorted_pixels() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(1);
    let r0 = DMat3::from_rotation_x(-0.05) * DMat3::from_rotation_y(0.1);
    let t0 = DVec3::new(-0.8, 0.1, 0.3);
    let points = random_cloud(&mut rng, 150);
    let (x1, x2) = project(&points, &r0, &t0);

    let distortion = PolynomialDistortion::from_coefficients(&[-0.1, 0.02, 1e-4, -2e-4, 0.0]);
    let normalizer = PointNormalizer::new(kitti_intrinsics(), Some(distortion))?;
    let px1: Vec<DVec2> = x1.iter().map(|p| normalizer.denormalize(*p)).collect();
    let px2: Vec<DVec2> = x2.iter().map(|p| normalizer.denormalize(*p)).collect();

    // keypoints in shuffled order, linked through (query, train) matches
    let kp2: Vec<DVec2> = px2.iter().rev().copied().collect();
    let matches: Vec<(usize, usize)> = (0..px1.len()).map(|i| (i, px1.len() - 1 - i)).collect();

    let pose = RelativePoseResolver::default().resolve_matches(&normalizer, &px1, &kp2, &matches)?;
    assert_eq!(pose.model, MotionModelKind::Essential);
    assert!(rotation_error_deg(&pose.rotation, &r0) < 1e-3);
    assert!(angle_deg(&pose.translation, &t0) < 1.0);
    Ok(())
}

#[test]
fn test_planar_scene_selects_homography() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(2);
    let r0 = DMat3::from_rotation_y(5f64.to_radians());
    let t0 = DVec3::new(0.5, 0.0, 0.0);

    // a dominant plane plus some background structure
    let mut points: Vec<DVec3> = (0..1200)
        .map(|_| {
            let x = rng.random_range(-2.0..2.0);
            let y = rng.random_range(-2.0..2.0);
            DVec3::new(x, y, 5.0 + 0.2 * x)
        })
        .collect();
    points.extend((0..150).map(|_| {
        DVec3::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
            rng.random_range(9.0..12.0),
        )
    }));
    let set = correspondences(&points, &r0, &t0);

    // the essential matrix explains every correspondence
    let essential = estimate_essential(&set, &LmedsParams::default())?;
    assert!(essential.inlier_count >= 1200);

    let pose = RelativePoseResolver::default().resolve_calibrated(&set)?;
    assert_eq!(pose.model, MotionModelKind::Homography);
    assert_eq!(pose.inlier_count, 1200);
    assert!(is_rotation(&pose.rotation, 1e-6));
    assert!((pose.translation.length() - 1.0).abs() < 1e-9);
    assert!(pose.valid_fraction > 0.99);
    Ok(())
}

fn coplanar_points(rng: &mut StdRng, n: usize) -> Vec<DVec3> {
    (0..n)
        .map(|_| {
            let x = rng.random_range(-2.0..2.0);
            let y = rng.random_range(-2.0..2.0);
            DVec3::new(x, y, 5.0 + 0.2 * x)
        })
        .collect()
}

#[test]
fn test_coplanar_scene_recovers_motion() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(6);
    let r0 = DMat3::from_rotation_y(5f64.to_radians());
    let t0 = DVec3::new(0.5, 0.0, 0.0);
    let set = correspondences(&coplanar_points(&mut rng, 1200), &r0, &t0);

    // the essential fit still explains most of a fully planar scene
    let essential = estimate_essential(&set, &LmedsParams::default())?;
    assert!(essential.inlier_count > 600, "{}", essential.inlier_count);

    let resolver = RelativePoseResolver::default();
    assert!(matches!(resolver.config().tie_break, TieBreak::SecondWhenTied));
    let pose = resolver.resolve_calibrated(&set)?;
    assert_eq!(pose.model, MotionModelKind::Homography);
    assert_eq!(pose.inlier_count, 1200);
    assert!(rotation_error_deg(&pose.rotation, &r0) < 1.0);
    assert!(angle_deg(&pose.translation, &t0) < 1.0);
    assert!(pose.valid_fraction > 0.99);
    Ok(())
}

#[test]
fn test_small_coplanar_scene_uses_essential() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(6);
    let r0 = DMat3::from_rotation_y(5f64.to_radians());
    let t0 = DVec3::new(0.5, 0.0, 0.0);
    let points = coplanar_points(&mut rng, 1200);
    let set = correspondences(&points[..400], &r0, &t0);

    // below the homography threshold the essential model is kept
    let pose = RelativePoseResolver::default().resolve_calibrated(&set)?;
    assert_eq!(pose.model, MotionModelKind::Essential);
    assert!(pose.inlier_count > 200);
    assert!(is_rotation(&pose.rotation, 1e-9));
    Ok(())
}

#[test]
fn test_all_outliers_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(3);
    let mut random_points = |n: usize| -> Vec<DVec2> {
        (0..n)
            .map(|_| DVec2::new(rng.random_range(-0.5..0.5), rng.random_range(-0.5..0.5)))
            .collect()
    };
    let x1 = random_points(80);
    let x2 = random_points(80);
    let set = CorrespondenceSet::new(x1, x2)?;

    let resolver = RelativePoseResolver::new(ResolverConfig {
        min_matches: 20,
        ..ResolverConfig::default()
    });
    let res = resolver.resolve_calibrated(&set);
    assert!(
        matches!(res, Err(PoseError::InsufficientInliers { required: 100, .. })),
        "{res:?}"
    );
    Ok(())
}

#[test]
fn test_random_motions_give_proper_rotations() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(4);
    let resolver = RelativePoseResolver::default();

    for _ in 0..5 {
        let axis = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        )
        .normalize();
        let r0 = DMat3::from_axis_angle(axis, rng.random_range(2.0f64..15.0).to_radians());
        let t0 = DVec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-0.5..0.5),
            rng.random_range(-0.3..0.3),
        )
        .normalize();

        let points = random_cloud(&mut rng, 150);
        let pose = resolver.resolve_calibrated(&correspondences(&points, &r0, &t0))?;

        assert!(is_rotation(&pose.rotation, 1e-9));
        assert!(rotation_error_deg(&pose.rotation, &r0) < 1e-3);
        assert!(angle_deg(&pose.translation, &t0) < 1.0);

        let id = pose.inverse() * pose.isometry();
        assert!(id.to_matrix().abs_diff_eq(DMat4::IDENTITY, 1e-9));
        assert!((pose.to_matrix() * pose.inverse().to_matrix()).abs_diff_eq(DMat4::IDENTITY, 1e-9));
    }
    Ok(())
}

#[test]
fn test_noisy_correspondences_with_outliers() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(5);
    let r0 = DMat3::from_rotation_y(8f64.to_radians());
    let t0 = DVec3::new(1.0, 0.0, 0.2);
    let points = random_cloud(&mut rng, 300);
    let (mut x1, mut x2) = project(&points, &r0, &t0);

    // about half a pixel of noise at KITTI focal length
    for p in x1.iter_mut().chain(x2.iter_mut()) {
        *p += DVec2::new(rng.random_range(-5e-4..5e-4), rng.random_range(-5e-4..5e-4));
    }
    // replace a fifth of the matches by random points
    for p in x2.iter_mut().step_by(5) {
        *p = DVec2::new(rng.random_range(-0.6..0.6), rng.random_range(-0.6..0.6));
    }

    let pose = RelativePoseResolver::default().resolve_calibrated(&CorrespondenceSet::new(x1, x2)?)?;
    assert_eq!(pose.model, MotionModelKind::Essential);
    assert!(pose.inlier_count >= 200 && pose.inlier_count <= 260);
    assert!(rotation_error_deg(&pose.rotation, &r0) < 1.0);
    assert!(angle_deg(&pose.translation, &t0) < 5.0);
    assert!(pose.valid_fraction > 0.9);
    Ok(())
}
