use argh::FromArgs;
use glam::{DMat3, DVec2, DVec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use kornia_vo::{
    CameraIntrinsics, Isometry3, PointNormalizer, PolynomialDistortion, RelativePose, RelativePoseResolver,
    ResolverConfig,
};

#[derive(FromArgs)]
/// Chain relative poses over a sequence of frame pairs
struct Args {
    /// path to a JSON sequence of frame pairs; a synthetic orbit is used if omitted
    #[argh(option)]
    input: Option<PathBuf>,

    /// path to a JSON resolver configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of synthetic frames
    #[argh(option, default = "10")]
    frames: usize,

    /// pixel noise of the synthetic keypoints
    #[argh(option, default = "0.5")]
    noise: f64,

    /// seed of the synthetic scene
    #[argh(option, default = "0")]
    seed: u64,
}

/// Keypoints of two frames and the `(query, train)` matches between them.
///
/// Pairs in a sequence file are assembled by the caller: the chain appends each
/// accepted pose to the last accepted one, so `keypoints1` should come from the
/// last accepted frame. `frames` labels the pair as `(reference, current)`;
/// unlabelled pairs are taken as consecutive frames `(i, i + 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FramePair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frames: Option<(usize, usize)>,
    keypoints1: Vec<DVec2>,
    keypoints2: Vec<DVec2>,
    matches: Vec<(usize, usize)>,
}

#[derive(Debug, Deserialize)]
struct SequenceFile {
    intrinsics: CameraIntrinsics,
    #[serde(default)]
    distortion: Option<PolynomialDistortion>,
    #[serde(default)]
    config: Option<ResolverConfig>,
    pairs: Vec<FramePair>,
}

/// Absolute camera poses accumulated from relative poses.
#[derive(Debug, Clone, Serialize)]
struct PoseChain {
    poses: Vec<Isometry3>,
    trajectory: Vec<DVec3>,
}

impl PoseChain {
    fn new() -> Self {
        Self {
            poses: vec![Isometry3::IDENTITY],
            trajectory: vec![DVec3::ZERO],
        }
    }

    fn last(&self) -> Isometry3 {
        self.poses.last().copied().unwrap_or(Isometry3::IDENTITY)
    }

    /// `pose_k = T_rel^-1 * pose_{k-1}`; the trajectory sums the pose translations.
    fn push(&mut self, relative: &RelativePose) {
        let pose = relative.inverse() * self.last();
        let position = self.trajectory.last().copied().unwrap_or(DVec3::ZERO) + pose.translation;
        self.poses.push(pose);
        self.trajectory.push(position);
    }
}

#[derive(Debug, Serialize)]
struct PairReport {
    reference: usize,
    current: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pose: Option<RelativePose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    pairs: Vec<PairReport>,
    #[serde(flatten)]
    chain: PoseChain,
}

/// A camera moving sideways while yawing in front of a random landmark field.
struct SyntheticOrbit {
    landmarks: Vec<DVec3>,
    normalizer: PointNormalizer,
    width: f64,
    height: f64,
    noise: f64,
    rng: StdRng,
}

impl SyntheticOrbit {
    fn new(normalizer: PointNormalizer, noise: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let landmarks = (0..800)
            .map(|_| {
                DVec3::new(
                    rng.random_range(-8.0..8.0),
                    rng.random_range(-2.5..2.5),
                    rng.random_range(8.0..20.0),
                )
            })
            .collect();
        Self {
            landmarks,
            normalizer,
            width: 1241.0,
            height: 376.0,
            noise,
            rng,
        }
    }

    /// World to camera transform of frame `k`.
    fn camera(&self, k: usize) -> Isometry3 {
        let fk = k as f64;
        let rotation = DMat3::from_rotation_y(-(1.5 * fk).to_radians());
        let center = DVec3::new(0.4 * fk, 0.0, 0.1 * fk);
        Isometry3::new(rotation, -(rotation * center))
    }

    /// Ground truth relative pose from frame `a` to frame `b`.
    fn relative(&self, a: usize, b: usize) -> Isometry3 {
        self.camera(b) * self.camera(a).inverse()
    }

    fn pixel(&mut self, p: DVec3) -> Option<DVec2> {
        if p.z < 1.0 {
            return None;
        }
        let px = self.normalizer.denormalize(p.truncate() / p.z);
        if px.x < 0.0 || px.y < 0.0 || px.x >= self.width || px.y >= self.height {
            return None;
        }
        let jitter = if self.noise > 0.0 {
            DVec2::new(
                self.rng.random_range(-self.noise..self.noise),
                self.rng.random_range(-self.noise..self.noise),
            )
        } else {
            DVec2::ZERO
        };
        Some(px + jitter)
    }

    fn pair(&mut self, a: usize, b: usize) -> FramePair {
        let (cam_a, cam_b) = (self.camera(a), self.camera(b));
        let mut pair = FramePair {
            frames: Some((a, b)),
            keypoints1: Vec::new(),
            keypoints2: Vec::new(),
            matches: Vec::new(),
        };
        for i in 0..self.landmarks.len() {
            let landmark = self.landmarks[i];
            let (Some(p1), Some(p2)) = (
                self.pixel(cam_a.transform_point(landmark)),
                self.pixel(cam_b.transform_point(landmark)),
            ) else {
                continue;
            };
            pair.matches.push((pair.keypoints1.len(), pair.keypoints2.len()));
            pair.keypoints1.push(p1);
            pair.keypoints2.push(p2);
        }
        pair
    }
}

fn rotation_error_deg(a: &DMat3, b: &DMat3) -> f64 {
    let d = a.transpose() * *b;
    let cos = ((d.x_axis.x + d.y_axis.y + d.z_axis.z - 1.0) / 2.0).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

fn process_pair(
    resolver: &RelativePoseResolver,
    normalizer: &PointNormalizer,
    pair: &FramePair,
    (reference, current): (usize, usize),
    chain: &mut PoseChain,
) -> PairReport {
    match resolver.resolve_matches(normalizer, &pair.keypoints1, &pair.keypoints2, &pair.matches) {
        Ok(pose) => {
            log::info!(
                "pair {reference}->{current}: {:?}, {} inliers, valid fraction {:.3}",
                pose.model,
                pose.inlier_count,
                pose.valid_fraction
            );
            chain.push(&pose);
            PairReport {
                reference,
                current,
                pose: Some(pose),
                skipped: None,
            }
        }
        Err(err) => {
            log::warn!("pair {reference}->{current} skipped: {err}");
            PairReport {
                reference,
                current,
                pose: None,
                skipped: Some(err.to_string()),
            }
        }
    }
}

fn run_sequence(
    file: SequenceFile,
    config: Option<ResolverConfig>,
) -> Result<Report, Box<dyn std::error::Error>> {
    let normalizer = PointNormalizer::new(file.intrinsics, file.distortion)?;
    let resolver = RelativePoseResolver::new(config.or(file.config).unwrap_or_default());

    let mut chain = PoseChain::new();
    let mut pairs = Vec::with_capacity(file.pairs.len());
    let mut last_accepted = 0;
    for (i, pair) in file.pairs.iter().enumerate() {
        let (reference, current) = pair.frames.unwrap_or((i, i + 1));
        if reference != last_accepted {
            log::warn!(
                "pair {reference}->{current} does not start at the last accepted frame {last_accepted}"
            );
        }
        let report = process_pair(&resolver, &normalizer, pair, (reference, current), &mut chain);
        if report.pose.is_some() {
            last_accepted = current;
        }
        pairs.push(report);
    }
    Ok(Report { pairs, chain })
}

fn run_synthetic(
    args: &Args,
    config: Option<ResolverConfig>,
) -> Result<Report, Box<dyn std::error::Error>> {
    let intrinsics = CameraIntrinsics::new(718.856, 718.856, 607.1928, 185.2157);
    let normalizer = PointNormalizer::new(intrinsics, None)?;
    let resolver = RelativePoseResolver::new(config.unwrap_or_default());
    let mut orbit = SyntheticOrbit::new(normalizer.clone(), args.noise, args.seed);

    let mut chain = PoseChain::new();
    let mut pairs = Vec::new();
    // a rejected frame keeps the previous reference
    let mut reference = 0;
    for current in 1..args.frames {
        let pair = orbit.pair(reference, current);
        let report = process_pair(&resolver, &normalizer, &pair, (reference, current), &mut chain);
        if let Some(pose) = &report.pose {
            let truth = orbit.relative(reference, current);
            log::info!(
                "rotation error {:.4} deg",
                rotation_error_deg(&pose.rotation, &truth.rotation)
            );
            reference = current;
        }
        pairs.push(report);
    }
    Ok(Report { pairs, chain })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => None,
    };

    let report = match &args.input {
        Some(path) => {
            let file: SequenceFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            log::info!("loaded {} frame pairs from {}", file.pairs.len(), path.display());
            run_sequence(file, config)?
        }
        None => run_synthetic(&args, config)?,
    };

    let resolved = report.pairs.iter().filter(|p| p.pose.is_some()).count();
    log::info!("resolved {resolved} of {} pairs", report.pairs.len());
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
