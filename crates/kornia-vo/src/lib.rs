#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Camera intrinsics, lens distortion and pixel normalization.
pub mod camera;

/// Index-aligned correspondence sets.
pub mod correspondence;

/// Cheirality based selection among pose candidates.
pub mod disambiguation;

/// Error types.
pub mod error;

/// Robust (least-median-of-squares) two-view model estimation.
pub mod estimator;

/// Small dense linear algebra helpers.
pub mod linalg;

/// Two-view minimal solvers, decompositions and the relative pose type.
pub mod pose;

/// End-to-end relative pose estimation.
pub mod resolver;

/// Homography vs essential model selection.
pub mod selection;

/// Midpoint triangulation.
pub mod triangulation;

mod utils;

pub use camera::{CalibratedPoint, CameraIntrinsics, PointNormalizer, PolynomialDistortion};
pub use correspondence::CorrespondenceSet;
pub use disambiguation::{Disambiguation, PoseDisambiguator, TieBreak};
pub use error::PoseError;
pub use estimator::{estimate_essential, estimate_homography, LmedsParams, MotionModel};
pub use pose::{Isometry3, MotionModelKind, PoseCandidate, RelativePose, TwoViewModel};
pub use resolver::{RelativePoseResolver, ResolverConfig};
pub use selection::{ModelSelector, SelectionParams};
pub use triangulation::{MidpointTriangulator, ProjectionMatrix, TriangulationParams};
