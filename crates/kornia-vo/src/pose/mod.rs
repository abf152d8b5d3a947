//! # Two-view pose
//!
//! Recovering the relative motion of a camera from 2D correspondences.
//!
//! - essential: essential matrix (epipolar geometry of calibrated points)
//! - homography: homography (planar scenes or pure rotation)
//! - relative: pose candidates, rigid transforms and the relative pose result

mod essential;
pub use essential::*;

mod homography;
pub use homography::*;

mod relative;
pub use relative::*;

mod utils;
