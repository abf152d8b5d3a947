/// Errors returned by the relative pose pipeline.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    /// The camera intrinsics matrix is singular or not finite.
    #[error("Invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// The two sides of a correspondence set have different lengths.
    #[error("Mismatched correspondence lengths: {0} != {1}")]
    MismatchedLengths(usize, usize),

    /// A match refers to a keypoint index that does not exist.
    #[error("Match {index} refers to a keypoint out of range")]
    InvalidMatch {
        /// Position of the offending match in the match list.
        index: usize,
    },

    /// Too few correspondences to attempt an estimate.
    #[error("Need at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences.
        required: usize,
        /// Number of correspondences provided.
        actual: usize,
    },

    /// The robust estimator could not produce a valid model.
    #[error("Degenerate configuration: {0}")]
    DegenerateConfiguration(String),

    /// The selected model is supported by too few inliers.
    #[error("Too few inliers for the selected model: {actual} < {required}")]
    InsufficientInliers {
        /// Minimum number of inliers.
        required: usize,
        /// Number of inliers of the selected model.
        actual: usize,
    },

    /// The two rays of a correspondence are (nearly) parallel.
    #[error("Ill-conditioned triangulation for point {index}")]
    DegenerateTriangulation {
        /// Index of the correspondence.
        index: usize,
    },

    /// No decomposition produced a proper rotation.
    #[error("Decomposition did not produce a proper rotation")]
    ImproperRotation,
}
