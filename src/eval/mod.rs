//! Offline evaluation of pose sequences.

pub mod metrics;

pub use metrics::{
    compare_runs, mean_errors, pose_error, stability, ComparisonReport, MeanPoseErrors,
    PoseError, PoseErrorComparison, Stability, StabilityComparison,
};
