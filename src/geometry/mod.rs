//! Geometry utilities: rigid poses, intrinsics, point fields, surface models.

pub mod camera;
pub mod model;
pub mod point_field;
pub mod pose;
pub mod range_filter;
pub mod so3;

use thiserror::Error;

pub use camera::CameraIntrinsics;
pub use model::SurfaceModel;
pub use point_field::{
    mask_centroid_2d, mask_pixel_count, valid_mask, ObjectMask, PointField, RangeImage, ValidMask,
    LOW_VALIDITY_FLOOR, MIN_RANGE,
};
pub use pose::RigidPose;
pub use range_filter::RangeFilterConfig;

/// Errors raised when geometric input violates its invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// Surface model without any points.
    #[error("surface model has no points")]
    EmptyModel,
    /// Normals do not pair up with points.
    #[error("surface model has {points} points but {normals} normals")]
    NormalCountMismatch { points: usize, normals: usize },
    /// Bottom row of a homogeneous matrix is not `[0, 0, 0, 1]`.
    #[error("matrix is not homogeneous (bottom row must be [0, 0, 0, 1])")]
    NotHomogeneous,
    /// Rotation block is not a proper rotation.
    #[error("rotation block is not rigid: det={det:.6}, orthonormality error={ortho_error:.6}")]
    NotRigid { det: f64, ortho_error: f64 },
    /// Camera matrix is unusable.
    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),
}
