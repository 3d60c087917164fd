//! Rigid object-to-camera transform.
//!
//! A [`RigidPose`] maps object-local coordinates into the camera frame:
//!
//! ```text
//! p_cam = R * p_obj + t
//! ```
//!
//! The rotation is stored as a unit quaternion, so every value of this type
//! has an orthonormal rotation with determinant +1. Arbitrary 4x4 input
//! (pose files, predictor matrices) goes through [`RigidPose::try_from_matrix`],
//! which rejects anything that is not a rigid transform.

use nalgebra::{Matrix3, Matrix4, UnitQuaternion, Vector3};

use super::GeometryError;
use super::so3::quaternion_from_matrix;

/// Tolerance used when accepting a 4x4 matrix as a rigid transform.
pub const RIGID_TOLERANCE: f64 = 1e-3;

/// Rigid transform (object -> camera).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidPose {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl RigidPose {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from a rotation matrix that is already known to be orthonormal.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: quaternion_from_matrix(rotation),
            translation,
        }
    }

    /// Parse a homogeneous 4x4 matrix, checking the rigid-transform invariants.
    ///
    /// The bottom row must be `[0, 0, 0, 1]` and the rotation block must be
    /// orthonormal with determinant +1, both within [`RIGID_TOLERANCE`].
    pub fn try_from_matrix(m: &Matrix4<f64>) -> Result<Self, GeometryError> {
        let bottom = m.fixed_view::<1, 4>(3, 0);
        let expected = [0.0, 0.0, 0.0, 1.0];
        if bottom
            .iter()
            .zip(expected.iter())
            .any(|(a, b)| (a - b).abs() > RIGID_TOLERANCE)
        {
            return Err(GeometryError::NotHomogeneous);
        }

        let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let ortho_error = orthonormality_error(&rotation);
        let det = rotation.determinant();
        if ortho_error > RIGID_TOLERANCE || (det - 1.0).abs() > RIGID_TOLERANCE {
            return Err(GeometryError::NotRigid { det, ortho_error });
        }

        let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
        Ok(Self::from_rt(rotation, translation))
    }

    /// Homogeneous 4x4 matrix `[R | t; 0 0 0 1]`.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &RigidPose) -> RigidPose {
        RigidPose {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn inverse(&self) -> RigidPose {
        let inv_rot = self.rotation.inverse();
        RigidPose {
            rotation: inv_rot,
            translation: -(inv_rot * self.translation),
        }
    }

    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// New pose with the same rotation and a replaced translation.
    pub fn with_translation(&self, translation: Vector3<f64>) -> RigidPose {
        RigidPose {
            rotation: self.rotation,
            translation,
        }
    }

    /// Geodesic angle between the two rotations, in radians.
    pub fn rotation_angle_to(&self, other: &RigidPose) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    /// Whether the rotation block passes the orthonormality/determinant check.
    pub fn is_rigid(&self) -> bool {
        let r = self.rotation_matrix();
        orthonormality_error(&r) <= RIGID_TOLERANCE
            && (r.determinant() - 1.0).abs() <= RIGID_TOLERANCE
    }
}

impl Default for RigidPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Largest absolute entry of `RᵀR - I`.
pub fn orthonormality_error(r: &Matrix3<f64>) -> f64 {
    (r.transpose() * r - Matrix3::identity()).amax()
}
