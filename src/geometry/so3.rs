//! SO(3) helpers used to build viewpoint rotations.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Threshold below which the cross product with the up vector is treated as
/// degenerate (viewpoint parallel to the up axis).
const PARALLEL_THRESHOLD: f64 = 1e-6;

/// Rotation of a camera placed at `eye` and looking at the origin.
///
/// The columns are the camera axes expressed in the object frame, using the
/// pinhole convention (X right, Y down, Z forward):
///
/// ```text
/// z = -eye / |eye|
/// x = up × z / |up × z|
/// y = z × x
/// ```
///
/// When `eye` is parallel to `up`, the Y axis is used as the up vector instead.
pub fn look_at_rotation(eye: &Vector3<f64>, up: &Vector3<f64>) -> Matrix3<f64> {
    let z = -eye.normalize();
    let mut x = up.cross(&z);
    if x.norm() < PARALLEL_THRESHOLD {
        x = Vector3::y().cross(&z);
    }
    let x = x.normalize();
    let y = z.cross(&x);
    Matrix3::from_columns(&[x, y, z])
}

/// Rotation about the camera optical axis (Z).
pub fn inplane_rotation(angle_rad: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle_rad)
}

/// Extrinsic XYZ Euler angles of `rotation`, in degrees.
pub fn euler_xyz_deg(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (roll, pitch, yaw) = rotation.euler_angles();
    Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}

/// Geodesic angle of a rotation matrix, from its trace, in degrees.
///
/// The trace is clamped to `[-1, 3]` so slightly non-orthonormal input does
/// not produce NaN.
pub fn trace_angle_deg(r: &Matrix3<f64>) -> f64 {
    let trace = r.trace().clamp(-1.0, 3.0);
    ((trace - 1.0) / 2.0).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Convert an orthonormal matrix into a unit quaternion without re-checking it.
pub fn quaternion_from_matrix(r: Matrix3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r))
}
