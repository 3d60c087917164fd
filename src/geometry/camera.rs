//! Pinhole camera intrinsics.

use nalgebra::{Matrix3, Point2, Vector3};

use super::GeometryError;

/// Pinhole intrinsics (fx, fy, cx, cy), no distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Build from a 3x3 K matrix of the form `[fx 0 cx; 0 fy cy; 0 0 1]`.
    pub fn from_k(k: &Matrix3<f64>) -> Result<Self, GeometryError> {
        let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
        if !(fx.is_finite() && fy.is_finite()) || fx <= 0.0 || fy <= 0.0 {
            return Err(GeometryError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={fx}, fy={fy}"
            )));
        }
        if (k[(2, 2)] - 1.0).abs() > 1e-9 || k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 {
            return Err(GeometryError::InvalidIntrinsics(
                "last row of K must be [0, 0, 1]".to_string(),
            ));
        }
        Ok(Self::new(fx, fy, k[(0, 2)], k[(1, 2)]))
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Pixel coordinates of a camera-frame point, `None` behind the camera.
    pub fn project(&self, p: &Vector3<f64>) -> Option<Point2<f64>> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Camera-frame point at depth `z` seen through pixel `(u, v)`.
    ///
    /// Equivalent to `K⁻¹ [u, v, 1]ᵀ · z`.
    pub fn backproject(&self, u: f64, v: f64, z: f64) -> Vector3<f64> {
        Vector3::new((u - self.cx) * z / self.fx, (v - self.cy) * z / self.fy, z)
    }
}
