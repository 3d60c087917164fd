//! Cold-start hypothesis generation.
//!
//! Produces a translation estimate from the object mask and pairs it with a
//! fixed, roughly uniform covering of SO(3):
//!
//! 1. viewpoints on an icosphere (camera positions around the object),
//! 2. a look-at rotation per viewpoint,
//! 3. a set of in-plane rotations about the optical axis per viewpoint.
//!
//! The rotation set is built once per generator and never sampled randomly,
//! so every registration sees the same candidates in the same order.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::so3::{inplane_rotation, look_at_rotation, quaternion_from_matrix};
use crate::geometry::{mask_centroid_2d, CameraIntrinsics, ObjectMask, PointField, RigidPose, ValidMask};

use super::icosphere::icosphere_vertices;
use super::HypothesisBatch;

/// Rotation-grid and translation-heuristic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisConfig {
    /// Minimum number of icosphere viewpoints (rounded up to a full level).
    pub min_views: usize,
    /// Step between in-plane rotations, degrees.
    pub inplane_step_deg: f64,
    /// Depth in geometry-free mode is `diameter * geometry_free_depth_factor`.
    pub geometry_free_depth_factor: f64,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            min_views: 40,
            inplane_step_deg: 60.0,
            geometry_free_depth_factor: 2.5,
        }
    }
}

/// Where the depth of a translation estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthSource {
    /// Median of measured range inside the mask.
    MeasuredRange,
    /// `diameter * k` heuristic. Only approximate: real depth is unobserved.
    DiameterHeuristic,
    /// No usable depth: the translation is the zero vector.
    Unavailable,
}

/// Initial object translation for registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationEstimate {
    pub translation: Vector3<f64>,
    pub depth_source: DepthSource,
}

impl TranslationEstimate {
    pub fn is_valid(&self) -> bool {
        self.depth_source != DepthSource::Unavailable
    }

    fn unavailable() -> Self {
        Self {
            translation: Vector3::zeros(),
            depth_source: DepthSource::Unavailable,
        }
    }
}

/// Builds cold-start hypothesis batches.
#[derive(Debug, Clone)]
pub struct HypothesisGenerator {
    config: HypothesisConfig,
    rotations: Vec<UnitQuaternion<f64>>,
}

impl HypothesisGenerator {
    pub fn new(config: HypothesisConfig) -> Self {
        let rotations = rotation_grid(config.min_views, config.inplane_step_deg);
        debug!(
            n_rotations = rotations.len(),
            min_views = config.min_views,
            inplane_step_deg = config.inplane_step_deg,
            "built rotation grid"
        );
        Self { config, rotations }
    }

    pub fn config(&self) -> &HypothesisConfig {
        &self.config
    }

    pub fn rotations(&self) -> &[UnitQuaternion<f64>] {
        &self.rotations
    }

    /// Estimate the object translation from the mask's bounding-box centre.
    ///
    /// Normal mode uses the median measured depth over `valid`; if there is no
    /// valid pixel the estimate is the zero vector flagged
    /// [`DepthSource::Unavailable`]. Geometry-free mode places the object at
    /// `diameter * geometry_free_depth_factor`, which is a heuristic: the
    /// result is only as good as that guess.
    pub fn estimate_translation(
        &self,
        mask: &ObjectMask,
        field: &PointField,
        valid: &ValidMask,
        intrinsics: &CameraIntrinsics,
        diameter: f64,
        geometry_free: bool,
    ) -> TranslationEstimate {
        let Some(center) = mask_centroid_2d(mask) else {
            debug!("empty mask, cannot estimate translation");
            return TranslationEstimate::unavailable();
        };

        let (depth, depth_source) = if geometry_free {
            (
                diameter * self.config.geometry_free_depth_factor,
                DepthSource::DiameterHeuristic,
            )
        } else {
            let depths: Vec<f64> = valid
                .iter_valid()
                .filter_map(|(u, v)| field.get(u, v).map(|p| p.z as f64))
                .collect();
            match median(depths) {
                Some(z) => (z, DepthSource::MeasuredRange),
                None => {
                    debug!("no valid range inside mask, translation estimate unavailable");
                    return TranslationEstimate::unavailable();
                }
            }
        };

        TranslationEstimate {
            translation: intrinsics.backproject(center.x, center.y, depth),
            depth_source,
        }
    }

    /// One hypothesis per grid rotation, all sharing `translation`.
    pub fn generate(&self, translation: &Vector3<f64>) -> HypothesisBatch {
        self.rotations
            .iter()
            .map(|r| RigidPose::new(*r, *translation))
            .collect()
    }
}

impl Default for HypothesisGenerator {
    fn default() -> Self {
        Self::new(HypothesisConfig::default())
    }
}

/// Object-in-camera rotations for every (viewpoint, in-plane angle) pair.
///
/// For a camera at viewpoint `p` looking at the object origin, the camera
/// pose in the object frame is `R_ob_cam = look_at(p) * Rz(angle)`; the
/// hypothesis is its inverse `R_cam_ob = R_ob_camᵀ`.
pub fn rotation_grid(min_views: usize, inplane_step_deg: f64) -> Vec<UnitQuaternion<f64>> {
    let n_inplane = inplane_count(inplane_step_deg);
    let views = icosphere_vertices(min_views);
    let mut rotations = Vec::with_capacity(views.len() * n_inplane);
    for eye in &views {
        let cam_in_obj = quaternion_from_matrix(look_at_rotation(eye, &Vector3::z()));
        for k in 0..n_inplane {
            let angle = (k as f64 * inplane_step_deg).to_radians();
            let rotated = cam_in_obj * inplane_rotation(angle);
            rotations.push(rotated.inverse());
        }
    }
    rotations
}

/// Number of angles in `[0, 360)` spaced by `step_deg` (at least one).
fn inplane_count(step_deg: f64) -> usize {
    if !(step_deg > 0.0) {
        return 1;
    }
    ((360.0 / step_deg).ceil() as usize).max(1)
}

/// Median; the mean of the two middle values for an even count.
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{valid_mask, RangeImage, MIN_RANGE};
    use approx::assert_relative_eq;
    use image::Luma;

    fn cam() -> CameraIntrinsics {
        CameraIntrinsics::new(500.0, 500.0, 10.0, 10.0)
    }

    fn square_mask() -> ObjectMask {
        let mut mask = ObjectMask::new(20, 20);
        for v in 4..=8 {
            for u in 6..=12 {
                mask.put_pixel(u, v, Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn test_default_grid_size() {
        let generator = HypothesisGenerator::default();

        assert_eq!(generator.rotations().len(), 42 * 6);
    }

    #[test]
    fn test_grid_is_identical_across_generators() {
        let a = HypothesisGenerator::default();
        let b = HypothesisGenerator::default();

        assert_eq!(a.rotations(), b.rotations());
    }

    #[test]
    fn test_grid_rotations_are_orthonormal() {
        for q in rotation_grid(40, 60.0) {
            let pose = RigidPose::new(q, Vector3::zeros());
            assert!(pose.is_rigid());
        }
    }

    #[test]
    fn test_grid_covers_distinct_rotations() {
        let grid = rotation_grid(40, 60.0);
        for (i, a) in grid.iter().enumerate() {
            for b in &grid[i + 1..] {
                assert!(a.angle_to(b) > 1e-6);
            }
        }
    }

    #[test]
    fn test_generate_shares_translation() {
        let generator = HypothesisGenerator::default();
        let t = Vector3::new(0.1, 0.2, 0.9);
        let batch = generator.generate(&t);

        assert_eq!(batch.len(), generator.rotations().len());
        assert!(batch.iter().all(|p| p.translation == t));
    }

    #[test]
    fn test_geometry_free_depth_is_diameter_times_factor() {
        let generator = HypothesisGenerator::default();
        let mask = square_mask();
        let field = PointField::zeros(20, 20);
        let valid = valid_mask(&field, &mask, true, 10);

        let est = generator.estimate_translation(&mask, &field, &valid, &cam(), 0.4, true);

        assert_eq!(est.depth_source, DepthSource::DiameterHeuristic);
        assert_eq!(est.translation.z, 0.4 * 2.5);
        // bbox centre (9, 6) back-projected at z = 1.0
        assert_relative_eq!(est.translation.x, (9.0 - 10.0) * 1.0 / 500.0, epsilon = 1e-12);
        assert_relative_eq!(est.translation.y, (6.0 - 10.0) * 1.0 / 500.0, epsilon = 1e-12);
    }

    #[test]
    fn test_measured_depth_uses_median_inside_mask() {
        let generator = HypothesisGenerator::default();
        let mask = square_mask();
        let mut range = RangeImage::new(20, 20);
        // Four valid samples inside the mask, one outlier outside.
        range.put_pixel(6, 4, Luma([0.5]));
        range.put_pixel(7, 4, Luma([0.7]));
        range.put_pixel(8, 4, Luma([0.9]));
        range.put_pixel(9, 4, Luma([3.0]));
        range.put_pixel(0, 0, Luma([10.0]));
        let field = PointField::from_range(&range, &cam(), MIN_RANGE);
        let valid = valid_mask(&field, &mask, false, 1);

        let est = generator.estimate_translation(&mask, &field, &valid, &cam(), 0.4, false);

        assert_eq!(est.depth_source, DepthSource::MeasuredRange);
        assert_relative_eq!(est.translation.z, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_no_valid_range_yields_unavailable_zero() {
        let generator = HypothesisGenerator::default();
        let mask = square_mask();
        let field = PointField::zeros(20, 20);
        let valid = valid_mask(&field, &mask, false, 10);

        let est = generator.estimate_translation(&mask, &field, &valid, &cam(), 0.4, false);

        assert!(!est.is_valid());
        assert_eq!(est.translation, Vector3::zeros());
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(Vec::new()), None);
    }
}
