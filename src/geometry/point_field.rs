//! Per-pixel 3D point fields and mask-based validity.
//!
//! A range image in metres is back-projected through the intrinsics into a
//! [`PointField`]. Pixels with range below the minimum threshold carry the zero
//! point. In geometry-free mode there is no range at all and every point is
//! zero; validity then comes from the object mask alone.

use image::{GrayImage, ImageBuffer, Luma};
use nalgebra::{Point2, Vector3};

use super::CameraIntrinsics;

/// Single-channel range image in metres.
pub type RangeImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Binary object mask: any non-zero pixel belongs to the object.
pub type ObjectMask = GrayImage;

/// Range values below this (metres) are treated as missing.
pub const MIN_RANGE: f32 = 0.001;

/// Valid-pixel count under which downstream statistics are unreliable.
pub const LOW_VALIDITY_FLOOR: usize = 10;

/// Camera-frame 3D point per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PointField {
    width: u32,
    height: u32,
    min_range: f32,
    points: Vec<Vector3<f32>>,
}

impl PointField {
    /// All-zero field, used in geometry-free mode.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            min_range: MIN_RANGE,
            points: vec![Vector3::zeros(); (width as usize) * (height as usize)],
        }
    }

    /// Back-project every pixel of `range`; pixels below `min_range` stay zero.
    pub fn from_range(range: &RangeImage, intrinsics: &CameraIntrinsics, min_range: f32) -> Self {
        let (width, height) = range.dimensions();
        let mut points = Vec::with_capacity((width as usize) * (height as usize));
        for (u, v, px) in range.enumerate_pixels() {
            let z = px.0[0];
            if !(z >= min_range) {
                points.push(Vector3::zeros());
                continue;
            }
            let p = intrinsics.backproject(u as f64, v as f64, z as f64);
            points.push(p.cast::<f32>());
        }
        Self {
            width,
            height,
            min_range,
            points,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn min_range(&self) -> f32 {
        self.min_range
    }

    pub fn points(&self) -> &[Vector3<f32>] {
        &self.points
    }

    pub fn get(&self, u: u32, v: u32) -> Option<&Vector3<f32>> {
        if u >= self.width || v >= self.height {
            return None;
        }
        self.points.get((v as usize) * (self.width as usize) + u as usize)
    }

    /// Whether the pixel carries a measured point (range above the threshold).
    pub fn has_range(&self, u: u32, v: u32) -> bool {
        self.get(u, v).is_some_and(|p| p.z >= self.min_range)
    }
}

/// Pixels usable for statistics inside the object.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidMask {
    width: u32,
    height: u32,
    valid: Vec<bool>,
    count: usize,
    low_validity: bool,
}

impl ValidMask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_valid(&self, u: u32, v: u32) -> bool {
        u < self.width
            && v < self.height
            && self.valid[(v as usize) * (self.width as usize) + u as usize]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Set when [`ValidMask::count`] fell below the floor it was built with.
    pub fn is_low_validity(&self) -> bool {
        self.low_validity
    }

    /// Iterate `(u, v)` of valid pixels in row-major order.
    pub fn iter_valid(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.valid
            .iter()
            .enumerate()
            .filter(|(_, ok)| **ok)
            .map(move |(i, _)| ((i % width) as u32, (i / width) as u32))
    }
}

/// Combine range validity and the object mask.
///
/// Normal mode: `valid = (range >= min_range) AND (mask > 0)`.
/// Geometry-free mode: `valid = mask > 0`.
///
/// A count below `floor` is recorded on the result for the caller to report;
/// it is not an error.
pub fn valid_mask(
    field: &PointField,
    mask: &ObjectMask,
    geometry_free: bool,
    floor: usize,
) -> ValidMask {
    let (width, height) = mask.dimensions();
    debug_assert_eq!((width, height), (field.width(), field.height()));

    let valid: Vec<bool> = mask
        .enumerate_pixels()
        .map(|(u, v, px)| px.0[0] > 0 && (geometry_free || field.has_range(u, v)))
        .collect();
    let count = valid.iter().filter(|&&ok| ok).count();

    ValidMask {
        width,
        height,
        valid,
        count,
        low_validity: count < floor,
    }
}

/// Number of object pixels in `mask`.
pub fn mask_pixel_count(mask: &ObjectMask) -> usize {
    mask.pixels().filter(|px| px.0[0] > 0).count()
}

/// Bounding-box centre `((umin + umax) / 2, (vmin + vmax) / 2)` of object pixels.
///
/// Returns `None` for an empty mask.
pub fn mask_centroid_2d(mask: &ObjectMask) -> Option<Point2<f64>> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (u, v, px) in mask.enumerate_pixels() {
        if px.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (u, u, v, v),
            Some((u0, u1, v0, v1)) => (u0.min(u), u1.max(u), v0.min(v), v1.max(v)),
        });
    }
    bounds.map(|(u0, u1, v0, v1)| {
        Point2::new((u0 + u1) as f64 / 2.0, (v0 + v1) as f64 / 2.0)
    })
}
