//! Per-frame observation types.
//!
//! [`ObservationFrame`] is what a caller hands to the tracker for one
//! timestep. [`Observation`] is the tracker's prepared view of it: the range
//! image after denoising and the derived point field. Neither outlives the
//! call that consumes it.

use image::RgbImage;

use crate::geometry::{ObjectMask, PointField, RangeImage};

use super::TrackingError;

/// One timestep of sensor input.
#[derive(Debug, Clone)]
pub struct ObservationFrame {
    index: usize,
    rgb: RgbImage,
    range: Option<RangeImage>,
    mask: Option<ObjectMask>,
}

impl ObservationFrame {
    /// Bundle a frame, checking that range and mask match the RGB resolution.
    pub fn new(
        index: usize,
        rgb: RgbImage,
        range: Option<RangeImage>,
        mask: Option<ObjectMask>,
    ) -> Result<Self, TrackingError> {
        let expected = rgb.dimensions();
        if let Some(r) = &range {
            check_dims(index, "range image", expected, r.dimensions())?;
        }
        if let Some(m) = &mask {
            check_dims(index, "object mask", expected, m.dimensions())?;
        }
        Ok(Self {
            index,
            rgb,
            range,
            mask,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn range(&self) -> Option<&RangeImage> {
        self.range.as_ref()
    }

    pub fn mask(&self) -> Option<&ObjectMask> {
        self.mask.as_ref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    /// Same frame without its mask.
    pub fn without_mask(mut self) -> Self {
        self.mask = None;
        self
    }
}

fn check_dims(
    frame: usize,
    what: &'static str,
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), TrackingError> {
    if expected != actual {
        return Err(TrackingError::DimensionMismatch {
            frame,
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// A frame prepared for rendering and prediction.
#[derive(Debug)]
pub struct Observation<'a> {
    pub frame: &'a ObservationFrame,
    /// Range after denoising; `None` in geometry-free mode or when missing.
    pub range: Option<RangeImage>,
    pub point_field: PointField,
    pub geometry_free: bool,
}

impl Observation<'_> {
    pub fn index(&self) -> usize {
        self.frame.index()
    }

    pub fn rgb(&self) -> &RgbImage {
        self.frame.rgb()
    }

    pub fn mask(&self) -> Option<&ObjectMask> {
        self.frame.mask()
    }
}
