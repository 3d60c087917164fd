//! Deterministic stand-ins for the renderer and predictors.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use image::{Luma, RgbImage};
use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::geometry::{
    CameraIntrinsics, ObjectMask, PointField, RangeImage, RigidPose, SurfaceModel, MIN_RANGE,
};
use crate::predictor::{
    CropRenderer, PredictorSample, RefinePredictor, RenderedCrop, ScorePredictor,
};

use super::{Observation, ObservationFrame};

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

pub fn camera() -> CameraIntrinsics {
    CameraIntrinsics::new(100.0, 100.0, 16.0, 12.0)
}

/// Eight corners of a cube with side 0.2 (diameter ~0.346).
pub fn unit_model() -> SurfaceModel {
    let mut points = Vec::new();
    for &x in &[-0.1, 0.1] {
        for &y in &[-0.1, 0.1] {
            for &z in &[-0.1, 0.1] {
                points.push(Vector3::new(x, y, z));
            }
        }
    }
    let normals = points.iter().map(|p: &Vector3<f64>| p.normalize()).collect();
    SurfaceModel::new(points, normals).unwrap()
}

/// Mask covering a rectangle centred on the principal point.
pub fn centered_mask() -> ObjectMask {
    let mut mask = ObjectMask::new(WIDTH, HEIGHT);
    for v in 8..=16 {
        for u in 12..=20 {
            mask.put_pixel(u, v, Luma([255]));
        }
    }
    mask
}

/// Constant range `z` everywhere.
pub fn flat_range(z: f32) -> RangeImage {
    RangeImage::from_pixel(WIDTH, HEIGHT, Luma([z]))
}

pub fn frame(index: usize, range: Option<RangeImage>, mask: Option<ObjectMask>) -> ObservationFrame {
    ObservationFrame::new(index, RgbImage::new(WIDTH, HEIGHT), range, mask).unwrap()
}

/// Frame wrapper that can build an [`Observation`] without a tracker.
pub struct FixtureFrame(pub ObservationFrame);

impl FixtureFrame {
    pub fn observe(&self) -> Observation<'_> {
        let range = self.0.range().cloned();
        let point_field = match &range {
            Some(r) => PointField::from_range(r, &camera(), MIN_RANGE),
            None => PointField::zeros(WIDTH, HEIGHT),
        };
        Observation {
            frame: &self.0,
            range,
            point_field,
            geometry_free: false,
        }
    }
}

pub fn observation_fixture() -> (FixtureFrame, CameraIntrinsics) {
    (
        FixtureFrame(frame(0, Some(flat_range(1.0)), Some(centered_mask()))),
        camera(),
    )
}

/// Renders any pose in front of the camera; fails for poses behind it.
#[derive(Debug, Default)]
pub struct TestRenderer {
    calls: AtomicUsize,
}

impl TestRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CropRenderer for TestRenderer {
    fn render(
        &self,
        _model: &SurfaceModel,
        _intrinsics: &CameraIntrinsics,
        observation: &Observation<'_>,
        pose: &RigidPose,
    ) -> Option<RenderedCrop> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if pose.translation.z <= 0.0 {
            return None;
        }
        Some(RenderedCrop {
            rendered_rgb: RgbImage::new(8, 8),
            rendered_points: PointField::zeros(8, 8),
            observed_rgb: observation.rgb().clone(),
            observed_points: observation.point_field.clone(),
            crop_transform: Matrix3::identity(),
        })
    }
}

/// Adds a fixed offset to every translation and counts calls.
#[derive(Debug)]
pub struct ShiftRefiner {
    delta: Vector3<f64>,
    calls: AtomicUsize,
    max_batch: AtomicUsize,
}

impl ShiftRefiner {
    pub fn new(delta: Vector3<f64>) -> Self {
        Self {
            delta,
            calls: AtomicUsize::new(0),
            max_batch: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch.load(Ordering::SeqCst)
    }
}

impl RefinePredictor for ShiftRefiner {
    fn refine(
        &self,
        _model: &SurfaceModel,
        samples: &[PredictorSample<'_>],
    ) -> anyhow::Result<Vec<RigidPose>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.max_batch.fetch_max(samples.len(), Ordering::SeqCst);
        Ok(samples
            .iter()
            .map(|s| s.pose.with_translation(s.pose.translation + self.delta))
            .collect())
    }
}

/// Returns its input unchanged.
pub fn identity_refiner() -> ShiftRefiner {
    ShiftRefiner::new(Vector3::zeros())
}

/// Always errors.
#[derive(Debug, Default)]
pub struct FailingRefiner;

impl RefinePredictor for FailingRefiner {
    fn refine(
        &self,
        _model: &SurfaceModel,
        _samples: &[PredictorSample<'_>],
    ) -> anyhow::Result<Vec<RigidPose>> {
        bail!("refiner offline")
    }
}

/// Drops the last pose of every batch.
#[derive(Debug, Default)]
pub struct TruncatingRefiner;

impl RefinePredictor for TruncatingRefiner {
    fn refine(
        &self,
        _model: &SurfaceModel,
        samples: &[PredictorSample<'_>],
    ) -> anyhow::Result<Vec<RigidPose>> {
        let keep = samples.len().saturating_sub(1);
        Ok(samples[..keep].iter().map(|s| s.pose).collect())
    }
}

/// Returns a fixed score vector regardless of input.
#[derive(Debug)]
pub struct FixedScorer {
    scores: Vec<f64>,
    calls: AtomicUsize,
}

impl FixedScorer {
    pub fn new(scores: Vec<f64>) -> Self {
        Self {
            scores,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScorePredictor for FixedScorer {
    fn score(&self, _model: &SurfaceModel, _samples: &[PredictorSample<'_>]) -> anyhow::Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }
}

/// Scores hypotheses by closeness of their rotation to `target`.
#[derive(Debug)]
pub struct RotationScorer {
    pub target: UnitQuaternion<f64>,
}

impl ScorePredictor for RotationScorer {
    fn score(&self, _model: &SurfaceModel, samples: &[PredictorSample<'_>]) -> anyhow::Result<Vec<f64>> {
        Ok(samples
            .iter()
            .map(|s| -s.pose.rotation.angle_to(&self.target))
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct FailingScorer;

impl ScorePredictor for FailingScorer {
    fn score(&self, _model: &SurfaceModel, _samples: &[PredictorSample<'_>]) -> anyhow::Result<Vec<f64>> {
        bail!("scorer offline")
    }
}
