//! Contracts for the external collaborators of the tracking core.
//!
//! - [`CropRenderer`]: renders the model at a hypothesis pose and crops the
//!   matching region of the observed frame.
//! - [`RefinePredictor`]: maps a batch of (pose, crop) samples to improved poses.
//! - [`ScorePredictor`]: maps the same kind of batch to one confidence each.
//!
//! Predictors are always called with the whole batch at once. Their outputs
//! are consumed by value; the core never hands out references into predictor
//! buffers, and any later correction builds a fresh pose.

use std::sync::Arc;

use image::RgbImage;
use nalgebra::Matrix3;

use crate::geometry::{CameraIntrinsics, PointField, RigidPose, SurfaceModel};
use crate::tracking::Observation;

/// Rendered and observed crops around one hypothesis.
#[derive(Debug, Clone)]
pub struct RenderedCrop {
    /// Synthetic appearance of the model at the hypothesis pose.
    pub rendered_rgb: RgbImage,
    /// Synthetic camera-frame points of the model at the hypothesis pose.
    pub rendered_points: PointField,
    /// Observed image inside the same crop window.
    pub observed_rgb: RgbImage,
    /// Observed point field inside the crop window (all zero when geometry-free).
    pub observed_points: PointField,
    /// Full-image pixel -> crop pixel transform.
    pub crop_transform: Matrix3<f64>,
}

/// One element of a predictor batch.
#[derive(Debug, Clone, Copy)]
pub struct PredictorSample<'a> {
    pub pose: RigidPose,
    pub crop: &'a RenderedCrop,
}

/// Rendering/cropping service.
pub trait CropRenderer: Send + Sync {
    /// Render `model` at `pose`; `None` when the pose projects entirely
    /// outside the image.
    fn render(
        &self,
        model: &SurfaceModel,
        intrinsics: &CameraIntrinsics,
        observation: &Observation<'_>,
        pose: &RigidPose,
    ) -> Option<RenderedCrop>;
}

/// Pose refinement network.
pub trait RefinePredictor: Send + Sync {
    /// Return one refined pose per sample, in sample order.
    fn refine(
        &self,
        model: &SurfaceModel,
        samples: &[PredictorSample<'_>],
    ) -> anyhow::Result<Vec<RigidPose>>;
}

/// Pose scoring network.
pub trait ScorePredictor: Send + Sync {
    /// Return one score per sample, in sample order. Higher is better.
    fn score(&self, model: &SurfaceModel, samples: &[PredictorSample<'_>])
        -> anyhow::Result<Vec<f64>>;
}

impl<T: CropRenderer + ?Sized> CropRenderer for Arc<T> {
    fn render(
        &self,
        model: &SurfaceModel,
        intrinsics: &CameraIntrinsics,
        observation: &Observation<'_>,
        pose: &RigidPose,
    ) -> Option<RenderedCrop> {
        (**self).render(model, intrinsics, observation, pose)
    }
}

impl<T: RefinePredictor + ?Sized> RefinePredictor for Arc<T> {
    fn refine(
        &self,
        model: &SurfaceModel,
        samples: &[PredictorSample<'_>],
    ) -> anyhow::Result<Vec<RigidPose>> {
        (**self).refine(model, samples)
    }
}

impl<T: ScorePredictor + ?Sized> ScorePredictor for Arc<T> {
    fn score(
        &self,
        model: &SurfaceModel,
        samples: &[PredictorSample<'_>],
    ) -> anyhow::Result<Vec<f64>> {
        (**self).score(model, samples)
    }
}
