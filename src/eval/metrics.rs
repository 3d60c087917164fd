//! Pose error, trajectory stability and run comparison.
//!
//! Used to compare two runs over the same sequence, typically tracking with
//! and without mask guidance.

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::Serialize;

use crate::geometry::so3::{euler_xyz_deg, trace_angle_deg};
use crate::geometry::RigidPose;

/// Error of one predicted pose against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoseError {
    /// Translation distance (m).
    pub translation: f64,
    /// Relative rotation angle (degrees).
    pub rotation_deg: f64,
    /// Mean distance between model points under both poses (m).
    pub add: f64,
}

pub fn pose_error(pred: &RigidPose, gt: &RigidPose, model_points: &[Vector3<f64>]) -> PoseError {
    let translation = (pred.translation - gt.translation).norm();
    let r_diff = pred.rotation_matrix() * gt.rotation_matrix().transpose();
    let rotation_deg = trace_angle_deg(&r_diff);
    let add = if model_points.is_empty() {
        0.0
    } else {
        model_points
            .iter()
            .map(|p| (pred.transform_point(p) - gt.transform_point(p)).norm())
            .sum::<f64>()
            / model_points.len() as f64
    };
    PoseError {
        translation,
        rotation_deg,
        add,
    }
}

/// Jitter statistics of a pose sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stability {
    /// Mean over x/y/z of the per-axis translation variance (m²).
    pub translation_variance: f64,
    /// Mean over the three xyz Euler angles of their variance (deg²).
    pub rotation_variance: f64,
    /// Mean translation change between consecutive frames (m).
    pub frame_to_frame_translation: f64,
    /// Mean rotation change between consecutive frames (degrees).
    pub frame_to_frame_rotation: f64,
}

/// `None` for fewer than two poses.
pub fn stability(poses: &[RigidPose]) -> Option<Stability> {
    if poses.len() < 2 {
        return None;
    }
    let translations: Vec<Vector3<f64>> = poses.iter().map(|p| p.translation).collect();
    let eulers: Vec<Vector3<f64>> = poses.iter().map(|p| euler_xyz_deg(&p.rotation)).collect();

    let steps = poses.len() - 1;
    let (mut dt, mut drot) = (0.0, 0.0);
    for pair in poses.windows(2) {
        dt += (pair[1].translation - pair[0].translation).norm();
        let r_diff = pair[1].rotation_matrix() * pair[0].rotation_matrix().transpose();
        drot += trace_angle_deg(&r_diff);
    }

    Some(Stability {
        translation_variance: mean_axis_variance(&translations),
        rotation_variance: mean_axis_variance(&eulers),
        frame_to_frame_translation: dt / steps as f64,
        frame_to_frame_rotation: drot / steps as f64,
    })
}

/// Population variance per component, averaged over the three components.
fn mean_axis_variance(values: &[Vector3<f64>]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<Vector3<f64>>() / n;
    let var = values
        .iter()
        .map(|v| (v - mean).component_mul(&(v - mean)))
        .sum::<Vector3<f64>>()
        / n;
    var.mean()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanPoseErrors {
    pub translation: f64,
    pub rotation_deg: f64,
    pub add: f64,
}

/// `None` for an empty slice.
pub fn mean_errors(errors: &[PoseError]) -> Option<MeanPoseErrors> {
    if errors.is_empty() {
        return None;
    }
    let n = errors.len() as f64;
    Some(MeanPoseErrors {
        translation: errors.iter().map(|e| e.translation).sum::<f64>() / n,
        rotation_deg: errors.iter().map(|e| e.rotation_deg).sum::<f64>() / n,
        add: errors.iter().map(|e| e.add).sum::<f64>() / n,
    })
}

/// Baseline minus candidate; positive means the candidate is steadier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StabilityComparison {
    pub translation_variance_improvement: f64,
    pub rotation_variance_improvement: f64,
    pub frame_to_frame_translation_improvement: f64,
    pub frame_to_frame_rotation_improvement: f64,
}

/// Baseline minus candidate; positive means the candidate is more accurate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoseErrorComparison {
    pub baseline: MeanPoseErrors,
    pub candidate: MeanPoseErrors,
    pub translation_improvement: f64,
    pub rotation_improvement_deg: f64,
    pub add_improvement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub n_baseline: usize,
    pub n_candidate: usize,
    pub stability_baseline: Option<Stability>,
    pub stability_candidate: Option<Stability>,
    pub stability: Option<StabilityComparison>,
    pub pose_errors: Option<PoseErrorComparison>,
}

impl ComparisonReport {
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing comparison report")
    }

    pub fn write_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write report {}", path.display()))
    }
}

/// Compare two runs over the same sequence.
///
/// Error comparison is only filled in when both error sets are non-empty.
pub fn compare_runs(
    baseline: &[RigidPose],
    candidate: &[RigidPose],
    baseline_errors: &[PoseError],
    candidate_errors: &[PoseError],
) -> ComparisonReport {
    let stability_baseline = stability(baseline);
    let stability_candidate = stability(candidate);

    let stability = match (&stability_baseline, &stability_candidate) {
        (Some(b), Some(c)) => Some(StabilityComparison {
            translation_variance_improvement: b.translation_variance - c.translation_variance,
            rotation_variance_improvement: b.rotation_variance - c.rotation_variance,
            frame_to_frame_translation_improvement: b.frame_to_frame_translation
                - c.frame_to_frame_translation,
            frame_to_frame_rotation_improvement: b.frame_to_frame_rotation
                - c.frame_to_frame_rotation,
        }),
        _ => None,
    };

    let pose_errors = match (mean_errors(baseline_errors), mean_errors(candidate_errors)) {
        (Some(b), Some(c)) => Some(PoseErrorComparison {
            baseline: b,
            candidate: c,
            translation_improvement: b.translation - c.translation,
            rotation_improvement_deg: b.rotation_deg - c.rotation_deg,
            add_improvement: b.add - c.add,
        }),
        _ => None,
    };

    ComparisonReport {
        n_baseline: baseline.len(),
        n_candidate: candidate.len(),
        stability_baseline,
        stability_candidate,
        stability,
        pose_errors,
    }
}
