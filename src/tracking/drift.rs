//! Mask-guided translation drift correction for tracking frames.
//!
//! Frame-to-frame refinement slowly accumulates translation error. When a
//! mask is available its bounding-box centre, back-projected at the pose's
//! own depth, gives an independent estimate of where the object is. If the
//! two disagree by more than a fraction of the object diameter, the pose
//! translation is pulled part of the way toward the mask estimate.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::{mask_centroid_2d, CameraIntrinsics, ObjectMask, RigidPose};

/// Drift thresholds. Both constants are empirical and should be calibrated
/// per object and sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub enabled: bool,
    /// Correction fires when divergence exceeds `threshold_ratio * diameter`.
    pub threshold_ratio: f64,
    /// Weight of the mask estimate in the blended translation.
    pub blend_weight: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_ratio: 0.10,
            blend_weight: 0.30,
        }
    }
}

/// Why no correction was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoMask,
    EmptyMask,
    NonPositiveDepth,
    Disabled,
}

/// What the corrector did with a pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftOutcome {
    Skipped(SkipReason),
    WithinThreshold {
        divergence: f64,
    },
    Corrected {
        divergence: f64,
        mask_estimate: Vector3<f64>,
    },
}

impl DriftOutcome {
    pub fn is_corrected(&self) -> bool {
        matches!(self, Self::Corrected { .. })
    }

    /// Short label for status logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped(SkipReason::NoMask) => "skipped_no_mask",
            Self::Skipped(SkipReason::EmptyMask) => "skipped_empty_mask",
            Self::Skipped(SkipReason::NonPositiveDepth) => "skipped_bad_depth",
            Self::Skipped(SkipReason::Disabled) => "disabled",
            Self::WithinThreshold { .. } => "within_threshold",
            Self::Corrected { .. } => "corrected",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriftCorrector {
    config: DriftConfig,
}

impl DriftCorrector {
    pub fn new(config: DriftConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Correct `pose` against the mask, returning a new pose and what happened.
    ///
    /// The rotation is never changed. Without a usable mask the input pose is
    /// returned as is.
    pub fn correct(
        &self,
        pose: &RigidPose,
        mask: Option<&ObjectMask>,
        intrinsics: &CameraIntrinsics,
        diameter: f64,
    ) -> (RigidPose, DriftOutcome) {
        if !self.config.enabled {
            return (*pose, DriftOutcome::Skipped(SkipReason::Disabled));
        }
        let Some(mask) = mask else {
            return (*pose, DriftOutcome::Skipped(SkipReason::NoMask));
        };
        let z = pose.translation.z;
        if !(z > 0.0) {
            return (*pose, DriftOutcome::Skipped(SkipReason::NonPositiveDepth));
        }
        let Some(center) = mask_centroid_2d(mask) else {
            return (*pose, DriftOutcome::Skipped(SkipReason::EmptyMask));
        };

        let mask_estimate = intrinsics.backproject(center.x, center.y, z);
        self.correct_translation(pose, &mask_estimate, diameter)
    }

    /// Compare `pose` with an independent translation estimate and blend when
    /// they diverge by more than the threshold.
    pub fn correct_translation(
        &self,
        pose: &RigidPose,
        mask_estimate: &Vector3<f64>,
        diameter: f64,
    ) -> (RigidPose, DriftOutcome) {
        let divergence = (mask_estimate - pose.translation).norm();
        let threshold = self.config.threshold_ratio * diameter;
        if divergence <= threshold {
            return (*pose, DriftOutcome::WithinThreshold { divergence });
        }

        let corrected = blend_translation(&pose.translation, mask_estimate, self.config.blend_weight);
        debug!(
            divergence,
            threshold,
            dx = corrected.x - pose.translation.x,
            dy = corrected.y - pose.translation.y,
            "drift correction applied"
        );
        (
            pose.with_translation(corrected),
            DriftOutcome::Corrected {
                divergence,
                mask_estimate: *mask_estimate,
            },
        )
    }
}

/// `(1 - w) * original + w * estimate`.
pub fn blend_translation(original: &Vector3<f64>, estimate: &Vector3<f64>, weight: f64) -> Vector3<f64> {
    original * (1.0 - weight) + estimate * weight
}
