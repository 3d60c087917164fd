//! Tracker configuration, loadable from YAML.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::{RangeFilterConfig, LOW_VALIDITY_FLOOR, MIN_RANGE};
use crate::hypothesis::HypothesisConfig;

use super::drift::DriftConfig;
use super::TrackingError;

/// Parameters of a [`super::PoseTracker`]. Every field has a default, so a
/// YAML file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Refinement iterations during registration.
    pub est_refine_iter: usize,
    /// Refinement iterations per tracking frame.
    pub track_refine_iter: usize,
    /// Run without range data (RGB + mask only).
    pub geometry_free: bool,
    /// Range values below this are missing (metres).
    pub min_range: f32,
    pub low_validity_floor: usize,
    pub hypothesis: HypothesisConfig,
    pub drift: DriftConfig,
    pub range_filter: RangeFilterConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            est_refine_iter: 5,
            track_refine_iter: 2,
            geometry_free: false,
            min_range: MIN_RANGE,
            low_validity_floor: LOW_VALIDITY_FLOOR,
            hypothesis: HypothesisConfig::default(),
            drift: DriftConfig::default(),
            range_filter: RangeFilterConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing tracker config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading tracker config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing tracker config")
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), TrackingError> {
        if !(self.min_range > 0.0) {
            return Err(TrackingError::Config(format!(
                "min_range must be positive, got {}",
                self.min_range
            )));
        }
        if self.hypothesis.min_views == 0 {
            return Err(TrackingError::Config("hypothesis.min_views must be at least 1".into()));
        }
        if !(self.hypothesis.inplane_step_deg > 0.0 && self.hypothesis.inplane_step_deg <= 360.0) {
            return Err(TrackingError::Config(format!(
                "hypothesis.inplane_step_deg must be in (0, 360], got {}",
                self.hypothesis.inplane_step_deg
            )));
        }
        if !(self.hypothesis.geometry_free_depth_factor > 0.0) {
            return Err(TrackingError::Config(
                "hypothesis.geometry_free_depth_factor must be positive".into(),
            ));
        }
        if !(self.drift.threshold_ratio >= 0.0) {
            return Err(TrackingError::Config("drift.threshold_ratio must be non-negative".into()));
        }
        if !(0.0..=1.0).contains(&self.drift.blend_weight) {
            return Err(TrackingError::Config(format!(
                "drift.blend_weight must be in [0, 1], got {}",
                self.drift.blend_weight
            )));
        }
        Ok(())
    }
}
