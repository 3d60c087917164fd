//! Per-frame results and diagnostics.
//!
//! These types describe what happened while processing a single frame:
//! - whether it was a registration or a tracking step
//! - the output pose and how much it moved
//! - the reasons, if any, the pose should be trusted less
//! - timing information for profiling

use serde::Serialize;

use crate::geometry::RigidPose;
use crate::hypothesis::DepthSource;

use super::drift::DriftOutcome;

/// Which state-machine transition produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Registration,
    Tracking,
}

/// A reason to trust a frame's pose less.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceIssue {
    /// Fewer valid pixels inside the mask than the configured floor.
    LowValidity { valid_pixels: usize },
    /// Translation estimate had no usable depth and is the zero vector.
    TranslationUnavailable,
    /// Some hypotheses could not be rendered.
    RenderFailures { count: usize },
    /// No hypothesis could be scored; the first one was kept.
    NoScorableHypothesis,
    /// Range image missing in normal mode.
    MissingRange,
}

impl std::fmt::Display for ConfidenceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowValidity { valid_pixels } => write!(f, "low_validity({valid_pixels})"),
            Self::TranslationUnavailable => f.write_str("translation_unavailable"),
            Self::RenderFailures { count } => write!(f, "render_failures({count})"),
            Self::NoScorableHypothesis => f.write_str("no_scorable_hypothesis"),
            Self::MissingRange => f.write_str("missing_range"),
        }
    }
}

/// Overall confidence in a frame's pose.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum FrameConfidence {
    #[default]
    Nominal,
    Low(Vec<ConfidenceIssue>),
}

impl FrameConfidence {
    pub fn from_issues(issues: Vec<ConfidenceIssue>) -> Self {
        if issues.is_empty() {
            Self::Nominal
        } else {
            Self::Low(issues)
        }
    }

    pub fn is_low(&self) -> bool {
        matches!(self, Self::Low(_))
    }

    pub fn issues(&self) -> &[ConfidenceIssue] {
        match self {
            Self::Nominal => &[],
            Self::Low(issues) => issues,
        }
    }
}

/// Scalar metrics useful for debugging pose quality.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameMetrics {
    pub n_hypotheses: usize,
    /// Valid pixels inside the mask; `None` when no mask was used.
    pub valid_pixels: Option<usize>,
    pub render_failures: usize,
    /// Registration only.
    pub selected_index: Option<usize>,
    /// Registration only.
    pub best_score: Option<f64>,
    /// Tracking only.
    pub drift: Option<DriftOutcome>,
    /// Registration only.
    pub depth_source: Option<DepthSource>,
    /// Change from the previous stored pose (zero for registration).
    pub delta_translation_m: f64,
    pub delta_rotation_deg: f64,
}

/// Timing breakdown for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingStats {
    pub total_ms: f64,
    pub refine_ms: f64,
    pub score_ms: f64,
}

impl TimingStats {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Summary of one `register` or `track_one` call.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub frame_index: usize,
    pub kind: FrameKind,
    pub pose: RigidPose,
    pub confidence: FrameConfidence,
    pub metrics: FrameMetrics,
    pub timing: TimingStats,
}
