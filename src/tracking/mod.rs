//! Registration and tracking: the per-frame pose pipeline.
//!
//! - Observation preparation (range denoising, point field, valid mask)
//! - Batched hypothesis refinement
//! - Hypothesis scoring and selection (registration only)
//! - Mask-guided drift correction (tracking only)
//! - The `Uninitialized -> Tracking` state machine

pub mod config;
pub mod drift;
pub mod error;
pub mod observation;
pub mod refine;
pub mod result;
pub mod select;
pub mod state;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::TrackerConfig;
pub use drift::{DriftConfig, DriftCorrector, DriftOutcome, SkipReason};
pub use error::{PredictorStage, TrackingError};
pub use observation::{Observation, ObservationFrame};
pub use refine::{refine_batch, render_batch, RefineOutcome};
pub use result::{
    ConfidenceIssue, FrameConfidence, FrameKind, FrameMetrics, FrameResult, TimingStats,
};
pub use select::{first_max_index, select_best, Selection};
pub use state::TrackingState;
pub use tracker::PoseTracker;
