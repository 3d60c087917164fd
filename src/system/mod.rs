//! Session orchestration.
//!
//! `TrackingSession` is the top-level driver: it owns a `PoseTracker`, feeds
//! it frames from a `FrameSource` and records what happened to each frame.

mod session;

pub use session::{
    FrameOutcome, FrameStatus, PredictorFailurePolicy, SessionConfig, SessionSummary,
    TrackingSession, STATUS_FILE,
};
