//! Errors surfaced by registration and tracking.

use thiserror::Error;

use crate::geometry::GeometryError;

/// Which external predictor a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictorStage {
    Refine,
    Score,
}

impl std::fmt::Display for PredictorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refine => f.write_str("refinement"),
            Self::Score => f.write_str("scoring"),
        }
    }
}

/// Errors from [`crate::tracking::PoseTracker`].
///
/// `MissingMask`, `EmptyMask` and geometry errors are fatal for a session;
/// predictor errors are fatal only for the frame that raised them.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Registration needs an object mask; there is no prior to fall back on.
    #[error("frame {frame}: registration requires an object mask")]
    MissingMask { frame: usize },
    /// Registration mask has no object pixels.
    #[error("frame {frame}: registration mask is empty")]
    EmptyMask { frame: usize },
    /// `track_one` called before a successful `register`.
    #[error("frame {frame}: tracker is not initialized, call register first")]
    NotInitialized { frame: usize },
    /// An auxiliary image does not match the RGB resolution.
    #[error("frame {frame}: {what} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        frame: usize,
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Registration was asked to work on an empty hypothesis set.
    #[error("frame {frame}: hypothesis batch is empty")]
    EmptyBatch { frame: usize },
    /// External predictor call failed. Not retried.
    #[error("frame {frame}: {stage} predictor failed")]
    Predictor {
        frame: usize,
        stage: PredictorStage,
        #[source]
        source: anyhow::Error,
    },
    /// Predictor returned a batch of the wrong size.
    #[error("frame {frame}: {stage} predictor returned {got} outputs for {expected} inputs")]
    PredictorCardinality {
        frame: usize,
        stage: PredictorStage,
        expected: usize,
        got: usize,
    },
    #[error("invalid tracker configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl TrackingError {
    /// Errors after which the session cannot continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Predictor { .. } | Self::PredictorCardinality { .. }
        )
    }
}
