//! Scoring and selection of the best registration hypothesis.

use tracing::{debug, warn};

use crate::geometry::{CameraIntrinsics, RigidPose, SurfaceModel};
use crate::hypothesis::HypothesisBatch;
use crate::predictor::{CropRenderer, PredictorSample, ScorePredictor};

use super::refine::render_batch;
use super::{Observation, PredictorStage, TrackingError};

/// Winner of [`select_best`].
#[derive(Debug, Clone)]
pub struct Selection {
    pub index: usize,
    pub pose: RigidPose,
    pub score: f64,
    /// One score per hypothesis; unrenderable ones are `-inf`.
    pub scores: Vec<f64>,
    /// Set when no hypothesis could be scored and index 0 was kept.
    pub unscored: bool,
}

/// Index of the first maximum. NaN never wins; `None` if nothing compares.
pub fn first_max_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if !(score > current) => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Score every hypothesis with one predictor call and return the best.
///
/// Ties go to the earliest hypothesis.
pub fn select_best<C, S>(
    renderer: &C,
    scorer: &S,
    model: &SurfaceModel,
    intrinsics: &CameraIntrinsics,
    observation: &Observation<'_>,
    hypotheses: &HypothesisBatch,
) -> Result<Selection, TrackingError>
where
    C: CropRenderer + ?Sized,
    S: ScorePredictor + ?Sized,
{
    let frame = observation.index();
    if hypotheses.is_empty() {
        return Err(TrackingError::EmptyBatch { frame });
    }

    let crops = render_batch(renderer, model, intrinsics, observation, hypotheses);
    let mut indices = Vec::with_capacity(crops.len());
    let mut samples = Vec::with_capacity(crops.len());
    for (idx, crop) in crops.iter().enumerate() {
        if let Some(crop) = crop {
            indices.push(idx);
            samples.push(PredictorSample {
                pose: hypotheses.poses()[idx],
                crop,
            });
        }
    }

    let mut scores = vec![f64::NEG_INFINITY; hypotheses.len()];
    if !samples.is_empty() {
        let raw = scorer
            .score(model, &samples)
            .map_err(|source| TrackingError::Predictor {
                frame,
                stage: PredictorStage::Score,
                source,
            })?;
        if raw.len() != samples.len() {
            return Err(TrackingError::PredictorCardinality {
                frame,
                stage: PredictorStage::Score,
                expected: samples.len(),
                got: raw.len(),
            });
        }
        for (idx, score) in indices.into_iter().zip(raw) {
            scores[idx] = score;
        }
    }

    let (index, unscored) = match first_max_index(&scores) {
        Some(idx) if scores[idx] > f64::NEG_INFINITY => (idx, false),
        _ => {
            warn!(frame, n_hypotheses = hypotheses.len(), "no hypothesis could be scored, keeping the first");
            (0, true)
        }
    };
    debug!(frame, index, score = scores[index], "selected hypothesis");

    Ok(Selection {
        index,
        pose: hypotheses.poses()[index],
        score: scores[index],
        scores,
        unscored,
    })
}
