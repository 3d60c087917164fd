//! Iterative batched refinement of pose hypotheses.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::geometry::{CameraIntrinsics, SurfaceModel};
use crate::hypothesis::HypothesisBatch;
use crate::predictor::{CropRenderer, PredictorSample, RefinePredictor, RenderedCrop};

use super::{Observation, PredictorStage, TrackingError};

/// Result of [`refine_batch`].
#[derive(Debug, Clone)]
pub struct RefineOutcome {
    /// Refined hypotheses, same order and cardinality as the input.
    pub batch: HypothesisBatch,
    /// Render failures summed over all iterations.
    pub render_failures: usize,
}

/// Render every hypothesis of `batch`, in parallel.
///
/// Output index `i` belongs to hypothesis `i`; `None` marks a render failure.
pub fn render_batch<C: CropRenderer + ?Sized>(
    renderer: &C,
    model: &SurfaceModel,
    intrinsics: &CameraIntrinsics,
    observation: &Observation<'_>,
    batch: &HypothesisBatch,
) -> Vec<Option<RenderedCrop>> {
    batch
        .poses()
        .par_iter()
        .map(|pose| renderer.render(model, intrinsics, observation, pose))
        .collect()
}

/// Refine `hypotheses` for `iterations` rounds.
///
/// Each round renders all current hypotheses, calls the refinement predictor
/// once with every successfully rendered sample and replaces those
/// hypotheses with its output. A hypothesis whose crop cannot be rendered
/// keeps its current value for that round. The input batch is never
/// modified.
pub fn refine_batch<C, R>(
    renderer: &C,
    refiner: &R,
    model: &SurfaceModel,
    intrinsics: &CameraIntrinsics,
    observation: &Observation<'_>,
    hypotheses: &HypothesisBatch,
    iterations: usize,
) -> Result<RefineOutcome, TrackingError>
where
    C: CropRenderer + ?Sized,
    R: RefinePredictor + ?Sized,
{
    let frame = observation.index();
    let mut poses = hypotheses.poses().to_vec();
    let mut render_failures = 0usize;

    for iteration in 0..iterations {
        let current = HypothesisBatch::new(poses.clone());
        let crops = render_batch(renderer, model, intrinsics, observation, &current);

        let mut indices = Vec::with_capacity(crops.len());
        let mut samples = Vec::with_capacity(crops.len());
        for (idx, crop) in crops.iter().enumerate() {
            match crop {
                Some(crop) => {
                    indices.push(idx);
                    samples.push(PredictorSample {
                        pose: poses[idx],
                        crop,
                    });
                }
                None => {
                    render_failures += 1;
                    warn!(
                        frame,
                        iteration,
                        hypothesis = idx,
                        "crop rendering failed, keeping hypothesis unchanged"
                    );
                }
            }
        }
        if samples.is_empty() {
            continue;
        }

        let refined = refiner
            .refine(model, &samples)
            .map_err(|source| TrackingError::Predictor {
                frame,
                stage: PredictorStage::Refine,
                source,
            })?;
        if refined.len() != samples.len() {
            return Err(TrackingError::PredictorCardinality {
                frame,
                stage: PredictorStage::Refine,
                expected: samples.len(),
                got: refined.len(),
            });
        }

        for (idx, pose) in indices.into_iter().zip(refined) {
            poses[idx] = pose;
        }
        debug!(frame, iteration, n_refined = samples.len(), "refinement step done");
    }

    Ok(RefineOutcome {
        batch: HypothesisBatch::new(poses),
        render_failures,
    })
}
