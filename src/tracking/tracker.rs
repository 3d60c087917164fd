//! Pose tracker: registration on the first frame, refinement afterwards.
//!
//! `register` builds a dense set of rotation hypotheses around a
//! mask-derived translation, refines them all in batch and keeps the best
//! scored one. `track_one` refines the previous pose as a single hypothesis
//! and pulls its translation toward the mask when the two disagree.
//!
//! Every call either fully succeeds and replaces the stored pose, or fails
//! and leaves the tracker exactly as it was.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::geometry::range_filter::denoise_range;
use crate::geometry::{
    mask_pixel_count, valid_mask, CameraIntrinsics, PointField, RigidPose, SurfaceModel,
    ValidMask,
};
use crate::hypothesis::{HypothesisBatch, HypothesisGenerator};
use crate::predictor::{CropRenderer, RefinePredictor, ScorePredictor};

use super::config::TrackerConfig;
use super::drift::DriftCorrector;
use super::refine::refine_batch;
use super::result::{
    ConfidenceIssue, FrameConfidence, FrameKind, FrameMetrics, FrameResult, TimingStats,
};
use super::select::select_best;
use super::{Observation, ObservationFrame, TrackingError, TrackingState};

/// Registration/tracking state machine for one object.
pub struct PoseTracker<C, R, S> {
    model: Arc<SurfaceModel>,
    intrinsics: CameraIntrinsics,
    renderer: C,
    refiner: R,
    scorer: S,
    config: TrackerConfig,
    generator: HypothesisGenerator,
    drift: DriftCorrector,
    state: TrackingState,
}

impl<C, R, S> PoseTracker<C, R, S>
where
    C: CropRenderer,
    R: RefinePredictor,
    S: ScorePredictor,
{
    pub fn new(
        model: Arc<SurfaceModel>,
        intrinsics: CameraIntrinsics,
        renderer: C,
        refiner: R,
        scorer: S,
        config: TrackerConfig,
    ) -> Result<Self, TrackingError> {
        config.validate()?;
        let generator = HypothesisGenerator::new(config.hypothesis);
        let drift = DriftCorrector::new(config.drift);
        info!(
            n_points = model.len(),
            diameter = model.diameter(),
            n_hypotheses = generator.rotations().len(),
            geometry_free = config.geometry_free,
            "pose tracker created"
        );
        Ok(Self {
            model,
            intrinsics,
            renderer,
            refiner,
            scorer,
            config,
            generator,
            drift,
            state: TrackingState::Uninitialized,
        })
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Most recent pose, if registered.
    pub fn pose(&self) -> Option<&RigidPose> {
        self.state.pose()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn model(&self) -> &Arc<SurfaceModel> {
        &self.model
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn generator(&self) -> &HypothesisGenerator {
        &self.generator
    }

    /// Drop the stored pose; the next frame must be registered.
    pub fn reset(&mut self) {
        self.state = TrackingState::Uninitialized;
    }

    /// Register the object from scratch with the configured iteration count.
    ///
    /// Needs a non-empty mask. Calling this while tracking discards the
    /// previous pose.
    pub fn register(&mut self, frame: &ObservationFrame) -> Result<FrameResult, TrackingError> {
        self.register_with_iterations(frame, self.config.est_refine_iter)
    }

    pub fn register_with_iterations(
        &mut self,
        frame: &ObservationFrame,
        iterations: usize,
    ) -> Result<FrameResult, TrackingError> {
        let t_start = Instant::now();
        let index = frame.index();

        let mask = frame
            .mask()
            .ok_or(TrackingError::MissingMask { frame: index })?;
        if mask_pixel_count(mask) == 0 {
            return Err(TrackingError::EmptyMask { frame: index });
        }
        if self.state.is_tracking() {
            info!(frame = index, "re-registering, previous pose discarded");
        }

        let (observation, mut issues) = self.prepare_observation(frame);
        let geometry_free = self.config.geometry_free;
        let valid = valid_mask(
            &observation.point_field,
            mask,
            geometry_free,
            self.config.low_validity_floor,
        );
        if let Some(issue) = self.low_validity_issue(index, &valid) {
            issues.push(issue);
        }

        let estimate = self.generator.estimate_translation(
            mask,
            &observation.point_field,
            &valid,
            &self.intrinsics,
            self.model.diameter(),
            geometry_free,
        );
        if !estimate.is_valid() {
            warn!(
                frame = index,
                geometry_free,
                valid_pixels = valid.count(),
                "no valid range inside mask, hypotheses start at the origin"
            );
            issues.push(ConfidenceIssue::TranslationUnavailable);
        }
        let hypotheses = self.generator.generate(&estimate.translation);
        debug!(
            frame = index,
            n_hypotheses = hypotheses.len(),
            tx = estimate.translation.x,
            ty = estimate.translation.y,
            tz = estimate.translation.z,
            "generated hypotheses"
        );

        let t_refine = Instant::now();
        let refined = refine_batch(
            &self.renderer,
            &self.refiner,
            &self.model,
            &self.intrinsics,
            &observation,
            &hypotheses,
            iterations,
        )?;
        let refine_ms = t_refine.elapsed().as_secs_f64() * 1000.0;

        let t_score = Instant::now();
        let selection = select_best(
            &self.renderer,
            &self.scorer,
            &self.model,
            &self.intrinsics,
            &observation,
            &refined.batch,
        )?;
        let score_ms = t_score.elapsed().as_secs_f64() * 1000.0;

        if refined.render_failures > 0 {
            issues.push(ConfidenceIssue::RenderFailures {
                count: refined.render_failures,
            });
        }
        if selection.unscored {
            issues.push(ConfidenceIssue::NoScorableHypothesis);
        }

        let pose = selection.pose;
        self.state = TrackingState::Tracking(pose);

        info!(
            frame = index,
            selected = selection.index,
            score = selection.score,
            tz = pose.translation.z,
            n_issues = issues.len(),
            "registered"
        );

        Ok(FrameResult {
            frame_index: index,
            kind: FrameKind::Registration,
            pose,
            confidence: FrameConfidence::from_issues(issues),
            metrics: FrameMetrics {
                n_hypotheses: hypotheses.len(),
                valid_pixels: Some(valid.count()),
                render_failures: refined.render_failures,
                selected_index: Some(selection.index),
                best_score: Some(selection.score),
                drift: None,
                depth_source: Some(estimate.depth_source),
                delta_translation_m: 0.0,
                delta_rotation_deg: 0.0,
            },
            timing: TimingStats {
                total_ms: t_start.elapsed().as_secs_f64() * 1000.0,
                refine_ms,
                score_ms,
            },
        })
    }

    /// Track one frame from the stored pose with the configured iteration count.
    ///
    /// The mask is optional; without it drift correction is skipped.
    pub fn track_one(&mut self, frame: &ObservationFrame) -> Result<FrameResult, TrackingError> {
        self.track_one_with_iterations(frame, self.config.track_refine_iter)
    }

    pub fn track_one_with_iterations(
        &mut self,
        frame: &ObservationFrame,
        iterations: usize,
    ) -> Result<FrameResult, TrackingError> {
        let t_start = Instant::now();
        let index = frame.index();

        let TrackingState::Tracking(prior) = self.state else {
            return Err(TrackingError::NotInitialized { frame: index });
        };

        let (observation, mut issues) = self.prepare_observation(frame);

        let valid_pixels = match frame.mask() {
            Some(mask) => {
                let valid = valid_mask(
                    &observation.point_field,
                    mask,
                    self.config.geometry_free,
                    self.config.low_validity_floor,
                );
                if let Some(issue) = self.low_validity_issue(index, &valid) {
                    issues.push(issue);
                }
                Some(valid.count())
            }
            None => {
                warn!(frame = index, "no mask, tracking without drift correction");
                None
            }
        };

        let t_refine = Instant::now();
        let refined = refine_batch(
            &self.renderer,
            &self.refiner,
            &self.model,
            &self.intrinsics,
            &observation,
            &HypothesisBatch::singleton(prior),
            iterations,
        )?;
        let refine_ms = t_refine.elapsed().as_secs_f64() * 1000.0;
        if refined.render_failures > 0 {
            issues.push(ConfidenceIssue::RenderFailures {
                count: refined.render_failures,
            });
        }

        let refined_pose = refined.batch.get(0).copied().unwrap_or(prior);
        let (pose, drift) = self.drift.correct(
            &refined_pose,
            frame.mask(),
            &self.intrinsics,
            self.model.diameter(),
        );

        let delta_translation_m = (pose.translation - prior.translation).norm();
        let delta_rotation_deg = prior.rotation_angle_to(&pose).to_degrees();
        self.state = TrackingState::Tracking(pose);

        debug!(
            frame = index,
            dt = delta_translation_m,
            drot_deg = delta_rotation_deg,
            drift = drift.label(),
            "tracked"
        );

        Ok(FrameResult {
            frame_index: index,
            kind: FrameKind::Tracking,
            pose,
            confidence: FrameConfidence::from_issues(issues),
            metrics: FrameMetrics {
                n_hypotheses: 1,
                valid_pixels,
                render_failures: refined.render_failures,
                selected_index: None,
                best_score: None,
                drift: Some(drift),
                depth_source: None,
                delta_translation_m,
                delta_rotation_deg,
            },
            timing: TimingStats {
                total_ms: t_start.elapsed().as_secs_f64() * 1000.0,
                refine_ms,
                score_ms: 0.0,
            },
        })
    }

    fn low_validity_issue(&self, index: usize, valid: &ValidMask) -> Option<ConfidenceIssue> {
        if !valid.is_low_validity() {
            return None;
        }
        warn!(
            frame = index,
            valid_pixels = valid.count(),
            floor = self.config.low_validity_floor,
            geometry_free = self.config.geometry_free,
            "few valid pixels inside object mask"
        );
        Some(ConfidenceIssue::LowValidity {
            valid_pixels: valid.count(),
        })
    }

    /// Denoise the range and build the point field for one call.
    fn prepare_observation<'a>(
        &self,
        frame: &'a ObservationFrame,
    ) -> (Observation<'a>, Vec<ConfidenceIssue>) {
        let (width, height) = frame.dimensions();
        let mut issues = Vec::new();

        if self.config.geometry_free {
            return (
                Observation {
                    frame,
                    range: None,
                    point_field: PointField::zeros(width, height),
                    geometry_free: true,
                },
                issues,
            );
        }

        let (range, point_field) = match frame.range() {
            Some(raw) => {
                let range = if self.config.range_filter.enabled {
                    denoise_range(raw, &self.config.range_filter)
                } else {
                    raw.clone()
                };
                let field = PointField::from_range(&range, &self.intrinsics, self.config.min_range);
                (Some(range), field)
            }
            None => {
                warn!(frame = frame.index(), "range image missing, all pixels treated as invalid");
                issues.push(ConfidenceIssue::MissingRange);
                (None, PointField::zeros(width, height))
            }
        };

        (
            Observation {
                frame,
                range,
                point_field,
                geometry_free: false,
            },
            issues,
        )
    }
}

impl<C, R, S> std::fmt::Debug for PoseTracker<C, R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseTracker")
            .field("state", &self.state)
            .field("diameter", &self.model.diameter())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ObjectMask;
    use crate::hypothesis::DepthSource;
    use crate::tracking::drift::{DriftConfig, DriftOutcome, SkipReason};
    use crate::tracking::test_support::{
        camera, centered_mask, flat_range, frame, identity_refiner, unit_model, FailingRefiner,
        FailingScorer, FixedScorer, RotationScorer, ShiftRefiner, TestRenderer, HEIGHT, WIDTH,
    };
    use approx::assert_relative_eq;
    use image::Luma;
    use nalgebra::{UnitQuaternion, Vector3};

    type TestTracker<R, S> = PoseTracker<TestRenderer, R, S>;

    fn tracker_with<R: RefinePredictor, S: ScorePredictor>(
        refiner: R,
        scorer: S,
        config: TrackerConfig,
    ) -> TestTracker<R, S> {
        PoseTracker::new(
            Arc::new(unit_model()),
            camera(),
            TestRenderer::default(),
            refiner,
            scorer,
            config,
        )
        .unwrap()
    }

    fn default_tracker() -> TestTracker<ShiftRefiner, RotationScorer> {
        let target = HypothesisGenerator::default().rotations()[17];
        tracker_with(identity_refiner(), RotationScorer { target }, TrackerConfig::default())
    }

    fn masked_frame(index: usize) -> ObservationFrame {
        frame(index, Some(flat_range(1.0)), Some(centered_mask()))
    }

    #[test]
    fn test_register_rejects_missing_mask() {
        let mut tracker = default_tracker();

        let err = tracker
            .register(&frame(0, Some(flat_range(1.0)), None))
            .unwrap_err();

        assert!(matches!(err, TrackingError::MissingMask { frame: 0 }));
        assert_eq!(*tracker.state(), TrackingState::Uninitialized);
    }

    #[test]
    fn test_register_rejects_empty_mask() {
        let mut tracker = default_tracker();
        let empty = frame(0, Some(flat_range(1.0)), Some(ObjectMask::new(WIDTH, HEIGHT)));

        let err = tracker.register(&empty).unwrap_err();

        assert!(matches!(err, TrackingError::EmptyMask { frame: 0 }));
        assert!(err.is_fatal());
        assert_eq!(*tracker.state(), TrackingState::Uninitialized);
    }

    #[test]
    fn test_register_selects_best_scored_rotation() {
        let mut tracker = default_tracker();
        let target = tracker.generator().rotations()[17];

        let result = tracker.register(&masked_frame(0)).unwrap();

        assert_eq!(result.kind, FrameKind::Registration);
        assert_eq!(result.metrics.selected_index, Some(17));
        assert_eq!(result.metrics.n_hypotheses, 252);
        assert_relative_eq!(result.pose.rotation.angle_to(&target), 0.0, epsilon = 1e-12);
        // Mask centred on the principal point at 1 m.
        assert_relative_eq!(result.pose.translation, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-5);
        assert_eq!(result.metrics.depth_source, Some(DepthSource::MeasuredRange));
        assert_eq!(result.confidence, FrameConfidence::Nominal);
        assert_eq!(tracker.pose(), Some(&result.pose));
    }

    #[test]
    fn test_track_with_zero_iterations_keeps_registered_pose() {
        let mut tracker = default_tracker();
        let frame0 = masked_frame(0);
        let registered = tracker.register(&frame0).unwrap().pose;

        let tracked = tracker.track_one_with_iterations(&frame0, 0).unwrap();

        assert_eq!(tracked.pose, registered);
        assert_eq!(tracked.metrics.delta_translation_m, 0.0);
        assert!(matches!(
            tracked.metrics.drift,
            Some(DriftOutcome::WithinThreshold { .. })
        ));
    }

    #[test]
    fn test_track_before_register_is_error() {
        let mut tracker = default_tracker();

        let err = tracker.track_one(&masked_frame(3)).unwrap_err();

        assert!(matches!(err, TrackingError::NotInitialized { frame: 3 }));
    }

    #[test]
    fn test_track_refines_from_previous_pose() {
        let config = TrackerConfig {
            drift: DriftConfig {
                enabled: false,
                ..Default::default()
            },
            ..TrackerConfig::default()
        };
        let mut tracker = tracker_with(
            ShiftRefiner::new(Vector3::new(0.0, 0.0, 0.01)),
            FixedScorer::new(vec![1.0; 252]),
            TrackerConfig {
                est_refine_iter: 0,
                ..config
            },
        );
        let start = tracker.register(&masked_frame(0)).unwrap().pose;

        let first = tracker.track_one(&masked_frame(1)).unwrap();
        let second = tracker.track_one(&masked_frame(2)).unwrap();

        // Two iterations per frame, 1 cm each.
        assert_relative_eq!(first.pose.translation.z, start.translation.z + 0.02, epsilon = 1e-9);
        assert_relative_eq!(second.pose.translation.z, start.translation.z + 0.04, epsilon = 1e-9);
        assert_relative_eq!(second.metrics.delta_translation_m, 0.02, epsilon = 1e-9);
        assert_eq!(second.pose.rotation, start.rotation);
    }

    #[test]
    fn test_refiner_failure_leaves_state_unchanged() {
        let mut tracker = tracker_with(
            FailingRefiner,
            FixedScorer::new(vec![0.5; 252]),
            TrackerConfig {
                est_refine_iter: 0,
                ..TrackerConfig::default()
            },
        );
        let registered = tracker.register(&masked_frame(0)).unwrap().pose;

        let err = tracker.track_one(&masked_frame(1)).unwrap_err();

        assert!(!err.is_fatal());
        assert_eq!(*tracker.state(), TrackingState::Tracking(registered));
    }

    #[test]
    fn test_scorer_failure_during_register_keeps_uninitialized() {
        let mut tracker = tracker_with(identity_refiner(), FailingScorer, TrackerConfig::default());

        assert!(tracker.register(&masked_frame(0)).is_err());
        assert_eq!(*tracker.state(), TrackingState::Uninitialized);
    }

    #[test]
    fn test_geometry_free_depth_is_diameter_heuristic() {
        let config = TrackerConfig {
            geometry_free: true,
            ..TrackerConfig::default()
        };
        let mut tracker = tracker_with(identity_refiner(), FixedScorer::new(vec![0.0; 252]), config);
        let diameter = tracker.model().diameter();

        let result = tracker.register(&frame(0, None, Some(centered_mask()))).unwrap();

        assert_eq!(result.pose.translation.z, diameter * 2.5);
        assert_eq!(result.metrics.depth_source, Some(DepthSource::DiameterHeuristic));
        assert!(!result.confidence.issues().contains(&ConfidenceIssue::MissingRange));
    }

    #[test]
    fn test_missing_range_in_normal_mode_is_flagged() {
        let mut tracker = default_tracker();

        let result = tracker.register(&frame(0, None, Some(centered_mask()))).unwrap();

        let issues = result.confidence.issues();
        assert!(issues.contains(&ConfidenceIssue::MissingRange));
        assert!(issues.contains(&ConfidenceIssue::TranslationUnavailable));
        // Hypotheses at the origin cannot be rendered.
        assert!(issues.contains(&ConfidenceIssue::NoScorableHypothesis));
        assert!(tracker.state().is_tracking());
    }

    #[test]
    fn test_small_mask_is_low_validity_not_failure() {
        let mut tracker = default_tracker();
        let mut small = ObjectMask::new(WIDTH, HEIGHT);
        for u in 15..=17 {
            small.put_pixel(u, 12, Luma([255]));
        }

        let registered = tracker
            .register(&frame(0, Some(flat_range(1.0)), Some(small.clone())))
            .unwrap();
        let tracked = tracker
            .track_one(&frame(1, Some(flat_range(1.0)), Some(small)))
            .unwrap();

        for result in [&registered, &tracked] {
            assert!(result.confidence.is_low());
            assert!(result
                .confidence
                .issues()
                .contains(&ConfidenceIssue::LowValidity { valid_pixels: 3 }));
            assert_eq!(result.metrics.valid_pixels, Some(3));
        }
        assert_relative_eq!(registered.pose.translation.z, 1.0, epsilon = 1e-5);
        assert_eq!(tracker.pose(), Some(&tracked.pose));
    }

    #[test]
    fn test_drift_correction_pulls_toward_mask() {
        let mut tracker = default_tracker();
        let registered = tracker.register(&masked_frame(0)).unwrap().pose;

        // Mask moved 8 px right: x estimate = 8 * 1.0 / 100 = 0.08 m.
        let mut shifted = ObjectMask::new(WIDTH, HEIGHT);
        for v in 8..=16 {
            for u in 20..=28 {
                shifted.put_pixel(u, v, Luma([255]));
            }
        }
        let result = tracker
            .track_one(&frame(1, Some(flat_range(1.0)), Some(shifted)))
            .unwrap();

        assert!(matches!(result.metrics.drift, Some(DriftOutcome::Corrected { .. })));
        assert_relative_eq!(
            result.pose.translation.x,
            registered.translation.x * 0.7 + 0.08 * 0.3,
            epsilon = 1e-5
        );
        assert_eq!(result.pose.rotation, registered.rotation);
    }

    #[test]
    fn test_track_without_mask_skips_drift() {
        let mut tracker = default_tracker();
        tracker.register(&masked_frame(0)).unwrap();

        let result = tracker
            .track_one(&frame(1, Some(flat_range(1.0)), None))
            .unwrap();

        assert_eq!(result.metrics.drift, Some(DriftOutcome::Skipped(SkipReason::NoMask)));
        assert_eq!(result.metrics.valid_pixels, None);
    }

    #[test]
    fn test_register_while_tracking_reinitializes() {
        let mut tracker = default_tracker();
        tracker.register(&masked_frame(0)).unwrap();
        tracker
            .track_one(&frame(1, Some(flat_range(1.5)), Some(centered_mask())))
            .unwrap();

        let again = tracker
            .register(&frame(2, Some(flat_range(2.0)), Some(centered_mask())))
            .unwrap();

        assert_relative_eq!(again.pose.translation.z, 2.0, epsilon = 1e-5);
        assert_eq!(tracker.pose(), Some(&again.pose));
    }

    #[test]
    fn test_all_output_poses_are_rigid() {
        let mut tracker = tracker_with(
            ShiftRefiner::new(Vector3::new(0.001, -0.002, 0.003)),
            RotationScorer {
                target: UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1),
            },
            TrackerConfig::default(),
        );

        let mut poses = vec![tracker.register(&masked_frame(0)).unwrap().pose];
        for i in 1..5 {
            poses.push(tracker.track_one(&masked_frame(i)).unwrap().pose);
        }

        assert!(poses.iter().all(|p| p.is_rigid()));
    }

    #[test]
    fn test_reset_returns_to_uninitialized() {
        let mut tracker = default_tracker();
        tracker.register(&masked_frame(0)).unwrap();

        tracker.reset();

        assert!(tracker.pose().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrackerConfig {
            min_range: 0.0,
            ..TrackerConfig::default()
        };
        let result = PoseTracker::new(
            Arc::new(unit_model()),
            camera(),
            TestRenderer::default(),
            identity_refiner(),
            FixedScorer::new(Vec::new()),
            config,
        );

        assert!(matches!(result, Err(TrackingError::Config(_))));
    }
}
