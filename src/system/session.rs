//! Session runner: drives a frame source through a pose tracker and writes
//! per-frame pose files plus a status log.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geometry::RigidPose;
use crate::io::pose_io::write_pose;
use crate::io::FrameSource;
use crate::predictor::{CropRenderer, RefinePredictor, ScorePredictor};
use crate::tracking::{FrameKind, FrameResult, PoseTracker, TrackerConfig};

/// File name of the per-frame status log inside the output directory.
pub const STATUS_FILE: &str = "status.csv";

/// What to do when a tracking frame cannot be processed, either because a
/// predictor failed or because its files could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorFailurePolicy {
    /// Stop the session with the error.
    #[default]
    Abort,
    /// Mark the frame failed, keep the previous pose and continue.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pass masks to tracking frames (registration always uses one).
    pub use_masks: bool,
    pub on_predictor_failure: PredictorFailurePolicy,
    pub tracker: TrackerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            use_masks: true,
            on_predictor_failure: PredictorFailurePolicy::Abort,
            tracker: TrackerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading session config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing session config {}", path.display()))?;
        config.tracker.validate()?;
        Ok(config)
    }
}

/// Outcome of a frame in the status log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    Ok,
    LowConfidence,
    Failed,
}

#[derive(Debug, Serialize)]
struct StatusRecord<'a> {
    frame_id: &'a str,
    status: FrameStatus,
    valid_pixels: Option<usize>,
    render_failures: usize,
    drift: &'a str,
    detail: String,
}

/// Result of [`TrackingSession::process_frame`].
#[derive(Debug)]
pub enum FrameOutcome {
    Processed(FrameResult),
    /// Tracking-frame failure under [`PredictorFailurePolicy::Skip`].
    Skipped { error: String },
}

/// Counters and trajectory of a finished run.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub n_frames: usize,
    pub n_ok: usize,
    pub n_low_confidence: usize,
    pub n_failed: usize,
    /// `(frame_id, pose)` of every processed frame, in order.
    pub trajectory: Vec<(String, RigidPose)>,
}

impl SessionSummary {
    pub fn poses(&self) -> Vec<RigidPose> {
        self.trajectory.iter().map(|(_, p)| *p).collect()
    }
}

pub struct TrackingSession<C, R, S> {
    tracker: PoseTracker<C, R, S>,
    config: SessionConfig,
    out_dir: PathBuf,
    status: csv::Writer<File>,
    summary: SessionSummary,
}

impl<C, R, S> TrackingSession<C, R, S>
where
    C: CropRenderer,
    R: RefinePredictor,
    S: ScorePredictor,
{
    /// Create the output directory and open its status log.
    pub fn new(
        tracker: PoseTracker<C, R, S>,
        config: SessionConfig,
        out_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(&out_dir)
            .with_context(|| format!("Failed to create {}", out_dir.display()))?;
        let status_path = out_dir.join(STATUS_FILE);
        let status = csv::Writer::from_path(&status_path)
            .with_context(|| format!("Failed to open {}", status_path.display()))?;
        Ok(Self {
            tracker,
            config,
            out_dir,
            status,
            summary: SessionSummary::default(),
        })
    }

    pub fn tracker(&self) -> &PoseTracker<C, R, S> {
        &self.tracker
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Process every frame of `source` in order.
    ///
    /// Fails up front when the source and the tracker disagree on
    /// geometry-free mode.
    pub fn run(mut self, source: &dyn FrameSource) -> Result<SessionSummary> {
        let tracker_geometry_free = self.tracker.config().geometry_free;
        if source.is_geometry_free() != tracker_geometry_free {
            bail!(
                "frame source geometry_free={} but tracker geometry_free={}",
                source.is_geometry_free(),
                tracker_geometry_free
            );
        }
        info!(n_frames = source.len(), out_dir = %self.out_dir.display(), "session started");
        for idx in 0..source.len() {
            self.process_frame(source, idx)?;
        }
        self.status.flush().context("flushing status log")?;
        info!(
            ok = self.summary.n_ok,
            low_confidence = self.summary.n_low_confidence,
            failed = self.summary.n_failed,
            "session finished"
        );
        Ok(self.summary)
    }

    /// Register when the tracker has no pose yet, track otherwise.
    ///
    /// A processed frame gets a pose file and a status row. Failures get a
    /// `failed` status row. Non-fatal failures on tracking frames are skipped
    /// under the `skip` policy; anything else aborts the session.
    pub fn process_frame(&mut self, source: &dyn FrameSource, idx: usize) -> Result<FrameOutcome> {
        let frame_id = source
            .frame_id(idx)
            .with_context(|| format!("No frame at index {idx}"))?
            .to_string();
        let registering = !self.tracker.state().is_tracking();
        let with_mask = registering || self.config.use_masks;
        self.summary.n_frames += 1;

        let frame = match source.load_frame(idx, with_mask) {
            Ok(frame) => frame,
            Err(err) => {
                let err = err.context(format!("loading frame {frame_id}"));
                return self.fail_frame(idx, &frame_id, registering, false, err);
            }
        };

        let result = if registering {
            self.tracker.register(&frame)
        } else {
            self.tracker.track_one(&frame)
        };

        match result {
            Ok(result) => {
                write_pose(&self.out_dir, &frame_id, &result.pose)?;
                let status = if result.confidence.is_low() {
                    self.summary.n_low_confidence += 1;
                    FrameStatus::LowConfidence
                } else {
                    self.summary.n_ok += 1;
                    FrameStatus::Ok
                };
                let detail = result
                    .confidence
                    .issues()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(";");
                let drift = match (result.kind, &result.metrics.drift) {
                    (FrameKind::Tracking, Some(outcome)) => outcome.label(),
                    _ => "",
                };
                self.status.serialize(StatusRecord {
                    frame_id: &frame_id,
                    status,
                    valid_pixels: result.metrics.valid_pixels,
                    render_failures: result.metrics.render_failures,
                    drift,
                    detail,
                })?;
                self.summary.trajectory.push((frame_id, result.pose));
                Ok(FrameOutcome::Processed(result))
            }
            Err(err) => {
                let fatal = err.is_fatal();
                let err = anyhow::Error::new(err).context(format!("frame {frame_id}"));
                self.fail_frame(idx, &frame_id, registering, fatal, err)
            }
        }
    }

    /// Write the `failed` row, then skip or abort per policy.
    fn fail_frame(
        &mut self,
        idx: usize,
        frame_id: &str,
        registering: bool,
        fatal: bool,
        err: anyhow::Error,
    ) -> Result<FrameOutcome> {
        let detail = format!("{err:#}");
        self.summary.n_failed += 1;
        self.status.serialize(StatusRecord {
            frame_id,
            status: FrameStatus::Failed,
            valid_pixels: None,
            render_failures: 0,
            drift: "",
            detail: detail.clone(),
        })?;
        self.status.flush().context("flushing status log")?;

        let skip = !registering
            && !fatal
            && self.config.on_predictor_failure == PredictorFailurePolicy::Skip;
        if skip {
            warn!(frame = idx, error = %detail, "frame failed, keeping previous pose");
            return Ok(FrameOutcome::Skipped { error: detail });
        }
        Err(err)
    }
}
