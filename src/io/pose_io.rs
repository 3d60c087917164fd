//! Text formats for intrinsics and poses.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nalgebra::{Matrix3, Matrix4};

use crate::geometry::{CameraIntrinsics, RigidPose};

/// Sub-directory of the output root holding one pose file per frame.
pub const POSE_DIR: &str = "ob_in_cam";

fn parse_numbers(text: &str, path: &Path) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .with_context(|| format!("bad number {tok:?} in {}", path.display()))
        })
        .collect()
}

/// Read a 3x3 row-major camera matrix (`cam_K.txt`).
pub fn read_intrinsics(path: impl AsRef<Path>) -> Result<CameraIntrinsics> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read intrinsics {}", path.display()))?;
    let values = parse_numbers(&text, path)?;
    if values.len() != 9 {
        bail!(
            "{}: expected 9 values for a 3x3 camera matrix, found {}",
            path.display(),
            values.len()
        );
    }
    let k = Matrix3::from_row_slice(&values);
    CameraIntrinsics::from_k(&k).with_context(|| format!("in {}", path.display()))
}

/// Four space-separated rows, every entry in `{:.18e}` so values survive a
/// text round trip bit for bit.
pub fn format_pose(pose: &RigidPose) -> String {
    let m = pose.to_matrix();
    let mut out = String::new();
    for r in 0..4 {
        let row: Vec<String> = (0..4).map(|c| format!("{:.18e}", m[(r, c)])).collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

/// `<out_dir>/ob_in_cam/<frame_id>.txt`
pub fn pose_path(out_dir: impl AsRef<Path>, frame_id: &str) -> PathBuf {
    out_dir.as_ref().join(POSE_DIR).join(format!("{frame_id}.txt"))
}

/// Write one frame's pose, creating the pose directory if needed.
pub fn write_pose(out_dir: impl AsRef<Path>, frame_id: &str, pose: &RigidPose) -> Result<PathBuf> {
    let path = pose_path(out_dir, frame_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&path, format_pose(pose))
        .with_context(|| format!("Failed to write pose {}", path.display()))?;
    Ok(path)
}

/// Read a 4x4 pose file, rejecting matrices that are not rigid transforms.
pub fn read_pose(path: impl AsRef<Path>) -> Result<RigidPose> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pose {}", path.display()))?;
    let values = parse_numbers(&text, path)?;
    if values.len() != 16 {
        bail!(
            "{}: expected 16 values for a 4x4 pose, found {}",
            path.display(),
            values.len()
        );
    }
    let m = Matrix4::from_row_slice(&values);
    RigidPose::try_from_matrix(&m).with_context(|| format!("in {}", path.display()))
}

/// Every `<id>.txt` pose under `<out_dir>/ob_in_cam`, sorted by id.
pub fn read_pose_dir(out_dir: impl AsRef<Path>) -> Result<Vec<(String, RigidPose)>> {
    let dir = out_dir.as_ref().join(POSE_DIR);
    let mut poses = Vec::new();
    for entry in fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        poses.push((id.to_string(), read_pose(&path)?));
    }
    poses.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(poses)
}
