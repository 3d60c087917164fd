use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nalgebra::Vector3;

use rust_posetrack::eval::{compare_runs, pose_error, PoseError};
use rust_posetrack::geometry::RigidPose;
use rust_posetrack::io::{read_pose_dir, FrameSource, SceneDirSource};

const USAGE: &str =
    "usage: rust_posetrack <baseline_out> <candidate_out> [scene_dir] [model_points.xyz] [report.yaml]";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("{USAGE}");
    }
    let baseline_dir = PathBuf::from(&args[0]);
    let candidate_dir = PathBuf::from(&args[1]);
    let scene_dir = args.get(2).map(PathBuf::from);
    let points_path = args.get(3).map(PathBuf::from);
    let report_path = args
        .get(4)
        .map(PathBuf::from)
        .unwrap_or_else(|| candidate_dir.join("comparison.yaml"));

    let baseline = read_pose_dir(&baseline_dir)?;
    let candidate = read_pose_dir(&candidate_dir)?;
    println!(
        "Loaded {} baseline poses from {}, {} candidate poses from {}",
        baseline.len(),
        baseline_dir.display(),
        candidate.len(),
        candidate_dir.display()
    );

    let model_points = match &points_path {
        Some(path) => read_points(path)?,
        None => Vec::new(),
    };

    let (baseline_errors, candidate_errors) = match &scene_dir {
        Some(dir) => {
            let source = SceneDirSource::new(dir)?;
            let gt = ground_truth_by_id(&source)?;
            println!("Loaded {} ground-truth poses from {}", gt.len(), dir.display());
            (
                errors_against(&baseline, &gt, &model_points),
                errors_against(&candidate, &gt, &model_points),
            )
        }
        None => (Vec::new(), Vec::new()),
    };

    let baseline_poses: Vec<RigidPose> = baseline.iter().map(|(_, p)| *p).collect();
    let candidate_poses: Vec<RigidPose> = candidate.iter().map(|(_, p)| *p).collect();
    let report = compare_runs(
        &baseline_poses,
        &candidate_poses,
        &baseline_errors,
        &candidate_errors,
    );

    if let Some(s) = &report.stability {
        println!(
            "Stability improvement: trans var {:.3e} m^2, rot var {:.3} deg^2, f2f trans {:.4} m, f2f rot {:.3} deg",
            s.translation_variance_improvement,
            s.rotation_variance_improvement,
            s.frame_to_frame_translation_improvement,
            s.frame_to_frame_rotation_improvement,
        );
    }
    if let Some(e) = &report.pose_errors {
        println!(
            "Mean error baseline: trans {:.4} m, rot {:.3} deg, ADD {:.4} m",
            e.baseline.translation, e.baseline.rotation_deg, e.baseline.add
        );
        println!(
            "Mean error candidate: trans {:.4} m, rot {:.3} deg, ADD {:.4} m",
            e.candidate.translation, e.candidate.rotation_deg, e.candidate.add
        );
    }

    report.write_yaml(&report_path)?;
    println!("Report written to {}", report_path.display());
    Ok(())
}

fn ground_truth_by_id(source: &SceneDirSource) -> Result<HashMap<String, RigidPose>> {
    let mut gt = HashMap::new();
    for idx in 0..source.len() {
        let Some(id) = source.frame_id(idx) else {
            continue;
        };
        if let Some(pose) = source.get_ground_truth(idx)? {
            gt.insert(id.to_string(), pose);
        }
    }
    Ok(gt)
}

fn errors_against(
    run: &[(String, RigidPose)],
    gt: &HashMap<String, RigidPose>,
    model_points: &[Vector3<f64>],
) -> Vec<PoseError> {
    run.iter()
        .filter_map(|(id, pose)| gt.get(id).map(|g| pose_error(pose, g, model_points)))
        .collect()
}

/// One `x y z` point per line; extra columns (normals) are ignored.
fn read_points(path: &Path) -> Result<Vec<Vector3<f64>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model points {}", path.display()))?;
    let mut points = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() || cols[0].starts_with('#') {
            continue;
        }
        if cols.len() < 3 {
            bail!("{}:{}: expected at least 3 columns", path.display(), lineno + 1);
        }
        let parse = |s: &str| {
            s.parse::<f64>()
                .with_context(|| format!("{}:{}: bad number {s:?}", path.display(), lineno + 1))
        };
        points.push(Vector3::new(parse(cols[0])?, parse(cols[1])?, parse(cols[2])?));
    }
    Ok(points)
}
