//! Frame sources.
//!
//! The tracker never reads files itself; a [`FrameSource`] hands it images,
//! range, masks and intrinsics. [`SceneDirSource`] reads the usual
//! per-scene directory layout:
//!
//! ```text
//! <root>/rgb/<id>.png              color frames (ids are the sorted file stems)
//! <root>/depth/<id>.png            16-bit depth in millimetres
//! <root>/masks/<id>.png            object mask, any non-zero pixel is object
//! <root>/cam_K.txt                 3x3 camera matrix
//! <root>/annotated_poses/<id>.txt  optional ground-truth object poses
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Luma, RgbImage};
use tracing::{debug, warn};

use crate::geometry::range_filter::zero_range;
use crate::geometry::{CameraIntrinsics, ObjectMask, RangeImage, RigidPose, MIN_RANGE};
use crate::tracking::ObservationFrame;

use super::pose_io::{read_intrinsics, read_pose};

/// Depth values at or beyond this distance (metres) are dropped on load.
pub const DEFAULT_ZFAR: f32 = 100.0;

/// Random access to the frames of one sequence.
pub trait FrameSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable identifier used for output file names.
    fn frame_id(&self, idx: usize) -> Option<&str>;

    fn get_image(&self, idx: usize) -> Result<RgbImage>;

    /// Range in metres; `None` when the frame has no depth.
    fn get_range(&self, idx: usize) -> Result<Option<RangeImage>>;

    /// Object mask; `None` when the frame has no mask.
    fn get_mask(&self, idx: usize) -> Result<Option<ObjectMask>>;

    fn intrinsics(&self) -> &CameraIntrinsics;

    /// Whether range images are zero placeholders rather than measurements.
    fn is_geometry_free(&self) -> bool {
        false
    }

    fn get_ground_truth(&self, _idx: usize) -> Result<Option<RigidPose>> {
        Ok(None)
    }

    /// Bundle everything for frame `idx`, dropping the mask unless `with_mask`.
    fn load_frame(&self, idx: usize, with_mask: bool) -> Result<ObservationFrame> {
        let rgb = self.get_image(idx)?;
        let range = self.get_range(idx)?;
        let mask = if with_mask { self.get_mask(idx)? } else { None };
        Ok(ObservationFrame::new(idx, rgb, range, mask)?)
    }
}

/// Per-scene directory backend.
#[derive(Debug)]
pub struct SceneDirSource {
    root: PathBuf,
    ids: Vec<String>,
    intrinsics: CameraIntrinsics,
    geometry_free: bool,
    zfar: f32,
}

impl SceneDirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::with_options(root, false, DEFAULT_ZFAR)
    }

    /// `geometry_free` replaces every range image with zeros.
    pub fn with_options<P: AsRef<Path>>(root: P, geometry_free: bool, zfar: f32) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let ids = list_frame_ids(&root.join("rgb"))?;
        let intrinsics = read_intrinsics(root.join("cam_K.txt"))?;
        debug!(
            root = %root.display(),
            n_frames = ids.len(),
            geometry_free,
            "opened scene directory"
        );
        Ok(Self {
            root,
            ids,
            intrinsics,
            geometry_free,
            zfar,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn id(&self, idx: usize) -> Result<&str> {
        self.frame_id(idx)
            .with_context(|| format!("No frame at index {idx} in {}", self.root.display()))
    }

    fn frame_file(&self, dir: &str, idx: usize, ext: &str) -> Result<PathBuf> {
        let id = self.id(idx)?;
        Ok(self.root.join(dir).join(format!("{id}.{ext}")))
    }
}

impl FrameSource for SceneDirSource {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn frame_id(&self, idx: usize) -> Option<&str> {
        self.ids.get(idx).map(String::as_str)
    }

    fn get_image(&self, idx: usize) -> Result<RgbImage> {
        let path = self.frame_file("rgb", idx, "png")?;
        let img = image::open(&path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(img.into_rgb8())
    }

    fn get_range(&self, idx: usize) -> Result<Option<RangeImage>> {
        if self.geometry_free {
            let path = self.frame_file("rgb", idx, "png")?;
            let (w, h) = image::image_dimensions(&path)
                .with_context(|| format!("Failed to read image size {}", path.display()))?;
            return Ok(Some(zero_range(w, h)));
        }
        let path = self.frame_file("depth", idx, "png")?;
        if !path.exists() {
            warn!(frame = idx, path = %path.display(), "depth file missing");
            return Ok(None);
        }
        let raw = image::open(&path)
            .with_context(|| format!("Failed to read depth {}", path.display()))?
            .into_luma16();
        let (w, h) = raw.dimensions();
        let mut range = RangeImage::new(w, h);
        for (u, v, px) in raw.enumerate_pixels() {
            let z = px.0[0] as f32 / 1000.0;
            if z >= MIN_RANGE && z < self.zfar {
                range.put_pixel(u, v, Luma([z]));
            }
        }
        Ok(Some(range))
    }

    fn get_mask(&self, idx: usize) -> Result<Option<ObjectMask>> {
        let path = self.frame_file("masks", idx, "png")?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = image::open(&path)
            .with_context(|| format!("Failed to read mask {}", path.display()))?
            .into_rgb8();
        let (w, h) = raw.dimensions();
        let mut mask = ObjectMask::new(w, h);
        for (u, v, px) in raw.enumerate_pixels() {
            if px.0.iter().any(|&c| c > 0) {
                mask.put_pixel(u, v, Luma([255]));
            }
        }
        Ok(Some(mask))
    }

    fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    fn is_geometry_free(&self) -> bool {
        self.geometry_free
    }

    fn get_ground_truth(&self, idx: usize) -> Result<Option<RigidPose>> {
        let path = self.frame_file("annotated_poses", idx, "txt")?;
        if !path.exists() {
            return Ok(None);
        }
        read_pose(&path).map(Some)
    }
}

/// Sorted stems of the `.png` files in `dir`.
fn list_frame_ids(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to list frames in {}", dir.display()))?;
    let mut ids = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if !is_png {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod test_scene {
    use std::fs;
    use std::path::Path;

    use image::{ImageBuffer, Luma, Rgb, RgbImage};

    pub const W: u32 = 16;
    pub const H: u32 = 12;

    /// Write a scene with `n` frames at 1.2 m. Frame 1 has no mask.
    pub fn write_scene(root: &Path, n: usize) {
        for dir in ["rgb", "depth", "masks", "annotated_poses"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("cam_K.txt"), "100 0 8\n0 100 6\n0 0 1\n").unwrap();
        for i in 0..n {
            let id = format!("{i:06}");
            RgbImage::from_pixel(W, H, Rgb([10, 20, 30]))
                .save(root.join("rgb").join(format!("{id}.png")))
                .unwrap();
            let mut depth = ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(W, H, Luma([1200]));
            depth.put_pixel(0, 0, Luma([0]));
            depth
                .save(root.join("depth").join(format!("{id}.png")))
                .unwrap();
            if i != 1 {
                let mut mask = RgbImage::new(W, H);
                for v in 3..=9 {
                    for u in 4..=12 {
                        mask.put_pixel(u, v, Rgb([0, 0, 255]));
                    }
                }
                mask.save(root.join("masks").join(format!("{id}.png")))
                    .unwrap();
            }
        }
        fs::write(
            root.join("annotated_poses").join("000000.txt"),
            "1 0 0 0\n0 1 0 0\n0 0 1 1.2\n0 0 0 1\n",
        )
        .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_scene::{write_scene, H, W};
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scene_dir_reads_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 3);

        let source = SceneDirSource::new(dir.path()).unwrap();

        assert_eq!(source.len(), 3);
        assert_eq!(source.frame_id(2), Some("000002"));
        assert_eq!(source.frame_id(3), None);
        assert_eq!(source.intrinsics().fx, 100.0);
        assert_eq!(source.get_image(0).unwrap().dimensions(), (W, H));

        let range = source.get_range(0).unwrap().unwrap();
        assert_relative_eq!(range.get_pixel(5, 5).0[0], 1.2, epsilon = 1e-6);
        assert_eq!(range.get_pixel(0, 0).0[0], 0.0);
    }

    #[test]
    fn test_mask_is_binarized_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 2);
        let source = SceneDirSource::new(dir.path()).unwrap();

        let mask = source.get_mask(0).unwrap().unwrap();
        assert_eq!(mask.get_pixel(4, 3).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert!(source.get_mask(1).unwrap().is_none());
    }

    #[test]
    fn test_geometry_free_range_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 1);
        let source = SceneDirSource::with_options(dir.path(), true, DEFAULT_ZFAR).unwrap();

        let range = source.get_range(0).unwrap().unwrap();
        assert!(source.is_geometry_free());
        assert_eq!(range.dimensions(), (W, H));
        assert!(range.pixels().all(|p| p.0[0] == 0.0));
        assert!(!SceneDirSource::new(dir.path()).unwrap().is_geometry_free());
    }

    #[test]
    fn test_geometry_free_ignores_unreadable_depth() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 1);
        fs::write(dir.path().join("depth").join("000000.png"), b"truncated").unwrap();
        let source = SceneDirSource::with_options(dir.path(), true, DEFAULT_ZFAR).unwrap();

        let frame = source.load_frame(0, true).unwrap();

        assert_eq!(frame.range().unwrap().dimensions(), (W, H));
    }

    #[test]
    fn test_missing_depth_is_none() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 1);
        fs::remove_file(dir.path().join("depth").join("000000.png")).unwrap();
        let source = SceneDirSource::new(dir.path()).unwrap();

        assert!(source.get_range(0).unwrap().is_none());
    }

    #[test]
    fn test_ground_truth_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 2);
        let source = SceneDirSource::new(dir.path()).unwrap();

        let gt = source.get_ground_truth(0).unwrap().unwrap();
        assert_relative_eq!(gt.translation.z, 1.2);
        assert!(source.get_ground_truth(1).unwrap().is_none());
    }

    #[test]
    fn test_load_frame_respects_with_mask() {
        let dir = tempfile::tempdir().unwrap();
        write_scene(dir.path(), 1);
        let source = SceneDirSource::new(dir.path()).unwrap();

        assert!(source.load_frame(0, true).unwrap().mask().is_some());
        assert!(source.load_frame(0, false).unwrap().mask().is_none());
    }

    #[test]
    fn test_missing_rgb_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(SceneDirSource::new(dir.path()).is_err());
    }
}
