//! Dataset access and result files.

pub mod dataset;
pub mod pose_io;

pub use dataset::{FrameSource, SceneDirSource};
pub use pose_io::{read_intrinsics, read_pose, read_pose_dir, write_pose};
