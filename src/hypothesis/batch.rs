//! Ordered batch of candidate poses.

use crate::geometry::RigidPose;

/// Ordered sequence of pose hypotheses evaluated together.
///
/// This is the only pose-collection type passed between components; tracking
/// wraps its single prior pose in a one-element batch rather than using a
/// separate unbatched path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HypothesisBatch {
    poses: Vec<RigidPose>,
}

impl HypothesisBatch {
    pub fn new(poses: Vec<RigidPose>) -> Self {
        Self { poses }
    }

    /// Batch holding exactly one hypothesis.
    pub fn singleton(pose: RigidPose) -> Self {
        Self { poses: vec![pose] }
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn poses(&self) -> &[RigidPose] {
        &self.poses
    }

    pub fn get(&self, idx: usize) -> Option<&RigidPose> {
        self.poses.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RigidPose> {
        self.poses.iter()
    }

    pub fn into_poses(self) -> Vec<RigidPose> {
        self.poses
    }
}

impl FromIterator<RigidPose> for HypothesisBatch {
    fn from_iter<I: IntoIterator<Item = RigidPose>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a HypothesisBatch {
    type Item = &'a RigidPose;
    type IntoIter = std::slice::Iter<'a, RigidPose>;

    fn into_iter(self) -> Self::IntoIter {
        self.poses.iter()
    }
}
