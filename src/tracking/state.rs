//! Tracking state machine.

use crate::geometry::RigidPose;

/// State of a [`super::PoseTracker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingState {
    /// No pose yet; waiting for a registration frame with a mask.
    Uninitialized,
    /// Registered; holds the most recent object-in-camera pose.
    Tracking(RigidPose),
}

impl TrackingState {
    pub fn pose(&self) -> Option<&RigidPose> {
        match self {
            Self::Uninitialized => None,
            Self::Tracking(pose) => Some(pose),
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Tracking(_))
    }
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::Uninitialized
    }
}
