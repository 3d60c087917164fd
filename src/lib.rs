//! Model-based 6-DoF object pose registration and tracking.
//!
//! - `geometry`: rigid poses, intrinsics, point fields, surface models
//! - `hypothesis`: cold-start rotation grid and translation estimate
//! - `predictor`: renderer and network contracts supplied by the caller
//! - `tracking`: register / track state machine
//! - `io`, `system`: frame sources, pose files and the session runner
//! - `eval`: pose error and stability metrics

pub mod eval;
pub mod geometry;
pub mod hypothesis;
pub mod io;
pub mod predictor;
pub mod system;
pub mod tracking;
