//! Cold-start pose hypotheses: translation estimate + deterministic rotation grid.

pub mod batch;
pub mod generator;
pub mod icosphere;

pub use batch::HypothesisBatch;
pub use generator::{
    rotation_grid, DepthSource, HypothesisConfig, HypothesisGenerator, TranslationEstimate,
};
