//! Object surface model: sampled points, normals and characteristic size.

use nalgebra::Vector3;
use rayon::prelude::*;

use super::GeometryError;

/// Immutable surface samples of the tracked object, in object coordinates.
///
/// The diameter (maximum pairwise point distance) is computed once here and
/// cached; translation heuristics and drift thresholds scale with it.
#[derive(Debug, Clone)]
pub struct SurfaceModel {
    points: Vec<Vector3<f64>>,
    normals: Vec<Vector3<f64>>,
    diameter: f64,
}

impl SurfaceModel {
    pub fn new(points: Vec<Vector3<f64>>, normals: Vec<Vector3<f64>>) -> Result<Self, GeometryError> {
        if points.is_empty() {
            return Err(GeometryError::EmptyModel);
        }
        if normals.len() != points.len() {
            return Err(GeometryError::NormalCountMismatch {
                points: points.len(),
                normals: normals.len(),
            });
        }
        let diameter = max_pairwise_distance(&points);
        Ok(Self {
            points,
            normals,
            diameter,
        })
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn diameter(&self) -> f64 {
        self.diameter
    }
}

/// Exact maximum distance over all point pairs.
fn max_pairwise_distance(points: &[Vector3<f64>]) -> f64 {
    let max_sq = points
        .par_iter()
        .enumerate()
        .map(|(i, a)| {
            points[i + 1..]
                .iter()
                .map(|b| (a - b).norm_squared())
                .fold(0.0f64, f64::max)
        })
        .reduce(|| 0.0, f64::max);
    max_sq.sqrt()
}
