//! Deterministic viewpoint sampling on a subdivided icosahedron.

use std::collections::HashMap;

use nalgebra::Vector3;

const ICOSAHEDRON_FACES: [[usize; 3]; 20] = [
    [0, 11, 5],
    [0, 5, 1],
    [0, 1, 7],
    [0, 7, 10],
    [0, 10, 11],
    [1, 5, 9],
    [5, 11, 4],
    [11, 10, 2],
    [10, 7, 6],
    [7, 1, 8],
    [3, 9, 4],
    [3, 4, 2],
    [3, 2, 6],
    [3, 6, 8],
    [3, 8, 9],
    [4, 9, 5],
    [2, 4, 11],
    [6, 2, 10],
    [8, 6, 7],
    [9, 8, 1],
];

fn icosahedron_vertices() -> Vec<Vector3<f64>> {
    let t = (1.0 + 5f64.sqrt()) / 2.0;
    [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .iter()
    .map(|v| Vector3::new(v[0], v[1], v[2]).normalize())
    .collect()
}

/// Unit-sphere vertices of an icosphere with at least `min_vertices` points.
///
/// Starts from the 12 icosahedron vertices and splits every face into four
/// until the vertex count reaches `min_vertices` (12, 42, 162, 642, ...).
/// Vertex order depends only on the subdivision level.
pub fn icosphere_vertices(min_vertices: usize) -> Vec<Vector3<f64>> {
    let mut vertices = icosahedron_vertices();
    let mut faces: Vec<[usize; 3]> = ICOSAHEDRON_FACES.to_vec();

    while vertices.len() < min_vertices {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next_faces = Vec::with_capacity(faces.len() * 4);
        for &[a, b, c] in &faces {
            let ab = midpoint(&mut vertices, &mut midpoints, a, b);
            let bc = midpoint(&mut vertices, &mut midpoints, b, c);
            let ca = midpoint(&mut vertices, &mut midpoints, c, a);
            next_faces.push([a, ab, ca]);
            next_faces.push([b, bc, ab]);
            next_faces.push([c, ca, bc]);
            next_faces.push([ab, bc, ca]);
        }
        faces = next_faces;
    }
    vertices
}

fn midpoint(
    vertices: &mut Vec<Vector3<f64>>,
    cache: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = (a.min(b), a.max(b));
    *cache.entry(key).or_insert_with(|| {
        let m = ((vertices[a] + vertices[b]) / 2.0).normalize();
        vertices.push(m);
        vertices.len() - 1
    })
}
