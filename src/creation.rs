use ahash::AHashMap;
use nalgebra::Point3;

use crate::mesh::Trimesh;

/// Create a mesh of a box centered at the origin with the
/// specified axis aligned bounding box size.
pub fn create_box(extents: &[f64; 3]) -> Trimesh {
    let half_extents = [extents[0] / 2.0, extents[1] / 2.0, extents[2] / 2.0];

    // Flattened vertices array
    let vertices = vec![
        -half_extents[0],
        -half_extents[1],
        -half_extents[2],
        half_extents[0],
        -half_extents[1],
        -half_extents[2],
        half_extents[0],
        half_extents[1],
        -half_extents[2],
        -half_extents[0],
        half_extents[1],
        -half_extents[2],
        -half_extents[0],
        -half_extents[1],
        half_extents[2],
        half_extents[0],
        -half_extents[1],
        half_extents[2],
        half_extents[0],
        half_extents[1],
        half_extents[2],
        -half_extents[0],
        half_extents[1],
        half_extents[2],
    ];

    // Flattened faces array
    let faces = vec![
        0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 2, 3, 7, 2, 7, 6, 1, 2, 6, 1, 6, 5,
        3, 0, 4, 3, 4, 7,
    ];

    // Create the mesh using Trimesh::from_slice
    Trimesh::from_slice(&vertices, &faces).unwrap()
}

/// Create a flat grid of `nx` by `ny` unit quads in the z = 0 plane,
/// each quad split into two triangles, with the lower-left corner at
/// the origin.
pub fn create_plane(nx: usize, ny: usize) -> Trimesh {
    let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
    for y in 0..=ny {
        for x in 0..=nx {
            vertices.push(Point3::new(x as f64, y as f64, 0.0));
        }
    }

    let index = |x: usize, y: usize| y * (nx + 1) + x;
    let mut faces = Vec::with_capacity(2 * nx * ny);
    for y in 0..ny {
        for x in 0..nx {
            faces.push((index(x, y), index(x + 1, y), index(x + 1, y + 1)));
            faces.push((index(x, y), index(x + 1, y + 1), index(x, y + 1)));
        }
    }

    Trimesh::new(vertices, faces, None).unwrap()
}

/// Create a unit-radius icosphere centered at the origin by subdividing
/// an icosahedron `subdivisions` times: 20 faces at level zero, times
/// four per level.
pub fn create_icosphere(subdivisions: usize) -> Trimesh {
    // golden-ratio icosahedron, normalized onto the unit sphere
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let raw = [
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
    ];
    let mut vertices: Vec<Point3<f64>> = raw
        .iter()
        .map(|v| Point3::from(nalgebra::Vector3::new(v[0], v[1], v[2]).normalize()))
        .collect();

    let mut faces: Vec<(usize, usize, usize)> = vec![
        (0, 11, 5),
        (0, 5, 1),
        (0, 1, 7),
        (0, 7, 10),
        (0, 10, 11),
        (1, 5, 9),
        (5, 11, 4),
        (11, 10, 2),
        (10, 7, 6),
        (7, 1, 8),
        (3, 9, 4),
        (3, 4, 2),
        (3, 2, 6),
        (3, 6, 8),
        (3, 8, 9),
        (4, 9, 5),
        (2, 4, 11),
        (6, 2, 10),
        (8, 6, 7),
        (9, 8, 1),
    ];

    for _ in 0..subdivisions {
        // midpoints are shared between the two faces of every edge
        let mut midpoint: AHashMap<(usize, usize), usize> = AHashMap::new();
        let mut split = |a: usize, b: usize, vertices: &mut Vec<Point3<f64>>| -> usize {
            let key = (a.min(b), a.max(b));
            if let Some(&existing) = midpoint.get(&key) {
                return existing;
            }
            let mid = Point3::from(((vertices[a].coords + vertices[b].coords) / 2.0).normalize());
            vertices.push(mid);
            midpoint.insert(key, vertices.len() - 1);
            vertices.len() - 1
        };

        let mut next = Vec::with_capacity(faces.len() * 4);
        for &(a, b, c) in faces.iter() {
            let ab = split(a, b, &mut vertices);
            let bc = split(b, c, &mut vertices);
            let ca = split(c, a, &mut vertices);
            next.push((a, ab, ca));
            next.push((b, bc, ab));
            next.push((c, ca, bc));
            next.push((ab, bc, ca));
        }
        faces = next;
    }

    Trimesh::new(vertices, faces, None).unwrap()
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_create_plane() {
        let plane = create_plane(10, 10);
        assert_eq!(plane.vertices.len(), 121);
        assert_eq!(plane.faces.len(), 200);
        // every quad contributes two half-unit triangles
        assert_relative_eq!(plane.area(), 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_create_icosphere() {
        let sphere = create_icosphere(2);
        assert_eq!(sphere.faces.len(), 320);
        assert_eq!(sphere.vertices.len(), 162);

        // every vertex sits on the unit sphere
        for v in sphere.vertices.iter() {
            assert_relative_eq!(v.coords.norm(), 1.0, epsilon = 1e-12);
        }

        // area approaches the sphere's as the subdivision refines
        let coarse = create_icosphere(0).area();
        let fine = sphere.area();
        let exact = 4.0 * std::f64::consts::PI;
        assert!((exact - fine).abs() < (exact - coarse).abs());
    }
}
