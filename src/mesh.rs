use std::sync::RwLock;

use anyhow::Result;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::attributes::{Attributes, LoadSource};
use crate::simplify::{Simplifier, SimplifyOptions};

// The inner cache for the Trimesh struct: derived values computed once.
// A Trimesh is never mutated in place, so nothing here ever goes stale.
#[derive(Default, Debug, Clone)]
pub struct InnerCache {
    pub face_normals: Option<Vec<Vector3<f64>>>,
    pub faces_cross: Option<Vec<Vector3<f64>>>,
    pub faces_area: Option<Vec<f64>>,
    pub area: Option<f64>,
    pub edges: Option<Vec<[usize; 2]>>,
}

#[derive(Default, Debug)]
pub struct Trimesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<(usize, usize, usize)>,

    // face-level attributes (per-corner UV, per-face material)
    pub attributes_face: Attributes,

    // information about where the mesh came from
    pub source: LoadSource,

    // the cached values computed for the mesh
    pub _cache: RwLock<InnerCache>,
}

impl Clone for Trimesh {
    fn clone(&self) -> Self {
        let cache = self._cache.read().unwrap();
        Self {
            vertices: self.vertices.clone(),
            faces: self.faces.clone(),
            attributes_face: self.attributes_face.clone(),
            source: self.source.clone(),
            _cache: RwLock::new(cache.clone()),
        }
    }
}

impl Trimesh {
    /// Create a new trimesh from vertex positions and face index triples.
    pub fn new(
        vertices: Vec<Point3<f64>>,
        faces: Vec<(usize, usize, usize)>,
        attributes_face: Option<Attributes>,
    ) -> Result<Self> {
        Ok(Self {
            vertices,
            faces,
            attributes_face: attributes_face.unwrap_or_default(),
            ..Default::default()
        })
    }

    /// Create a Trimesh from flat slices of vertices and faces.
    pub fn from_slice(vertices: &[f64], faces: &[usize]) -> Result<Self> {
        let vertices: Vec<Point3<f64>> = vertices
            .chunks_exact(3)
            .map(|chunk| Point3::new(chunk[0], chunk[1], chunk[2]))
            .collect();

        let faces: Vec<(usize, usize, usize)> = faces
            .chunks_exact(3)
            .map(|chunk| (chunk[0], chunk[1], chunk[2]))
            .collect();

        Ok(Self {
            vertices,
            faces,
            ..Default::default()
        })
    }

    /// Simplify this mesh by iterative quadric-error edge collapse,
    /// returning a new mesh with roughly `options.target_count` faces
    /// (more if the no-progress abort fires first).
    pub fn simplify(&self, options: &SimplifyOptions) -> Result<Self> {
        let mut simplifier = Simplifier::from_mesh(self);
        simplifier.simplify(options)?;
        Ok(simplifier.into_mesh())
    }

    /// The non-normalized cross product of every face.
    pub fn faces_cross(&self) -> Vec<Vector3<f64>> {
        if let Some(cached) = self._cache.read().unwrap().faces_cross.clone() {
            return cached;
        }
        let computed: Vec<Vector3<f64>> = self
            .faces
            .par_iter()
            .map(|face| {
                let v0 = self.vertices[face.0];
                let v1 = self.vertices[face.1];
                let v2 = self.vertices[face.2];
                (v1 - v0).cross(&(v2 - v0))
            })
            .collect();
        self._cache.write().unwrap().faces_cross = Some(computed.clone());
        computed
    }

    /// Calculate the unit normal for each face of the mesh. Degenerate
    /// faces get a zero normal rather than NaN.
    pub fn face_normals(&self) -> Vec<Vector3<f64>> {
        if let Some(cached) = self._cache.read().unwrap().face_normals.clone() {
            return cached;
        }
        let computed: Vec<Vector3<f64>> = self
            .faces_cross()
            .par_iter()
            .map(|cross| cross.try_normalize(0.0).unwrap_or_else(Vector3::zeros))
            .collect();
        self._cache.write().unwrap().face_normals = Some(computed.clone());
        computed
    }

    /// The area for each triangle in the mesh.
    pub fn faces_area(&self) -> Vec<f64> {
        if let Some(cached) = self._cache.read().unwrap().faces_area.clone() {
            return cached;
        }
        let computed: Vec<f64> = self
            .faces_cross()
            .par_iter()
            .map(|cross| cross.norm() / 2.0)
            .collect();
        self._cache.write().unwrap().faces_area = Some(computed.clone());
        computed
    }

    /// The summed area of every triangle in the mesh.
    pub fn area(&self) -> f64 {
        if let Some(cached) = self._cache.read().unwrap().area {
            return cached;
        }
        let computed = self.faces_area().iter().sum();
        self._cache.write().unwrap().area = Some(computed);
        computed
    }

    // Get the directed edges calculated from the faces.
    pub fn edges(&self) -> Vec<[usize; 2]> {
        if let Some(cached) = self._cache.read().unwrap().edges.clone() {
            return cached;
        }
        let computed: Vec<[usize; 2]> = self
            .faces
            .par_iter()
            .flat_map(|face| vec![[face.0, face.1], [face.1, face.2], [face.2, face.0]])
            .collect();
        self._cache.write().unwrap().edges = Some(computed.clone());
        computed
    }

    /// Calculate an axis-aligned bounding box (AABB) for the mesh,
    /// or an error if the mesh is empty.
    pub fn bounds(&self) -> Result<(Point3<f64>, Point3<f64>)> {
        if self.vertices.is_empty() {
            return Err(anyhow::anyhow!("Mesh has no vertices"));
        }

        let (mut lower, mut upper) = (self.vertices[0], self.vertices[0]);
        for vertex in self.vertices.iter().skip(1) {
            // use componentwise min/max
            lower = lower.inf(vertex);
            upper = upper.sup(vertex);
        }

        Ok((lower, upper))
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::creation::create_box;
    use approx::{assert_relative_eq, relative_eq};

    #[test]
    fn test_mesh_normals() {
        let m = Trimesh::from_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2])
            .unwrap();
        let normals = m.face_normals();
        assert_eq!(normals.len(), 1);
        assert!(relative_eq!(
            normals[0],
            Vector3::new(0.0, 0.0, 1.0),
            epsilon = 1e-6
        ));
    }

    #[test]
    fn test_mesh_box() {
        let box_mesh = create_box(&[1.0, 1.0, 1.0]);
        assert_eq!(box_mesh.vertices.len(), 8);
        assert_eq!(box_mesh.faces.len(), 12);

        let bounds = box_mesh.bounds().unwrap();
        assert_eq!(bounds.0, Point3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.1, Point3::new(0.5, 0.5, 0.5));

        // six unit faces of two triangles each
        assert_relative_eq!(box_mesh.area(), 6.0, epsilon = 1e-10);
        assert_eq!(box_mesh.edges().len(), 36);
    }

    #[test]
    fn test_degenerate_normal_is_zero() {
        // a zero-area triangle must produce a zero normal, not NaN
        let m = Trimesh::from_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0], &[0, 1, 2])
            .unwrap();
        let normals = m.face_normals();
        assert_eq!(normals[0], Vector3::zeros());
    }
}
