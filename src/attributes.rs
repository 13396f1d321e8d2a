use nalgebra::Vector3;

use crate::exchange::MeshFormat;

/// Face-level attributes that travel with a mesh and survive
/// simplification.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    /// Per-corner texture coordinates, parallel to `faces`. Present only
    /// when every face carried a full UV triplet; the third component
    /// holds the optional `vt` w value and is usually zero.
    pub uv: Option<Vec<[Vector3<f64>; 3]>>,

    /// Per-face material index into `LoadSource::materials`, parallel to
    /// `faces`. `None` for faces before the first `usemtl`.
    pub material: Vec<Option<usize>>,
}

/// Where a mesh came from and what the file carried besides geometry.
#[derive(Debug, Clone, Default)]
pub struct LoadSource {
    /// The format this mesh was loaded from, if any.
    pub format: Option<MeshFormat>,

    /// The `mtllib` line of an OBJ file, passed through on write.
    pub mtllib: Option<String>,

    /// Material names in first-use order; face material indices point
    /// into this table.
    pub materials: Vec<String>,
}
