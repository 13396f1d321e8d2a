mod obj;
mod tri;

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::mesh::Trimesh;

pub use obj::{load_obj, write_obj};
pub use tri::{load_tri, write_tri};

/// How often the loaders report progress, in lines.
pub const DEFAULT_PROGRESS_LINES: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
// An enum to represent the supported mesh file formats.
pub enum MeshFormat {
    // the OBJ format, an ASCII format with a lot of extra junk
    Obj,
    // nine whitespace-delimited numbers per line, one triangle each
    Tri9,
    // like tri9 plus a trailing quality column, ignored on load
    Tri10,
}

impl MeshFormat {
    /// Convert a string to a MeshFormat enum.
    pub fn from_string(s: &str) -> Result<Self> {
        // clean up to match 'obj', '.obj', ' .OBJ ', etc
        let binding = s.to_ascii_lowercase();
        let clean = binding.trim().trim_start_matches('.').trim();
        match clean {
            "obj" => Ok(MeshFormat::Obj),
            "tri9" => Ok(MeshFormat::Tri9),
            "tri10" => Ok(MeshFormat::Tri10),
            _ => Err(anyhow!("Unsupported file type: `{}`", clean)),
        }
    }

    /// Pick the format from a file path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow!("no file extension on `{}`", path.display()))?;
        Self::from_string(extension)
    }
}

/// Parse mesh data that is already in memory.
pub fn load_mesh(data: &str, format: MeshFormat, progress_lines: usize) -> Result<Trimesh> {
    match format {
        MeshFormat::Obj => load_obj(data, progress_lines),
        // the tri9 layout is read by the same probing loader
        MeshFormat::Tri9 | MeshFormat::Tri10 => tri::load_tri(data, progress_lines),
    }
}

/// Serialize a mesh for the given format.
pub fn save_mesh(mesh: &Trimesh, format: MeshFormat) -> String {
    match format {
        MeshFormat::Obj => write_obj(mesh),
        MeshFormat::Tri9 => write_tri(mesh, false),
        MeshFormat::Tri10 => write_tri(mesh, true),
    }
}

/// Load a mesh file, picking the format from the extension.
pub fn load_mesh_file(path: &Path, progress_lines: usize) -> Result<Trimesh> {
    let format = MeshFormat::from_path(path)?;
    let data = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;
    let mut mesh = load_mesh(&data, format, progress_lines)?;
    mesh.source.format = Some(format);
    Ok(mesh)
}

/// Write a mesh file, picking the format from the extension. The whole
/// file is serialized first so a failure never leaves partial output.
pub fn save_mesh_file(mesh: &Trimesh, path: &Path) -> Result<()> {
    let format = MeshFormat::from_path(path)?;
    let data = save_mesh(mesh, format);
    fs::write(path, data).with_context(|| format!("could not write `{}`", path.display()))
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_mesh_format_keys() {
        // check our string cleanup logic
        assert_eq!(MeshFormat::from_string("obj").unwrap(), MeshFormat::Obj);
        assert_eq!(MeshFormat::from_string("OBJ").unwrap(), MeshFormat::Obj);
        assert_eq!(MeshFormat::from_string(".obj").unwrap(), MeshFormat::Obj);
        assert_eq!(MeshFormat::from_string(" .ObJ ").unwrap(), MeshFormat::Obj);
        assert_eq!(MeshFormat::from_string("tri9").unwrap(), MeshFormat::Tri9);
        assert_eq!(MeshFormat::from_string(".tri9").unwrap(), MeshFormat::Tri9);
        assert_eq!(MeshFormat::from_string("tri10").unwrap(), MeshFormat::Tri10);
        assert_eq!(
            MeshFormat::from_string(".TRI10").unwrap(),
            MeshFormat::Tri10
        );

        assert!(MeshFormat::from_string("stl").is_err());
        assert!(MeshFormat::from_string("foo").is_err());
    }

    #[test]
    fn test_format_from_path() {
        use std::path::PathBuf;
        assert_eq!(
            MeshFormat::from_path(&PathBuf::from("/tmp/model.obj")).unwrap(),
            MeshFormat::Obj
        );
        assert_eq!(
            MeshFormat::from_path(&PathBuf::from("out.tri10")).unwrap(),
            MeshFormat::Tri10
        );
        assert!(MeshFormat::from_path(&PathBuf::from("no_extension")).is_err());
    }
}
