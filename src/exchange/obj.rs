/// obj.rs
/// -----------
/// Parse OBJ files into a Trimesh, keeping the per-corner texture
/// coordinates and per-face materials the simplifier carries through a
/// run, and write the result back out with 1-based indices.
use anyhow::{anyhow, Result};
use log::debug;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::attributes::Attributes;
use crate::mesh::Trimesh;

/// The intermediate representation of a single line from an OBJ file.
///
/// These can be evaluated in parallel as they are independent of each
/// other.
#[derive(Debug, PartialEq)]
enum ObjLine {
    // A vertex position
    V(Point3<f64>),
    // A vertex UV texture coordinate, with the optional w component
    Vt(Vector3<f64>),
    // An OBJ face: any number of corners, each corner holding
    // vertex / texture / normal indices with the missing ones None
    F(Vec<Vec<Option<usize>>>),
    // A usemtl command
    UseMtl(String),
    // A mtllib command naming the material library
    MtlLib(String),
    // Something we don't care about
    Ignore,
}

impl ObjLine {
    /// Parse a single raw OBJ line into native types.
    fn from_line(line: &str) -> Result<Self> {
        // ignore anything after a comment then cleanly split
        let parts: Vec<&str> = line
            .split('#')
            .next()
            .unwrap_or_default()
            .split_whitespace()
            .collect();

        let number = |s: &str| -> Result<f64> {
            s.parse()
                .map_err(|_| anyhow!("could not parse `{}` in line `{}`", s, line.trim_end()))
        };

        Ok(match parts.as_slice() {
            ["v", x, y, z, _extra @ ..] => {
                ObjLine::V(Point3::new(number(x)?, number(y)?, number(z)?))
            }
            ["vt", u, v] => ObjLine::Vt(Vector3::new(number(u)?, number(v)?, 0.0)),
            ["vt", u, v, w, ..] => ObjLine::Vt(Vector3::new(number(u)?, number(v)?, number(w)?)),
            ["usemtl", name @ ..] => ObjLine::UseMtl(name.join(" ")),
            ["mtllib", name @ ..] => ObjLine::MtlLib(name.join(" ")),
            ["f", blob @ ..] => {
                // this way of parsing supports corner references like
                // 1/2/3, 1//3, 1/2, 1 and will return None for any
                // missing values
                if blob.len() < 3 {
                    return Err(anyhow!("face with fewer than 3 corners: `{}`", line));
                }
                ObjLine::F(
                    blob.iter()
                        .map(|f| f.split('/').map(|s| s.parse::<usize>().ok()).collect())
                        .collect(),
                )
            }
            _ => ObjLine::Ignore,
        })
    }
}

/// Parse OBJ data into a mesh.
pub fn load_obj(data: &str, progress_lines: usize) -> Result<Trimesh> {
    // parse the independent lines in parallel
    let lines: Vec<Result<ObjLine>> = data
        .lines()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(ObjLine::from_line)
        .collect();

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut uvs: Vec<Vector3<f64>> = Vec::new();

    let mut faces: Vec<(usize, usize, usize)> = Vec::new();
    // per-face texture indices, present only when the corner had one
    let mut faces_uv: Vec<Option<[usize; 3]>> = Vec::new();
    let mut faces_material: Vec<Option<usize>> = Vec::new();

    let mut mtllib = None;
    let mut materials: Vec<String> = Vec::new();
    let mut material: Option<usize> = None;

    for (index, line) in lines.into_iter().enumerate() {
        match line? {
            ObjLine::V(p) => vertices.push(p),
            ObjLine::Vt(uv) => uvs.push(uv),
            ObjLine::F(raw) => {
                // fan-triangulate anything beyond a triangle
                for (a, b, c) in (1..raw.len() - 1).map(|i| (0, i, i + 1)) {
                    let corner = |k: usize| -> Result<(usize, Option<usize>)> {
                        let vertex = raw[k]
                            .first()
                            .copied()
                            .flatten()
                            .and_then(|i| i.checked_sub(1))
                            .ok_or_else(|| anyhow!("face corner without a vertex index"))?;
                        // texture index is the second of vertex/texture/normal
                        let uv = raw[k].get(1).copied().flatten().and_then(|i| i.checked_sub(1));
                        Ok((vertex, uv))
                    };
                    let (v0, t0) = corner(a)?;
                    let (v1, t1) = corner(b)?;
                    let (v2, t2) = corner(c)?;
                    faces.push((v0, v1, v2));
                    faces_uv.push(match (t0, t1, t2) {
                        (Some(t0), Some(t1), Some(t2)) => Some([t0, t1, t2]),
                        _ => None,
                    });
                    faces_material.push(material);
                }
            }
            ObjLine::UseMtl(name) => {
                // reuse the index if the material was already seen
                material = Some(match materials.iter().position(|m| *m == name) {
                    Some(existing) => existing,
                    None => {
                        materials.push(name);
                        materials.len() - 1
                    }
                });
            }
            ObjLine::MtlLib(name) => mtllib = Some(name),
            ObjLine::Ignore => (),
        }
        if (index + 1) % progress_lines.max(1) == 0 {
            debug!("obj lines read: {}", index + 1);
        }
    }

    // everything is parsed: check the indices actually resolve
    for &(a, b, c) in faces.iter() {
        if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
            return Err(anyhow!(
                "face references vertex beyond the {} loaded",
                vertices.len()
            ));
        }
    }

    // per-corner UVs are kept only when every face carried a full triplet
    let uv = if !faces_uv.is_empty() && faces_uv.iter().all(|u| u.is_some()) {
        let mut resolved = Vec::with_capacity(faces_uv.len());
        for indices in faces_uv.iter().flatten() {
            let mut corners = [Vector3::zeros(); 3];
            for (slot, &i) in corners.iter_mut().zip(indices.iter()) {
                *slot = *uvs
                    .get(i)
                    .ok_or_else(|| anyhow!("face references texture coordinate {} of {}", i, uvs.len()))?;
            }
            resolved.push(corners);
        }
        Some(resolved)
    } else {
        None
    };

    let mut mesh = Trimesh::new(
        vertices,
        faces,
        Some(Attributes {
            uv,
            material: faces_material,
        }),
    )?;
    mesh.source.mtllib = mtllib;
    mesh.source.materials = materials;
    Ok(mesh)
}

/// Serialize a mesh as OBJ: the material library line, vertices, the
/// per-corner texture coordinates, then faces with a `usemtl` whenever
/// the material changes.
pub fn write_obj(mesh: &Trimesh) -> String {
    let mut out = String::new();

    if let Some(mtllib) = &mesh.source.mtllib {
        out.push_str(&format!("mtllib {}\n", mtllib));
    }

    for v in mesh.vertices.iter() {
        out.push_str(&format!("v {:.6} {:.6} {:.6}\n", v.x, v.y, v.z));
    }

    let uv = mesh.attributes_face.uv.as_ref();
    if let Some(uv) = uv {
        for corners in uv.iter() {
            for c in corners.iter() {
                out.push_str(&format!("vt {:.6} {:.6}\n", c.x, c.y));
            }
        }
    }

    let mut current_material: Option<usize> = None;
    let mut uv_index = 1;
    for (i, &(a, b, c)) in mesh.faces.iter().enumerate() {
        let material = mesh.attributes_face.material.get(i).copied().flatten();
        if material != current_material {
            if let Some(name) = material.and_then(|m| mesh.source.materials.get(m)) {
                out.push_str(&format!("usemtl {}\n", name));
            }
            current_material = material;
        }
        if uv.is_some() {
            out.push_str(&format!(
                "f {}/{} {}/{} {}/{}\n",
                a + 1,
                uv_index,
                b + 1,
                uv_index + 1,
                c + 1,
                uv_index + 2
            ));
            uv_index += 3;
        } else {
            out.push_str(&format!("f {} {} {}\n", a + 1, b + 1, c + 1));
        }
    }

    out
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::exchange::DEFAULT_PROGRESS_LINES;
    use approx::assert_relative_eq;

    const QUAD_CUBE: &str = "\
# a cube of quads
o cube
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
v 0 0 1
v 1 0 1
v 1 1 1
v 0 1 1
f 1 2 3 4
f 8 7 6 5
f 1 5 6 2
f 2 6 7 3
f 3 7 8 4
f 5 1 4 8
";

    #[test]
    fn test_face_forms() {
        // all four corner reference styles resolve to the same triangle
        for line in [
            "f 1 2 3",
            "f 1// 2// 3//",
            "f 1//4 2//5 3//6",
            "f 1/1/4 2/2/5 3/3/6",
        ] {
            let parsed = ObjLine::from_line(line).unwrap();
            match parsed {
                ObjLine::F(raw) => {
                    assert_eq!(raw.len(), 3);
                    assert_eq!(raw[0][0], Some(1));
                    assert_eq!(raw[1][0], Some(2));
                    assert_eq!(raw[2][0], Some(3));
                }
                other => panic!("expected a face, got {:?}", other),
            }
        }

        assert_eq!(ObjLine::from_line("vn 0 0 1").unwrap(), ObjLine::Ignore);
        assert_eq!(ObjLine::from_line("s off").unwrap(), ObjLine::Ignore);
        assert!(ObjLine::from_line("v 1 2 banana").is_err());
    }

    #[test]
    fn test_load_quads() {
        let mesh = load_obj(QUAD_CUBE, DEFAULT_PROGRESS_LINES).unwrap();
        assert_eq!(mesh.vertices.len(), 8);
        // six quads fan into twelve triangles
        assert_eq!(mesh.faces.len(), 12);
        assert!(mesh.attributes_face.uv.is_none());
    }

    #[test]
    fn test_round_trip_geometry() {
        let mesh = load_obj(QUAD_CUBE, DEFAULT_PROGRESS_LINES).unwrap();
        let text = write_obj(&mesh);
        let back = load_obj(&text, DEFAULT_PROGRESS_LINES).unwrap();

        assert_eq!(back.vertices.len(), mesh.vertices.len());
        assert_eq!(back.faces, mesh.faces);
        for (a, b) in back.vertices.iter().zip(mesh.vertices.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_materials_and_uv() {
        let data = "\
mtllib things.mtl
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0
vt 0 0
vt 1 0
vt 0 1
vt 1 1
usemtl shiny
f 1/1/1 2/2/1 3/3/1
usemtl matte
f 2/2/1 4/4/1 3/3/1
";
        let mesh = load_obj(data, DEFAULT_PROGRESS_LINES).unwrap();
        assert_eq!(mesh.source.mtllib.as_deref(), Some("things.mtl"));
        assert_eq!(mesh.source.materials, vec!["shiny", "matte"]);
        assert_eq!(mesh.attributes_face.material, vec![Some(0), Some(1)]);

        let uv = mesh.attributes_face.uv.as_ref().unwrap();
        assert_eq!(uv.len(), 2);
        assert_relative_eq!(uv[0][1].x, 1.0);
        assert_relative_eq!(uv[1][1].y, 1.0);

        // the writer keeps the material switches and the uv references
        let text = write_obj(&mesh);
        assert!(text.starts_with("mtllib things.mtl\n"));
        assert!(text.contains("usemtl shiny\nf 1/1 2/2 3/3\n"));
        assert!(text.contains("usemtl matte\nf 2/4 4/5 3/6\n"));

        let back = load_obj(&text, DEFAULT_PROGRESS_LINES).unwrap();
        assert_eq!(back.faces, mesh.faces);
        assert_eq!(back.attributes_face.material, mesh.attributes_face.material);
        assert!(back.attributes_face.uv.is_some());
    }

    #[test]
    fn test_bad_face_index() {
        let data = "v 0 0 0\nv 1 0 0\nf 1 2 3\n";
        assert!(load_obj(data, DEFAULT_PROGRESS_LINES).is_err());
    }
}
