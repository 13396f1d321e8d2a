/// tri.rs
/// -----------
/// The tri9/tri10 triangle-soup formats: one triangle per line as nine
/// coordinates, tri10 with a trailing quality number that is ignored on
/// load and written as zero. Files come in two column layouts (free
/// whitespace separation or fixed 12-character columns) and may start
/// with a `count factor` header; the loader probes for all of that.
///
/// Because every line repeats its three corner positions, loading has to
/// merge duplicate vertices before the simplifier can see shared edges.
use ahash::AHashMap;
use anyhow::{bail, Result};
use log::{debug, info, warn};
use nalgebra::Point3;

use crate::mesh::Trimesh;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Columns {
    // whitespace separated numbers
    Free,
    // fixed 12-character columns, possibly with no separators at all
    Fixed,
}

// how many lines to try before giving up on detecting the layout
const PROBE_LINES: usize = 100;

fn free_numbers(line: &str) -> Vec<f64> {
    line.split_whitespace()
        .map_while(|token| token.parse::<f64>().ok())
        .collect()
}

fn fixed_numbers(line: &str) -> Vec<f64> {
    if !line.is_ascii() {
        return Vec::new();
    }
    line.as_bytes()
        .chunks(12)
        .map_while(|chunk| {
            std::str::from_utf8(chunk)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
        })
        .collect()
}

/// Merges positions that agree within a per-coordinate tolerance.
///
/// The table hashes quantized coordinates, so a hit is re-verified
/// against the stored position; if verification fails the surviving
/// table is scanned linearly, and as a last resort the vertex is
/// appended anyway.
#[derive(Default)]
struct VertexMerger {
    vertices: Vec<Point3<f64>>,
    table: AHashMap<[i64; 3], usize>,
    fallbacks: usize,
}

impl VertexMerger {
    const EPS: f64 = 1e-7;

    fn key(p: &Point3<f64>) -> [i64; 3] {
        [
            (p.x / Self::EPS).round() as i64,
            (p.y / Self::EPS).round() as i64,
            (p.z / Self::EPS).round() as i64,
        ]
    }

    fn close(a: &Point3<f64>, b: &Point3<f64>) -> bool {
        (a.x - b.x).abs() <= Self::EPS
            && (a.y - b.y).abs() <= Self::EPS
            && (a.z - b.z).abs() <= Self::EPS
    }

    fn insert(&mut self, p: Point3<f64>) -> usize {
        let key = Self::key(&p);
        if let Some(&index) = self.table.get(&key) {
            if Self::close(&self.vertices[index], &p) {
                return index;
            }
            self.fallbacks += 1;
            if let Some(found) = self.vertices.iter().position(|q| Self::close(q, &p)) {
                return found;
            }
            self.vertices.push(p);
            return self.vertices.len() - 1;
        }
        self.vertices.push(p);
        self.table.insert(key, self.vertices.len() - 1);
        self.vertices.len() - 1
    }
}

/// Parse tri9/tri10 data into a mesh with duplicate vertices merged.
pub fn load_tri(data: &str, progress_lines: usize) -> Result<Trimesh> {
    let lines: Vec<&str> = data.lines().collect();

    let mut start = 0;
    while start < lines.len() && lines[start].trim().is_empty() {
        start += 1;
    }

    // a two-number `count factor` header is consumed and ignored
    if start < lines.len() {
        let numbers = free_numbers(lines[start]);
        if numbers.len() == 2 {
            debug!(
                "tri header: {} polygons, magnification {} (ignored)",
                numbers[0], numbers[1]
            );
            start += 1;
        }
    }

    // probe for the column layout
    let mut columns = None;
    for line in lines[start..].iter().take(PROBE_LINES) {
        if free_numbers(line).len() >= 9 {
            columns = Some(Columns::Free);
            break;
        }
        if fixed_numbers(line).len() >= 9 {
            columns = Some(Columns::Fixed);
            break;
        }
    }
    let Some(columns) = columns else {
        bail!("Could not read file. Should be whitespace delimited or 12 character columns.");
    };

    let mut merger = VertexMerger::default();
    let mut faces: Vec<(usize, usize, usize)> = Vec::new();
    let mut degenerate = 0usize;

    for line in lines[start..].iter() {
        let numbers = match columns {
            Columns::Free => free_numbers(line),
            Columns::Fixed => fixed_numbers(line),
        };
        // nine coordinates; the tenth quality column is ignored
        if numbers.len() < 9 {
            continue;
        }
        let a = merger.insert(Point3::new(numbers[0], numbers[1], numbers[2]));
        let b = merger.insert(Point3::new(numbers[3], numbers[4], numbers[5]));
        let c = merger.insert(Point3::new(numbers[6], numbers[7], numbers[8]));
        if a == b || b == c || a == c {
            degenerate += 1;
        }
        faces.push((a, b, c));

        if faces.len() % progress_lines.max(1) == 0 {
            debug!("tri lines read: {}", faces.len());
        }
    }

    if faces.is_empty() {
        bail!("Could not read file. Should be whitespace delimited or 12 character columns.");
    }
    if merger.fallbacks > 0 {
        debug!("vertices re-verified past the hash table: {}", merger.fallbacks);
    }
    if degenerate > 0 {
        warn!("triangles with duplicate vertices: {}", degenerate);
    }
    info!(
        "read {} triangles, merged {} corner vertices into {}",
        faces.len(),
        faces.len() * 3,
        merger.vertices.len()
    );

    Trimesh::new(merger.vertices, faces, None)
}

/// Serialize a mesh as tri9 or tri10 in fixed 15-character columns;
/// the tri10 quality is always written as zero.
pub fn write_tri(mesh: &Trimesh, with_quality: bool) -> String {
    let mut out = String::new();
    for &(a, b, c) in mesh.faces.iter() {
        for &vi in [a, b, c].iter() {
            let p = mesh.vertices[vi];
            out.push_str(&format!(" {:>15.6} {:>15.6} {:>15.6}", p.x, p.y, p.z));
        }
        if with_quality {
            out.push_str(&format!(" {:>15.6}", 0.0));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::creation::create_box;
    use crate::exchange::DEFAULT_PROGRESS_LINES;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_tri10_round_trip() {
        let cube = create_box(&[1.0, 1.0, 1.0]);

        let text = write_tri(&cube, true);
        assert_eq!(text.lines().count(), 12);
        // ten numbers per line, quality last and zero
        let first = free_numbers(text.lines().next().unwrap());
        assert_eq!(first.len(), 10);
        assert_eq!(first[9], 0.0);

        let back = load_tri(&text, DEFAULT_PROGRESS_LINES).unwrap();
        // the soup's 36 corners merge back down to the cube's corners
        assert_eq!(back.vertices.len(), 8);
        assert_eq!(back.faces.len(), 12);
        for &(a, b, c) in back.faces.iter() {
            assert!(a != b && b != c && a != c);
        }
    }

    #[test]
    fn test_tri9_and_header() {
        let cube = create_box(&[2.0, 2.0, 2.0]);
        let body = write_tri(&cube, false);
        assert_eq!(free_numbers(body.lines().next().unwrap()).len(), 9);

        // the same data behind a `count factor` header
        let with_header = format!("12 1.0\n{}", body);
        for data in [body.as_str(), with_header.as_str()] {
            let mesh = load_tri(data, DEFAULT_PROGRESS_LINES).unwrap();
            assert_eq!(mesh.vertices.len(), 8);
            assert_eq!(mesh.faces.len(), 12);
        }
    }

    #[test]
    fn test_fixed_columns() {
        // 12-character columns that leave no separators at all
        let value = -1234.567890f64;
        let column = format!("{:>12.6}", value);
        assert_eq!(column.len(), 12);
        let line: String = std::iter::repeat(column).take(9).collect();

        assert!(free_numbers(&line).is_empty());
        let numbers = fixed_numbers(&line);
        assert_eq!(numbers.len(), 9);
        assert_relative_eq!(numbers[0], value, epsilon = 1e-9);

        // a degenerate single-point triangle still loads (with a warning)
        let mesh = load_tri(&line, DEFAULT_PROGRESS_LINES).unwrap();
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.vertices.len(), 1);
    }

    #[test]
    fn test_dedup_tolerance() {
        // the second triangle's shared corners differ by far less than
        // the merge tolerance and must collapse onto the first's
        let data = "\
0 0 0  1 0 0  0 1 0
1.00000000001 0 0  0 0.99999999999 0  1 1 0
";
        let mesh = load_tri(data, DEFAULT_PROGRESS_LINES).unwrap();
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.vertices.len(), 4);

        // clearly separate positions stay separate
        let data = "\
0 0 0  1 0 0  0 1 0
1.001 0 0  0 0.999 0  1 1 0
";
        let mesh = load_tri(data, DEFAULT_PROGRESS_LINES).unwrap();
        assert_eq!(mesh.vertices.len(), 6);
    }

    #[test]
    fn test_unreadable_data() {
        assert!(load_tri("not a mesh at all\n", DEFAULT_PROGRESS_LINES).is_err());
        assert!(load_tri("", DEFAULT_PROGRESS_LINES).is_err());
    }
}
