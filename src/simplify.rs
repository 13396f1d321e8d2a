//! Iterative edge-collapse simplification driven by a quadric error
//! metric, with optional spatially-weighted thresholds and region-locked
//! reduction.
//!
//! The engine owns three flat tables: vertices, triangles, and a derived
//! reference table mapping each vertex to a contiguous run of
//! (triangle, corner) pairs. Triangle and vertex ids are stable across a
//! sweep but not across the final compaction, so everything indexes into
//! the tables rather than holding references.

use ahash::AHashMap;
use anyhow::{bail, Result};
use log::{debug, info};
use nalgebra::{Point3, Vector3};

use crate::attributes::{Attributes, LoadSource};
use crate::kernel::Kernel;
use crate::mesh::Trimesh;
use crate::quadric::SymmetricQuadric;
use crate::region::Region;

/// Triangle attribute bit: per-corner texture coordinates are present.
pub const ATTR_TEXCOORD: u32 = 1 << 2;

#[derive(Debug, Clone)]
struct Vertex {
    p: Point3<f64>,
    // the contiguous window of this vertex's corners in `refs`
    tstart: usize,
    tcount: usize,
    q: SymmetricQuadric,
    border: bool,
}

#[derive(Debug, Clone)]
struct Triangle {
    v: [usize; 3],
    // per-edge errors for edges (0,1), (1,2), (2,0) plus their minimum
    err: [f64; 4],
    deleted: bool,
    // set when a collapse touched this triangle this sweep
    dirty: bool,
    attr: u32,
    n: Vector3<f64>,
    uvs: [Vector3<f64>; 3],
    material: Option<usize>,
}

// One corner: triangle id plus which of its three slots points back at
// the owning vertex.
#[derive(Debug, Clone, Copy)]
struct Ref {
    tid: usize,
    tvertex: usize,
}

/// How the per-triangle threshold is weighted and when the loop may stop.
#[derive(Debug, Clone, Default)]
pub enum WeightingMode {
    /// One threshold for the whole mesh (still attenuated by
    /// [`SimplifyOptions::kernel`] when that is not constant).
    #[default]
    Uniform,

    /// A single bound region around [`SimplifyOptions::center`]: the
    /// inside must reach `region_ratio`, after which it is locked and
    /// the outside continues down to `outside_ratio`.
    BoundRegion {
        region_ratio: f64,
        outside_ratio: f64,
    },

    /// Any number of weighting centers, each with its own kernel and
    /// target ratio; bound regions defer the stop conditions until
    /// their ratios are met.
    MultiCenter(Vec<Region>),
}

#[derive(Debug, Clone)]
pub struct SimplifyOptions {
    /// Stop once this many triangles remain.
    pub target_count: usize,
    /// Exponent of the threshold schedule; 5 to 8 are good values,
    /// higher is faster and rougher.
    pub aggressiveness: f64,
    /// Spatial weighting for the uniform and single-region modes.
    pub kernel: Kernel,
    pub center: Point3<f64>,
    pub radius: f64,
    pub scale: f64,
    pub power: f64,
    pub negate: bool,
    pub mode: WeightingMode,
    /// Abort after this many consecutive sweeps without a deletion.
    pub stall_limit: usize,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        SimplifyOptions {
            target_count: 0,
            aggressiveness: 7.0,
            kernel: Kernel::Constant,
            center: Point3::origin(),
            radius: 1.0,
            scale: 1.0,
            power: 1.0,
            negate: false,
            mode: WeightingMode::Uniform,
            stall_limit: 1000,
        }
    }
}

/// The base error threshold admitted at iteration `k`:
/// `1e-9 * (k + 3)^aggressiveness`.
pub fn iteration_threshold(iteration: usize, aggressiveness: f64) -> f64 {
    1e-9 * (iteration as f64 + 3.0).powf(aggressiveness)
}

pub struct Simplifier {
    vertices: Vec<Vertex>,
    triangles: Vec<Triangle>,
    refs: Vec<Ref>,
    source: LoadSource,
}

impl Simplifier {
    pub fn from_mesh(mesh: &Trimesh) -> Self {
        let vertices = mesh
            .vertices
            .iter()
            .map(|&p| Vertex {
                p,
                tstart: 0,
                tcount: 0,
                q: SymmetricQuadric::zero(),
                border: false,
            })
            .collect();

        let uv = mesh.attributes_face.uv.as_ref();
        let triangles = mesh
            .faces
            .iter()
            .enumerate()
            .map(|(i, &(v0, v1, v2))| Triangle {
                v: [v0, v1, v2],
                err: [0.0; 4],
                deleted: false,
                dirty: false,
                attr: if uv.is_some() { ATTR_TEXCOORD } else { 0 },
                n: Vector3::zeros(),
                uvs: uv.map(|uv| uv[i]).unwrap_or([Vector3::zeros(); 3]),
                material: mesh.attributes_face.material.get(i).copied().flatten(),
            })
            .collect();

        Simplifier {
            vertices,
            triangles,
            refs: Vec::new(),
            source: mesh.source.clone(),
        }
    }

    pub fn into_mesh(self) -> Trimesh {
        let mut attributes = Attributes {
            material: self.triangles.iter().map(|t| t.material).collect(),
            ..Default::default()
        };
        if !self.triangles.is_empty() && self.triangles.iter().all(|t| t.attr & ATTR_TEXCOORD != 0)
        {
            attributes.uv = Some(self.triangles.iter().map(|t| t.uvs).collect());
        }

        Trimesh {
            vertices: self.vertices.iter().map(|v| v.p).collect(),
            faces: self
                .triangles
                .iter()
                .map(|t| (t.v[0], t.v[1], t.v[2]))
                .collect(),
            attributes_face: attributes,
            source: self.source,
            ..Default::default()
        }
    }

    /// Run the simplification loop until the target triangle count, the
    /// region stop conditions, or the no-progress limit is reached, then
    /// compact the tables.
    pub fn simplify(&mut self, options: &SimplifyOptions) -> Result<()> {
        if options.target_count < 4 {
            bail!("Object will not survive such extreme decimation");
        }

        for t in self.triangles.iter_mut() {
            t.deleted = false;
        }

        let triangle_count = self.triangles.len();
        let mut deleted_triangles = 0usize;

        // region bookkeeping: the single -T region uses the options'
        // center and radius, multi-center regions carry their own
        let mut regions: Vec<Region> = Vec::new();
        let mut single: Option<(f64, f64)> = None;
        match &options.mode {
            WeightingMode::Uniform => {}
            WeightingMode::BoundRegion {
                region_ratio,
                outside_ratio,
            } => single = Some((*region_ratio, *outside_ratio)),
            WeightingMode::MultiCenter(configured) => {
                regions = configured.clone();
                for region in regions.iter_mut() {
                    region.start_count = self.count_in_region(&region.center, region.radius);
                    region.end_count = region.start_count;
                    region.done = region.start_count == 0;
                }
            }
        }
        let any_bound = regions.iter().any(|r| r.bound);

        let initial_region_count =
            single.map(|_| self.count_in_region(&options.center, options.radius));
        let mut region_done = initial_region_count == Some(0);

        // the schedule needs room to open up even on tiny meshes
        let max_iterations = triangle_count.max(100);
        let mut stalled = 0usize;
        let mut deleted0: Vec<bool> = Vec::new();
        let mut deleted1: Vec<bool> = Vec::new();

        for iteration in 0..max_iterations {
            let deleted_before = deleted_triangles;

            // a bound region defers the global stop until its ratio is met
            let bound_pending = (single.is_some() && !region_done)
                || regions.iter().any(|r| r.bound && !r.done);
            if triangle_count - deleted_triangles <= options.target_count && !bound_pending {
                break;
            }

            if let (Some((region_ratio, _)), Some(initial)) = (single, initial_region_count) {
                let count = self.count_in_region(&options.center, options.radius);
                if !region_done && initial > 0 && count as f64 / initial as f64 <= region_ratio {
                    info!(
                        "region done: {} of {} triangles remain inside",
                        count, initial
                    );
                    region_done = true;
                }
            }

            if iteration % 5 == 0 {
                self.update_mesh(iteration);
            }

            for t in self.triangles.iter_mut() {
                t.dirty = false;
            }

            let threshold0 = iteration_threshold(iteration, options.aggressiveness);
            if iteration % 5 == 0 {
                debug!(
                    "iteration {} - triangles {} threshold {:.3e}",
                    iteration,
                    triangle_count - deleted_triangles,
                    threshold0
                );
            }

            for tid in 0..self.triangles.len() {
                if self.triangles[tid].deleted || self.triangles[tid].dirty {
                    continue;
                }

                let threshold = self.triangle_threshold(
                    tid,
                    threshold0,
                    options,
                    &regions,
                    any_bound,
                    region_done,
                );
                if self.triangles[tid].err[3] > threshold {
                    continue;
                }

                for j in 0..3 {
                    if self.triangles[tid].err[j] >= threshold {
                        continue;
                    }
                    let i0 = self.triangles[tid].v[j];
                    let i1 = self.triangles[tid].v[(j + 1) % 3];

                    // a boundary vertex may only merge with another
                    // boundary vertex
                    if self.vertices[i0].border != self.vertices[i1].border {
                        continue;
                    }

                    let (_, p) = self.calculate_error(i0, i1);

                    deleted0.clear();
                    deleted0.resize(self.vertices[i0].tcount, false);
                    deleted1.clear();
                    deleted1.resize(self.vertices[i1].tcount, false);

                    // run the fold-over check from both endpoints
                    if self.flipped(&p, i0, i1, &mut deleted0) {
                        continue;
                    }
                    if self.flipped(&p, i1, i0, &mut deleted1) {
                        continue;
                    }

                    if self.triangles[tid].attr & ATTR_TEXCOORD != 0 {
                        self.update_uvs(&p, i0, &deleted0);
                        self.update_uvs(&p, i1, &deleted1);
                    }

                    // not flipped, so contract the edge onto the optimum
                    self.vertices[i0].p = p;
                    let q1 = self.vertices[i1].q;
                    self.vertices[i0].q += q1;

                    let tail = self.refs.len();
                    self.update_triangles(i0, i0, &deleted0, &mut deleted_triangles);
                    self.update_triangles(i0, i1, &deleted1, &mut deleted_triangles);
                    let tcount = self.refs.len() - tail;

                    if tcount <= self.vertices[i0].tcount {
                        // the merged run fits inside the old window
                        if tcount > 0 {
                            let tstart = self.vertices[i0].tstart;
                            self.refs.copy_within(tail..tail + tcount, tstart);
                        }
                        self.refs.truncate(tail);
                    } else {
                        // otherwise the run at the tail becomes the window
                        self.vertices[i0].tstart = tail;
                    }
                    self.vertices[i0].tcount = tcount;
                    break;
                }

                // stop collapsing the moment the target is reached so the
                // final count stays within one collapse of it
                if triangle_count - deleted_triangles <= options.target_count && !bound_pending {
                    break;
                }
            }

            if deleted_triangles == deleted_before {
                stalled += 1;
                if stalled >= options.stall_limit {
                    info!("no triangles deleted for {} iterations, stopping", stalled);
                    break;
                }
            } else {
                stalled = 0;
            }

            // single-region accounting: once the inside target is met the
            // run continues until the outside ratio catches up
            if let (Some((_, outside_ratio)), Some(initial)) = (single, initial_region_count) {
                if region_done {
                    let count = self.count_in_region(&options.center, options.radius);
                    let current_total = triangle_count - deleted_triangles;
                    let initial_outside = triangle_count - initial;
                    let current_outside = current_total.saturating_sub(count);
                    if initial_outside > 0
                        && current_outside as f64 / initial_outside as f64 <= outside_ratio
                    {
                        break;
                    }
                }
            }

            // multi-center accounting
            if !regions.is_empty() {
                let mut all_done = true;
                for i in 0..regions.len() {
                    if !regions[i].done {
                        let count = self.count_in_region(&regions[i].center, regions[i].radius);
                        regions[i].end_count = count;
                        regions[i].done = regions[i].start_count > 0
                            && count as f64 / regions[i].start_count as f64
                                <= regions[i].target_ratio;
                    }
                    all_done = all_done && regions[i].done;
                }
                if all_done {
                    debug!("all weighting regions reached their ratios");
                    break;
                }
            }
        }

        self.compact_mesh();
        info!(
            "simplified to {} triangles, {} vertices",
            self.triangles.len(),
            self.vertices.len()
        );
        Ok(())
    }

    /// The weighted threshold for one triangle, evaluated at its first
    /// vertex like every other spatial lookup in the loop.
    fn triangle_threshold(
        &self,
        tid: usize,
        threshold0: f64,
        options: &SimplifyOptions,
        regions: &[Region],
        any_bound: bool,
        region_done: bool,
    ) -> f64 {
        let p = self.vertices[self.triangles[tid].v[0]].p;

        if !regions.is_empty() {
            // multiple centers: every region contributes its weighting;
            // a bound setup adds each region's square mask, which can
            // lock a triangle outright
            let mut threshold = threshold0;
            for region in regions {
                if any_bound {
                    let mask = Kernel::Square.evaluate(
                        &p,
                        &region.center,
                        region.radius,
                        region.scale,
                        region.negate,
                    );
                    if mask == 0.0 {
                        return 0.0;
                    }
                    threshold *= mask;
                }
                threshold *= region
                    .kernel
                    .evaluate(
                        &p,
                        &region.center,
                        region.radius,
                        region.scale,
                        region.negate,
                    )
                    .powf(region.power);
            }
            return threshold;
        }

        if region_done {
            // the single bound region is locked; the outside is still
            // masked off toward the region's rim
            if self.in_region(tid, &options.center, options.radius) {
                return 0.0;
            }
            let mask = Kernel::Square.evaluate(&p, &options.center, options.radius, 1.0, false);
            if options.kernel != Kernel::Constant {
                if mask.abs() <= 1e-9 {
                    return 0.0;
                }
                return threshold0
                    * options
                        .kernel
                        .evaluate(
                            &p,
                            &options.center,
                            options.radius,
                            options.scale,
                            options.negate,
                        )
                        .powf(options.power)
                    * mask;
            }
            return threshold0 * mask;
        }

        if options.kernel != Kernel::Constant {
            return threshold0
                * options
                    .kernel
                    .evaluate(
                        &p,
                        &options.center,
                        options.radius,
                        options.scale,
                        options.negate,
                    )
                    .powf(options.power);
        }
        threshold0
    }

    /// A triangle is in-region when all three of its vertices lie within
    /// `radius` of the center.
    fn in_region(&self, tid: usize, center: &Point3<f64>, radius: f64) -> bool {
        self.triangles[tid]
            .v
            .iter()
            .all(|&vi| (self.vertices[vi].p - center).norm_squared() <= radius * radius)
    }

    fn count_in_region(&self, center: &Point3<f64>, radius: f64) -> usize {
        (0..self.triangles.len())
            .filter(|&tid| !self.triangles[tid].deleted && self.in_region(tid, center, radius))
            .count()
    }

    /// The error of contracting the edge (id_v1, id_v2) and the optimal
    /// contraction point. When the 3x3 block is invertible and neither
    /// endpoint is on a boundary the closed-form optimum is used,
    /// otherwise the best of the endpoints and midpoint.
    fn calculate_error(&self, id_v1: usize, id_v2: usize) -> (f64, Point3<f64>) {
        let q = self.vertices[id_v1].q + self.vertices[id_v2].q;
        let border = self.vertices[id_v1].border && self.vertices[id_v2].border;
        let det = q.det(0, 1, 2, 1, 4, 5, 2, 5, 7);

        if det.abs() > 1e-15 && !border {
            let p = Point3::new(
                -1.0 / det * q.det(1, 2, 3, 4, 5, 6, 5, 7, 8),
                1.0 / det * q.det(0, 2, 3, 1, 5, 6, 2, 7, 8),
                -1.0 / det * q.det(0, 1, 3, 1, 4, 6, 2, 5, 8),
            );
            (q.vertex_error(&p), p)
        } else {
            let p1 = self.vertices[id_v1].p;
            let p2 = self.vertices[id_v2].p;
            let p3 = Point3::from((p1.coords + p2.coords) / 2.0);
            let error1 = q.vertex_error(&p1);
            let error2 = q.vertex_error(&p2);
            let error3 = q.vertex_error(&p3);
            let error = error1.min(error2).min(error3);
            // ties resolve toward the midpoint
            let mut p = p1;
            if error2 == error {
                p = p2;
            }
            if error3 == error {
                p = p3;
            }
            (error, p)
        }
    }

    /// Would moving `i0` to `p` flip or degenerate any triangle around
    /// it? Triangles sharing the collapsing edge (i0, i1) are flagged in
    /// `deleted` instead; they vanish with the collapse.
    fn flipped(&self, p: &Point3<f64>, i0: usize, i1: usize, deleted: &mut [bool]) -> bool {
        let (tstart, tcount) = (self.vertices[i0].tstart, self.vertices[i0].tcount);
        for k in 0..tcount {
            let r = self.refs[tstart + k];
            let t = &self.triangles[r.tid];
            if t.deleted {
                continue;
            }

            let s = r.tvertex;
            let id1 = t.v[(s + 1) % 3];
            let id2 = t.v[(s + 2) % 3];

            if id1 == i1 || id2 == i1 {
                deleted[k] = true;
                continue;
            }

            let d1 = (self.vertices[id1].p - p)
                .try_normalize(0.0)
                .unwrap_or_else(Vector3::zeros);
            let d2 = (self.vertices[id2].p - p)
                .try_normalize(0.0)
                .unwrap_or_else(Vector3::zeros);
            // the two surviving edges would become collinear
            if d1.dot(&d2).abs() > 0.999 {
                return true;
            }
            let n = d1.cross(&d2).try_normalize(0.0).unwrap_or_else(Vector3::zeros);
            deleted[k] = false;
            // the triangle would fold over its current orientation
            if n.dot(&t.n) < 0.2 {
                return true;
            }
        }
        false
    }

    /// Barycentric reinterpolation of per-corner UVs for the surviving
    /// triangles around a collapsed vertex.
    fn update_uvs(&mut self, p: &Point3<f64>, v_idx: usize, deleted: &[bool]) {
        let (tstart, tcount) = (self.vertices[v_idx].tstart, self.vertices[v_idx].tcount);
        for k in 0..tcount {
            let r = self.refs[tstart + k];
            if self.triangles[r.tid].deleted || deleted[k] {
                continue;
            }
            let t = &self.triangles[r.tid];
            let p1 = self.vertices[t.v[0]].p;
            let p2 = self.vertices[t.v[1]].p;
            let p3 = self.vertices[t.v[2]].p;
            let uvs = t.uvs;
            self.triangles[r.tid].uvs[r.tvertex] = interpolate(p, &p1, &p2, &p3, &uvs);
        }
    }

    /// Rewrite the triangles around one endpoint of a collapsed edge:
    /// flagged triangles are deleted, the rest get their stale corner
    /// pointed at the survivor, fresh edge errors, and a new corner
    /// record appended at the tail of the reference table.
    fn update_triangles(
        &mut self,
        i0: usize,
        v_idx: usize,
        deleted: &[bool],
        deleted_triangles: &mut usize,
    ) {
        let (tstart, tcount) = (self.vertices[v_idx].tstart, self.vertices[v_idx].tcount);
        for k in 0..tcount {
            let r = self.refs[tstart + k];
            if self.triangles[r.tid].deleted {
                continue;
            }

            if deleted[k] {
                self.triangles[r.tid].deleted = true;
                *deleted_triangles += 1;
                continue;
            }

            self.triangles[r.tid].v[r.tvertex] = i0;
            self.triangles[r.tid].dirty = true;

            let tv = self.triangles[r.tid].v;
            let (err0, _) = self.calculate_error(tv[0], tv[1]);
            let (err1, _) = self.calculate_error(tv[1], tv[2]);
            let (err2, _) = self.calculate_error(tv[2], tv[0]);
            self.triangles[r.tid].err = [err0, err1, err2, err0.min(err1).min(err2)];
            self.refs.push(r);
        }
    }

    /// Compact triangles, rebuild the reference table, and on the first
    /// iteration initialize quadrics, edge errors, and boundary flags.
    fn update_mesh(&mut self, iteration: usize) {
        if iteration > 0 {
            self.triangles.retain(|t| !t.deleted);
        }

        // Init quadrics by plane and edge errors. Required on the first
        // iteration; recomputing during the run is not required but
        // mostly improves the result for closed meshes.
        if iteration == 0 {
            for v in self.vertices.iter_mut() {
                v.q = SymmetricQuadric::zero();
            }
            for tid in 0..self.triangles.len() {
                let tv = self.triangles[tid].v;
                let p0 = self.vertices[tv[0]].p;
                let p1 = self.vertices[tv[1]].p;
                let p2 = self.vertices[tv[2]].p;
                let n = (p1 - p0)
                    .cross(&(p2 - p0))
                    .try_normalize(0.0)
                    .unwrap_or_else(Vector3::zeros);
                self.triangles[tid].n = n;
                let plane = SymmetricQuadric::from_plane(n.x, n.y, n.z, -n.dot(&p0.coords));
                for &vi in tv.iter() {
                    self.vertices[vi].q += plane;
                }
            }
            for tid in 0..self.triangles.len() {
                let tv = self.triangles[tid].v;
                let mut err = [0.0; 4];
                for j in 0..3 {
                    err[j] = self.calculate_error(tv[j], tv[(j + 1) % 3]).0;
                }
                err[3] = err[0].min(err[1]).min(err[2]);
                self.triangles[tid].err = err;
            }
        }

        // rebuild the reference table: count, prefix-sum, write
        for v in self.vertices.iter_mut() {
            v.tstart = 0;
            v.tcount = 0;
        }
        for t in self.triangles.iter() {
            for &vi in t.v.iter() {
                self.vertices[vi].tcount += 1;
            }
        }
        let mut tstart = 0;
        for v in self.vertices.iter_mut() {
            v.tstart = tstart;
            tstart += v.tcount;
            v.tcount = 0;
        }
        self.refs.clear();
        self.refs.resize(tstart, Ref { tid: 0, tvertex: 0 });
        for tid in 0..self.triangles.len() {
            let tv = self.triangles[tid].v;
            for (tvertex, &vi) in tv.iter().enumerate() {
                let v = &mut self.vertices[vi];
                self.refs[v.tstart + v.tcount] = Ref { tid, tvertex };
                v.tcount += 1;
            }
        }

        // identify boundary vertices: an edge incident to exactly one
        // triangle makes both of its endpoints boundary
        if iteration == 0 {
            for v in self.vertices.iter_mut() {
                v.border = false;
            }
            let mut tally: AHashMap<usize, usize> = AHashMap::new();
            for i in 0..self.vertices.len() {
                tally.clear();
                let (tstart, tcount) = (self.vertices[i].tstart, self.vertices[i].tcount);
                for k in 0..tcount {
                    let tid = self.refs[tstart + k].tid;
                    for &vi in self.triangles[tid].v.iter() {
                        *tally.entry(vi).or_insert(0) += 1;
                    }
                }
                for (&vi, &count) in tally.iter() {
                    if count == 1 && vi != i {
                        self.vertices[vi].border = true;
                        self.vertices[i].border = true;
                    }
                }
            }
        }
    }

    /// Final compaction: drop deleted triangles, drop unreferenced
    /// vertices, and densely remap the surviving indices. Each
    /// survivor's new index rides along in its `tstart` slot.
    fn compact_mesh(&mut self) {
        for v in self.vertices.iter_mut() {
            v.tcount = 0;
        }

        let mut dst = 0;
        for i in 0..self.triangles.len() {
            if self.triangles[i].deleted {
                continue;
            }
            let t = self.triangles[i].clone();
            for &vi in t.v.iter() {
                self.vertices[vi].tcount = 1;
            }
            self.triangles[dst] = t;
            dst += 1;
        }
        self.triangles.truncate(dst);

        let mut dst = 0;
        for i in 0..self.vertices.len() {
            if self.vertices[i].tcount == 0 {
                continue;
            }
            self.vertices[i].tstart = dst;
            let p = self.vertices[i].p;
            self.vertices[dst].p = p;
            dst += 1;
        }
        for tid in 0..self.triangles.len() {
            for j in 0..3 {
                let vi = self.triangles[tid].v[j];
                self.triangles[tid].v[j] = self.vertices[vi].tstart;
            }
        }
        self.vertices.truncate(dst);
        self.refs.clear();
    }
}

fn barycentric(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Vector3<f64> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vector3::new(1.0 - v - w, v, w)
}

fn interpolate(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    attrs: &[Vector3<f64>; 3],
) -> Vector3<f64> {
    let bary = barycentric(p, a, b, c);
    attrs[0] * bary.x + attrs[1] * bary.y + attrs[2] * bary.z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creation::{create_box, create_icosphere, create_plane};
    use ahash::AHashMap;

    // every face references three distinct in-range vertices
    fn assert_index_integrity(mesh: &Trimesh) {
        for &(a, b, c) in mesh.faces.iter() {
            assert!(a < mesh.vertices.len());
            assert!(b < mesh.vertices.len());
            assert!(c < mesh.vertices.len());
            assert!(a != b && b != c && a != c);
        }
    }

    // number of edges with fewer than two incident faces
    fn boundary_edge_count(mesh: &Trimesh) -> usize {
        let mut counts: AHashMap<(usize, usize), usize> = AHashMap::new();
        for edge in mesh.edges() {
            let key = (edge[0].min(edge[1]), edge[0].max(edge[1]));
            *counts.entry(key).or_insert(0) += 1;
        }
        counts.values().filter(|&&c| c < 2).count()
    }

    #[test]
    fn test_threshold_schedule_monotone() {
        for &a in &[1.0, 3.0, 7.0] {
            for k in 0..200 {
                assert!(iteration_threshold(k + 1, a) > iteration_threshold(k, a));
            }
        }
    }

    #[test]
    fn test_refuses_extreme_decimation() {
        // a tetrahedron asked down to two triangles cannot survive
        let tetra = Trimesh::from_slice(
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
            ],
            &[0, 2, 1, 0, 1, 3, 1, 2, 3, 0, 3, 2],
        )
        .unwrap();

        let result = tetra.simplify(&SimplifyOptions {
            target_count: 2,
            ..Default::default()
        });
        let message = format!("{}", result.unwrap_err());
        assert!(message.contains("will not survive"));
    }

    #[test]
    fn test_simplify_cube() {
        let cube = create_box(&[1.0, 1.0, 1.0]);
        assert_eq!(boundary_edge_count(&cube), 0);

        let simplified = cube
            .simplify(&SimplifyOptions {
                target_count: 6,
                ..Default::default()
            })
            .unwrap();

        assert!(simplified.faces.len() <= 6);
        assert!(simplified.vertices.len() <= 8);
        assert_index_integrity(&simplified);
        // a closed surface stays closed
        assert_eq!(boundary_edge_count(&simplified), 0);
    }

    #[test]
    fn test_simplify_plane_grid() {
        let plane = create_plane(10, 10);
        assert_eq!(plane.faces.len(), 200);

        let simplified = plane
            .simplify(&SimplifyOptions {
                target_count: 20,
                aggressiveness: 7.0,
                ..Default::default()
            })
            .unwrap();

        assert!(
            simplified.faces.len() >= 18 && simplified.faces.len() <= 22,
            "got {} faces",
            simplified.faces.len()
        );
        assert_index_integrity(&simplified);

        // nothing degenerate and nothing inverted
        for area in simplified.faces_area() {
            assert!(area > 0.0);
        }
        for normal in simplified.face_normals() {
            assert!(normal.z >= 0.19, "inverted face, normal {:?}", normal);
        }
    }

    #[test]
    fn test_simplify_sphere_gaussian_preserves_center() {
        let sphere = create_icosphere(2);
        assert_eq!(sphere.faces.len(), 320);

        let center = Point3::new(0.0, 0.0, 1.0);
        let simplified = sphere
            .simplify(&SimplifyOptions {
                target_count: 80,
                kernel: Kernel::Gaussian,
                center,
                radius: 0.5,
                scale: 2.0,
                power: 3.0,
                negate: false,
                ..Default::default()
            })
            .unwrap();

        assert_index_integrity(&simplified);
        assert!(simplified.faces.len() <= sphere.faces.len());
        assert_eq!(boundary_edge_count(&simplified), 0);

        // triangle density per unit area near the protected pole should
        // be at least twice the density elsewhere
        let areas = simplified.faces_area();
        let (mut near_count, mut near_area) = (0usize, 0.0f64);
        let (mut far_count, mut far_area) = (0usize, 0.0f64);
        for (i, &(a, b, c)) in simplified.faces.iter().enumerate() {
            let centroid = Point3::from(
                (simplified.vertices[a].coords
                    + simplified.vertices[b].coords
                    + simplified.vertices[c].coords)
                    / 3.0,
            );
            if (centroid - center).norm() <= 0.5 {
                near_count += 1;
                near_area += areas[i];
            } else {
                far_count += 1;
                far_area += areas[i];
            }
        }
        assert!(near_count > 0 && far_count > 0);
        let near_density = near_count as f64 / near_area;
        let far_density = far_count as f64 / far_area;
        assert!(
            near_density > 2.0 * far_density,
            "near {:.1} vs far {:.1} triangles per unit area",
            near_density,
            far_density
        );
    }

    #[test]
    fn test_simplify_bound_region_plane() {
        let plane = create_plane(25, 20);
        assert_eq!(plane.faces.len(), 1000);

        let center = Point3::new(12.5, 10.0, 0.0);
        let radius = 5.7;

        // count faces with every vertex inside the ball, as the engine does
        let in_region = |mesh: &Trimesh| {
            mesh.faces
                .iter()
                .filter(|&&(a, b, c)| {
                    [a, b, c]
                        .iter()
                        .all(|&vi| (mesh.vertices[vi] - center).norm() <= radius)
                })
                .count()
        };
        let initial_in = in_region(&plane);
        assert!(initial_in > 100 && initial_in < 300, "got {}", initial_in);
        let initial_out = plane.faces.len() - initial_in;

        let simplified = plane
            .simplify(&SimplifyOptions {
                // the CLI derives the global target from min(0.2, 0.1)
                target_count: 100,
                center,
                radius,
                mode: WeightingMode::BoundRegion {
                    region_ratio: 0.2,
                    outside_ratio: 0.1,
                },
                ..Default::default()
            })
            .unwrap();

        assert_index_integrity(&simplified);
        let final_in = in_region(&simplified);
        let final_out = simplified.faces.len() - final_in;

        // the bound region reached its ratio and the outside kept going
        assert!(
            (final_in as f64) <= 0.2 * initial_in as f64 + 2.0,
            "{} of {} remain inside",
            final_in,
            initial_in
        );
        assert!(
            (final_out as f64) <= 0.1 * initial_out as f64 + 2.0,
            "{} of {} remain outside",
            final_out,
            initial_out
        );
        assert!(simplified.faces.len() >= 4);
    }

    #[test]
    fn test_no_progress_abort() {
        // with zero aggressiveness the threshold never opens up, so the
        // stall counter has to fire
        let cube = create_box(&[1.0, 1.0, 1.0]);
        let simplified = cube
            .simplify(&SimplifyOptions {
                target_count: 4,
                aggressiveness: 0.0,
                stall_limit: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(simplified.faces.len(), 12);
    }

    #[test]
    fn test_boundary_classification() {
        // 3x3 vertex grid: the center vertex is interior, the rim is not
        let plane = create_plane(2, 2);
        let mut simplifier = Simplifier::from_mesh(&plane);
        simplifier.update_mesh(0);

        let borders: Vec<bool> = simplifier.vertices.iter().map(|v| v.border).collect();
        assert_eq!(borders.len(), 9);
        // vertex 4 is the center of the 3x3 grid
        assert!(!borders[4]);
        for (i, border) in borders.iter().enumerate() {
            if i != 4 {
                assert!(*border, "rim vertex {} should be boundary", i);
            }
        }
    }

    #[test]
    fn test_boundary_collapse_needs_matching_status() {
        // an interior vertex never merges into the rim: simplify a small
        // plane hard and check the outline survives as a boundary loop
        let plane = create_plane(4, 4);
        let simplified = plane
            .simplify(&SimplifyOptions {
                target_count: 8,
                ..Default::default()
            })
            .unwrap();

        assert_index_integrity(&simplified);

        // the outline survives as a boundary loop, and no interior edge
        // became a new boundary: an open grid has exactly its rim
        let before = boundary_edge_count(&plane);
        let after = boundary_edge_count(&simplified);
        assert!(after >= 3);
        assert!(after <= before, "boundary grew from {} to {}", before, after);
    }
}
