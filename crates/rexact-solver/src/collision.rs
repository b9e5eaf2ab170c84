//! Collision detection and linearisation (C10): floor, obstacle-SDF, and
//! self-collision tests, striped across worker threads.

use glam::DVec3;
use rayon::prelude::*;
use rexact_bvh::{Aabb, NearestTriangleTraverse, PointInTetMeshTraverse, PointInTriangleMeshTraverse, Tree};

use crate::mesh::EmbeddedMesh;

const OBSTACLE_GRID_RES: usize = 30;
const OBSTACLE_PADDING: f64 = 0.001;

#[derive(Clone, Copy, Debug)]
pub enum Contact {
    /// A floor- or obstacle-SDF contact against lattice vertex `vertex`'s
    /// own embedding.
    Obstacle { vertex: u32, point: DVec3, normal: DVec3 },
    /// `vertex` has penetrated the deforming mesh near triangle `tri`, whose
    /// own three facet vertices are embedded independently of this row.
    SelfContact { vertex: u32, tri: u32, tri_bary: [f64; 3], normal: DVec3 },
}

pub struct ConstraintRow {
    pub cols: Vec<(usize, f64)>,
    pub rhs: f64,
}

/// Vertex-vertex adjacency cliques, one per contact, for a future
/// Gauss-Seidel colouring pass. Unused by the Cholesky/PCG paths.
pub struct ConstraintGraph {
    pub cliques: Vec<Vec<u32>>,
}

/// A trilinear signed-distance field sampled on a fixed-resolution grid,
/// rebuilt from a pair of obstacle keyframes each time the obstacle moves.
pub struct ObstacleGrid {
    origin: DVec3,
    cell: DVec3,
    dims: [usize; 3],
    sdf: Vec<f64>,
    grad: Vec<DVec3>,
}

pub trait Collision {
    fn set_obstacles(&mut self, vlist_t0: Vec<DVec3>, vlist_t1: Vec<DVec3>, faces: Vec<[u32; 3]>);
}

impl ObstacleGrid {
    pub fn empty() -> Self {
        Self { origin: DVec3::ZERO, cell: DVec3::ONE, dims: [0, 0, 0], sdf: Vec::new(), grad: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.dims[0] == 0
    }

    /// Evaluates the precomputed field at `p` via trilinear interpolation
    /// of both the baked distance and the baked (central-difference)
    /// gradient. Outside the grid, returns a large positive distance and
    /// the vector back towards the grid, so contact tests simply miss.
    pub fn sdf(&self, p: DVec3) -> (f64, DVec3) {
        if self.is_empty() {
            return (f64::INFINITY, DVec3::Z);
        }
        let local = (p - self.origin) / self.cell;
        let max_idx = DVec3::new((self.dims[0] - 1) as f64, (self.dims[1] - 1) as f64, (self.dims[2] - 1) as f64);
        if local.x < 0.0 || local.y < 0.0 || local.z < 0.0 || local.cmpgt(max_idx).any() {
            return (f64::INFINITY, (self.origin - p).normalize_or_zero());
        }
        let i0 = local.x.floor() as usize;
        let j0 = local.y.floor() as usize;
        let k0 = local.z.floor() as usize;
        let i1 = (i0 + 1).min(self.dims[0] - 1);
        let j1 = (j0 + 1).min(self.dims[1] - 1);
        let k1 = (k0 + 1).min(self.dims[2] - 1);
        let tx = local.x - i0 as f64;
        let ty = local.y - j0 as f64;
        let tz = local.z - k0 as f64;

        let idx = |i: usize, j: usize, k: usize| (i * self.dims[1] + j) * self.dims[2] + k;
        let lerp_s = |a: f64, b: f64, t: f64| a + (b - a) * t;
        let lerp_v = |a: DVec3, b: DVec3, t: f64| a + (b - a) * t;

        let mut d = [[0.0; 2]; 2];
        let mut g = [[DVec3::ZERO; 2]; 2];
        for (di, ii) in [i0, i1].into_iter().enumerate() {
            for (dj, jj) in [j0, j1].into_iter().enumerate() {
                let s0 = self.sdf[idx(ii, jj, k0)];
                let s1 = self.sdf[idx(ii, jj, k1)];
                d[di][dj] = lerp_s(s0, s1, tz);
                g[di][dj] = lerp_v(self.grad[idx(ii, jj, k0)], self.grad[idx(ii, jj, k1)], tz);
            }
        }
        let d0 = lerp_s(d[0][0], d[0][1], ty);
        let d1 = lerp_s(d[1][0], d[1][1], ty);
        let dist = lerp_s(d0, d1, tx);
        let g0 = lerp_v(g[0][0], g[0][1], ty);
        let g1 = lerp_v(g[1][0], g[1][1], ty);
        let normal = lerp_v(g0, g1, tx).normalize_or_zero();
        (dist, normal)
    }

    fn build(vlist: &[DVec3], faces: &[[u32; 3]]) -> Self {
        if vlist.is_empty() || faces.is_empty() {
            return Self::empty();
        }
        let mut bbox = Aabb::from_point(vlist[0]);
        for &v in &vlist[1..] {
            bbox.extend_point(v);
        }
        let diag = bbox.max - bbox.min;
        let pad = diag * OBSTACLE_PADDING;
        let origin = bbox.min - pad;
        let size = diag + pad * 2.0;
        let dims = [OBSTACLE_GRID_RES, OBSTACLE_GRID_RES, OBSTACLE_GRID_RES];
        let cell = DVec3::new(
            size.x / (dims[0] - 1).max(1) as f64,
            size.y / (dims[1] - 1).max(1) as f64,
            size.z / (dims[2] - 1).max(1) as f64,
        );

        let tri_boxes: Vec<Aabb> = faces
            .iter()
            .map(|f| {
                let mut b = Aabb::from_point(vlist[f[0] as usize]);
                b.extend_point(vlist[f[1] as usize]);
                b.extend_point(vlist[f[2] as usize]);
                b
            })
            .collect();
        let tree = Tree::init(&tri_boxes);

        let n = dims[0] * dims[1] * dims[2];
        let mut sdf = vec![0.0; n];
        let idx = |i: usize, j: usize, k: usize| (i * dims[1] + j) * dims[2] + k;
        for i in 0..dims[0] {
            for j in 0..dims[1] {
                for k in 0..dims[2] {
                    let p = origin + DVec3::new(i as f64, j as f64, k as f64) * cell;
                    let nearest = NearestTriangleTraverse::new(p, vlist, faces, &[]).run(&tree);
                    let dist = (nearest.pt_on_tri - p).length();
                    let inside = PointInTriangleMeshTraverse::new(p, vlist, faces, &[]).run(&tree).is_inside;
                    sdf[idx(i, j, k)] = if inside { -dist } else { dist };
                }
            }
        }

        let mut grad = vec![DVec3::ZERO; n];
        for i in 0..dims[0] {
            for j in 0..dims[1] {
                for k in 0..dims[2] {
                    let gx = central_diff(&sdf, dims, i, j, k, 0) / (2.0 * cell.x);
                    let gy = central_diff(&sdf, dims, i, j, k, 1) / (2.0 * cell.y);
                    let gz = central_diff(&sdf, dims, i, j, k, 2) / (2.0 * cell.z);
                    grad[idx(i, j, k)] = DVec3::new(gx, gy, gz);
                }
            }
        }

        Self { origin, cell, dims, sdf, grad }
    }
}

fn central_diff(sdf: &[f64], dims: [usize; 3], i: usize, j: usize, k: usize, axis: usize) -> f64 {
    let idx = |i: usize, j: usize, k: usize| (i * dims[1] + j) * dims[2] + k;
    let (mut lo, mut hi) = ((i, j, k), (i, j, k));
    match axis {
        0 => {
            lo.0 = i.saturating_sub(1);
            hi.0 = (i + 1).min(dims[0] - 1);
        }
        1 => {
            lo.1 = j.saturating_sub(1);
            hi.1 = (j + 1).min(dims[1] - 1);
        }
        _ => {
            lo.2 = k.saturating_sub(1);
            hi.2 = (k + 1).min(dims[2] - 1);
        }
    }
    sdf[idx(hi.0, hi.1, hi.2)] - sdf[idx(lo.0, lo.1, lo.2)]
}

impl Collision for ObstacleGrid {
    /// Rebuilds the field from the end-of-step keyframe. Continuous
    /// interpolation between `vlist_t0` and `vlist_t1` across substeps is
    /// not implemented; `vlist_t0` is retained in the signature so the
    /// two-keyframe shape is available to a future sweep-based grid.
    fn set_obstacles(&mut self, _vlist_t0: Vec<DVec3>, vlist_t1: Vec<DVec3>, faces: Vec<[u32; 3]>) {
        *self = ObstacleGrid::build(&vlist_t1, &faces);
    }
}

/// Runs the three per-vertex tests striped `vi = i*nthreads + tid` across
/// `nthreads` rayon workers, and returns all contacts found this step.
pub fn detect_contacts(
    mesh: &EmbeddedMesh,
    x: &[DVec3],
    floor: f64,
    obstacle: &ObstacleGrid,
    self_collision: bool,
    nthreads: usize,
) -> Vec<Contact> {
    let n = mesh.embeddings.len();
    if n == 0 {
        return Vec::new();
    }
    let nthreads = nthreads.max(1);

    let tet_boxes: Vec<Aabb> = mesh
        .tets
        .iter()
        .map(|t| {
            let mut b = Aabb::from_point(x[t[0] as usize]);
            for &v in &t[1..] {
                b.extend_point(x[v as usize]);
            }
            b
        })
        .collect();
    let deformed_tree = if self_collision { Some(Tree::init(&tet_boxes)) } else { None };
    let rest_surface_tree = if self_collision {
        let boxes: Vec<Aabb> = mesh
            .facet_faces
            .iter()
            .map(|f| {
                let mut b = Aabb::from_point(mesh.facet_verts[f[0] as usize]);
                b.extend_point(mesh.facet_verts[f[1] as usize]);
                b.extend_point(mesh.facet_verts[f[2] as usize]);
                b
            })
            .collect();
        Some(Tree::init(&boxes))
    } else {
        None
    };

    (0..nthreads)
        .into_par_iter()
        .flat_map_iter(|tid| {
            let mut out = Vec::new();
            let mut vi = tid;
            while vi < n {
                test_vertex(mesh, x, floor, obstacle, self_collision, deformed_tree.as_ref(), rest_surface_tree.as_ref(), vi as u32, &mut out);
                vi += nthreads;
            }
            out
        })
        .collect()
}

fn test_vertex(
    mesh: &EmbeddedMesh,
    x: &[DVec3],
    floor: f64,
    obstacle: &ObstacleGrid,
    self_collision: bool,
    deformed_tree: Option<&Tree>,
    rest_surface_tree: Option<&Tree>,
    vi: u32,
    out: &mut Vec<Contact>,
) {
    let p = mesh.get_mapped_facet_vertex(x, vi as usize);

    if p.z < floor {
        out.push(Contact::Obstacle { vertex: vi, point: DVec3::new(p.x, p.y, floor), normal: DVec3::Z });
    }

    let (dist, n) = obstacle.sdf(p);
    if dist <= 0.0 {
        out.push(Contact::Obstacle { vertex: vi, point: p - n * dist, normal: n });
    }

    if !self_collision {
        return;
    }
    let (Some(dtree), Some(rtree)) = (deformed_tree, rest_surface_tree) else { return };
    let own_tet = mesh.embeddings[vi as usize].tet;
    let hit = PointInTetMeshTraverse::new(p, x, &mesh.tets, &[], &[own_tet]).run(dtree);
    if hit.prim < 0 {
        return;
    }

    let rest_p = rest_position(mesh, vi);
    let still_inside = PointInTriangleMeshTraverse::new(rest_p, &mesh.facet_verts, &mesh.facet_faces, &[]).run(rtree).is_inside;
    if !still_inside {
        return;
    }

    let skip: Vec<u32> = mesh
        .facet_faces
        .iter()
        .enumerate()
        .filter(|(_, f)| f.contains(&vi))
        .map(|(i, _)| i as u32)
        .collect();
    let nearest = NearestTriangleTraverse::new(rest_p, &mesh.facet_verts, &mesh.facet_faces, &skip).run(rtree);
    if nearest.prim < 0 {
        return;
    }
    let tri = mesh.facet_faces[nearest.prim as usize];
    let tri_bary = triangle_barycentric(nearest.pt_on_tri, mesh.facet_verts[tri[0] as usize], mesh.facet_verts[tri[1] as usize], mesh.facet_verts[tri[2] as usize]);
    let a = mesh.get_mapped_facet_vertex(x, tri[0] as usize);
    let b = mesh.get_mapped_facet_vertex(x, tri[1] as usize);
    let c = mesh.get_mapped_facet_vertex(x, tri[2] as usize);
    let normal = (b - a).cross(c - a).normalize_or_zero();
    out.push(Contact::SelfContact { vertex: vi, tri: nearest.prim as u32, tri_bary, normal });
}

fn rest_position(mesh: &EmbeddedMesh, facet_vertex: u32) -> DVec3 {
    let e = &mesh.embeddings[facet_vertex as usize];
    let tet = mesh.tets[e.tet as usize];
    let mut p = DVec3::ZERO;
    for j in 0..4 {
        p += mesh.lattice_rest[tet[j] as usize] * e.bary[j];
    }
    p
}

fn triangle_barycentric(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> [f64; 3] {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-18 {
        return [1.0, 0.0, 0.0];
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    [1.0 - v - w, v, w]
}

/// Turns contacts into `(A + ck*CᵀC)` rows and the matching constraint graph.
/// `collision_thickness` is the rhs offset `η`.
pub fn linearize_contacts(mesh: &EmbeddedMesh, contacts: &[Contact], thickness: f64) -> (Vec<ConstraintRow>, ConstraintGraph) {
    let mut rows = Vec::with_capacity(contacts.len());
    let mut cliques = Vec::with_capacity(contacts.len());

    for c in contacts {
        match *c {
            Contact::Obstacle { vertex, point, normal } => {
                let e = &mesh.embeddings[vertex as usize];
                let tet = mesh.tets[e.tet as usize];
                let mut cols = Vec::with_capacity(12);
                for a in 0..3 {
                    let na = component(normal, a);
                    if na == 0.0 {
                        continue;
                    }
                    for j in 0..4 {
                        cols.push((3 * tet[j] as usize + a, e.bary[j] * na));
                    }
                }
                rows.push(ConstraintRow { cols, rhs: normal.dot(point) + thickness });
                cliques.push(tet.to_vec());
            }
            Contact::SelfContact { vertex, tri, tri_bary, normal } => {
                let ve = &mesh.embeddings[vertex as usize];
                let vtet = mesh.tets[ve.tet as usize];
                let tri_verts = mesh.facet_faces[tri as usize];
                let mut cols = Vec::with_capacity(24);
                let mut clique: Vec<u32> = vtet.to_vec();
                for a in 0..3 {
                    let na = component(normal, a);
                    if na == 0.0 {
                        continue;
                    }
                    for j in 0..4 {
                        cols.push((3 * vtet[j] as usize + a, ve.bary[j] * na));
                    }
                    for (k, &tv) in tri_verts.iter().enumerate() {
                        let te = &mesh.embeddings[tv as usize];
                        let ttet = mesh.tets[te.tet as usize];
                        for j in 0..4 {
                            cols.push((3 * ttet[j] as usize + a, -tri_bary[k] * te.bary[j] * na));
                        }
                    }
                }
                for &tv in &tri_verts {
                    clique.extend_from_slice(&mesh.tets[mesh.embeddings[tv as usize].tet as usize]);
                }
                rows.push(ConstraintRow { cols, rhs: thickness });
                cliques.push(clique);
            }
        }
    }

    (rows, ConstraintGraph { cliques })
}

fn component(v: DVec3, axis: usize) -> f64 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::EmbeddedMesh;

    fn unit_cube() -> EmbeddedMesh {
        let v = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
        ];
        let f = vec![
            [0u32, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        EmbeddedMesh::create(v, f, 2).unwrap()
    }

    #[test]
    fn floor_test_flags_vertex_below_floor() {
        let mesh = unit_cube();
        let mut x = mesh.lattice_rest.clone();
        for p in x.iter_mut() {
            p.z -= 2.0;
        }
        let contacts = detect_contacts(&mesh, &x, 0.0, &ObstacleGrid::empty(), false, 1);
        assert!(contacts.iter().any(|c| matches!(c, Contact::Obstacle { .. })));
    }

    #[test]
    fn no_contacts_when_well_above_floor_and_no_obstacle() {
        let mesh = unit_cube();
        let x = mesh.lattice_rest.clone();
        let contacts = detect_contacts(&mesh, &x, -100.0, &ObstacleGrid::empty(), false, 2);
        assert!(contacts.is_empty());
    }

    #[test]
    fn obstacle_grid_reports_negative_distance_inside() {
        let v = vec![
            DVec3::new(-1.0, -1.0, -1.0),
            DVec3::new(1.0, -1.0, -1.0),
            DVec3::new(1.0, 1.0, -1.0),
            DVec3::new(-1.0, 1.0, -1.0),
            DVec3::new(-1.0, -1.0, 1.0),
            DVec3::new(1.0, -1.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(-1.0, 1.0, 1.0),
        ];
        let f = vec![
            [0u32, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        let grid = ObstacleGrid::build(&v, &f);
        let (d_in, _) = grid.sdf(DVec3::ZERO);
        assert!(d_in < 0.0);
        let (d_out, _) = grid.sdf(DVec3::new(5.0, 5.0, 5.0));
        assert!(d_out > 0.0);
    }
}
