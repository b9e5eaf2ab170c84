//! Constrained Delaunay triangulation over exact rational coordinates.
//!
//! Builds an unconstrained Delaunay triangulation of the input points, then
//! recovers every explicit edge and every input face boundary as a
//! constrained edge, merges near-coincident vertices within `eps`, and
//! assembles a pooled half-edge [`Arrangement`] from the result. The public
//! [`calc`] entry point additionally trims that arrangement into one of four
//! [`OutputMode`]s and reports, for every surviving vertex/edge/triangle,
//! which input ids it descends from.
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod ids;
mod triangulate;
mod types;

use std::collections::{HashMap, HashSet};
use std::fmt;

pub use ids::{CdtEdgeId, CdtFaceId, CdtVertId, SymEdgeId};
use rexact_math::{orient2d, ratio, Sign, Vec2, R};
pub use types::{Arrangement, CdtEdge, CdtFace, CdtVert, SymEdge};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Full,
    Inside,
    Constraints,
    ConstraintsValidBmesh,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CdtError {
    /// An input face's boundary self-intersects; the "inside is to the
    /// left" labelling convention is undefined for such faces.
    SelfIntersectingFace { face: u32 },
}

impl fmt::Display for CdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdtError::SelfIntersectingFace { face } => {
                write!(f, "input face {face} self-intersects")
            }
        }
    }
}

impl std::error::Error for CdtError {}

#[derive(Clone, Debug)]
pub struct CdtInput {
    pub points: Vec<Vec2>,
    pub edges: Vec<(u32, u32)>,
    pub faces: Vec<Vec<u32>>,
    pub eps: R,
}

#[derive(Clone, Debug, Default)]
pub struct CdtOutput {
    pub verts: Vec<Vec2>,
    pub edges: Vec<(u32, u32)>,
    pub faces: Vec<[u32; 3]>,
    pub verts_orig: Vec<Vec<u32>>,
    pub edges_orig: Vec<Vec<u32>>,
    pub faces_orig: Vec<Vec<u32>>,
    /// Equal to `input.edges.len()`. An `edges_orig` entry `>= face_edge_offset`
    /// indexes `face_edge_table` rather than `input.edges`.
    pub face_edge_offset: u32,
    /// `face_edge_table[i - face_edge_offset] = (face_index, local_edge_index)`.
    pub face_edge_table: Vec<(u32, u32)>,
}

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind { parent: (0..n as u32).collect() }
    }

    fn find(&mut self, x: u32) -> u32 {
        if self.parent[x as usize] != x {
            let root = self.find(self.parent[x as usize]);
            self.parent[x as usize] = root;
        }
        self.parent[x as usize]
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb as usize] = ra;
        }
    }
}

/// Runs the full pipeline described by the module doc comment.
pub fn calc(input: &CdtInput, mode: OutputMode) -> Result<CdtOutput, CdtError> {
    for (fi, face) in input.faces.iter().enumerate() {
        if is_self_intersecting(&input.points, face) {
            return Err(CdtError::SelfIntersectingFace { face: fi as u32 });
        }
    }

    let n = input.points.len();
    if n < 3 {
        return Ok(CdtOutput {
            face_edge_offset: input.edges.len() as u32,
            ..Default::default()
        });
    }

    let eps = if rexact_math::sgn(&input.eps) == Sign::Zero {
        ratio(1, 100_000_000)
    } else {
        input.eps.clone()
    };
    let eps_sq = &eps * &eps;

    let mut uf = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = &input.points[i] - &input.points[j];
            if d.squared_length() <= eps_sq {
                uf.union(i as u32, j as u32);
            }
        }
    }

    let mut root_to_dense: HashMap<u32, u32> = HashMap::new();
    let mut dense_points: Vec<Vec2> = Vec::new();
    let mut verts_orig: Vec<Vec<u32>> = Vec::new();
    let mut input_to_dense: Vec<u32> = vec![0; n];
    for i in 0..n {
        let root = uf.find(i as u32);
        let dense = *root_to_dense.entry(root).or_insert_with(|| {
            dense_points.push(input.points[root as usize].clone());
            verts_orig.push(Vec::new());
            (dense_points.len() - 1) as u32
        });
        verts_orig[dense as usize].push(i as u32);
        input_to_dense[i] = dense;
    }

    // Collects every constrained undirected edge (input edges plus face
    // boundaries) keyed by dense vertex pair, tagging each with the
    // combined input-edge / face-edge ids that produced it.
    let mut constrained: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
    let face_edge_offset = input.edges.len() as u32;
    let mut face_edge_table: Vec<(u32, u32)> = Vec::new();

    for (ei, &(a, b)) in input.edges.iter().enumerate() {
        let (da, db) = (input_to_dense[a as usize], input_to_dense[b as usize]);
        if da != db {
            constrained.entry(order(da, db)).or_default().push(ei as u32);
        }
    }

    for (fi, face) in input.faces.iter().enumerate() {
        let dense_face: Vec<u32> = dedup_consecutive(face.iter().map(|&v| input_to_dense[v as usize]).collect());
        let m = dense_face.len();
        if m < 3 {
            continue;
        }
        for k in 0..m {
            let a = dense_face[k];
            let b = dense_face[(k + 1) % m];
            if a == b {
                continue;
            }
            let flat = face_edge_table.len() as u32;
            face_edge_table.push((fi as u32, k as u32));
            constrained.entry(order(a, b)).or_default().push(face_edge_offset + flat);
        }
    }

    let mut tris = triangulate::bowyer_watson(&dense_points);
    let segments: Vec<(u32, u32)> = constrained.keys().copied().collect();
    tris = triangulate::recover_constraints(tris, &dense_points, &segments);

    let dense_faces: Vec<Vec<u32>> = input
        .faces
        .iter()
        .map(|face| dedup_consecutive(face.iter().map(|&v| input_to_dense[v as usize]).collect()))
        .filter(|f| f.len() >= 3)
        .collect();

    let kept: Vec<[u32; 3]> = match mode {
        OutputMode::Full => tris,
        OutputMode::Inside | OutputMode::Constraints | OutputMode::ConstraintsValidBmesh => {
            if dense_faces.is_empty() {
                tris
            } else {
                tris.into_iter()
                    .filter(|t| {
                        let centroid = centroid(&dense_points, t);
                        dense_faces.iter().any(|f| point_in_polygon(&dense_points, f, &centroid))
                    })
                    .collect()
            }
        }
    };

    let boundary_edges = boundary_edges_of(&kept);

    let out_edges: Vec<(u32, u32)> = match mode {
        OutputMode::Full | OutputMode::Inside => all_edges_of(&kept),
        OutputMode::Constraints => constrained.keys().copied().collect(),
        OutputMode::ConstraintsValidBmesh => {
            let mut set: HashSet<(u32, u32)> = constrained.keys().copied().collect();
            set.extend(boundary_edges);
            set.into_iter().collect()
        }
    };

    let edges_orig: Vec<Vec<u32>> = out_edges
        .iter()
        .map(|e| constrained.get(e).cloned().unwrap_or_default())
        .collect();

    let faces_orig: Vec<Vec<u32>> = kept
        .iter()
        .map(|t| {
            dense_faces
                .iter()
                .enumerate()
                .filter(|(_, f)| point_in_polygon(&dense_points, f, &centroid(&dense_points, t)))
                .map(|(i, _)| i as u32)
                .collect()
        })
        .collect();

    Ok(CdtOutput {
        verts: dense_points,
        edges: out_edges,
        faces: kept,
        verts_orig,
        edges_orig,
        faces_orig,
        face_edge_offset,
        face_edge_table,
    })
}

/// Assembles the pooled half-edge [`Arrangement`] for a computed
/// [`CdtOutput`], for callers that need `next`/`rot`/vertex-fan navigation
/// rather than the flat CSR arrays (e.g. lifting a triangulated cluster back
/// to 3-D one face-loop at a time).
pub fn build_arrangement(output: &CdtOutput) -> (Arrangement, Vec<CdtVertId>) {
    let constrained: HashMap<(u32, u32), Vec<u32>> = output
        .edges
        .iter()
        .zip(output.edges_orig.iter())
        .map(|(&e, ids)| (e, ids.clone()))
        .collect();
    Arrangement::from_triangles(&output.verts, &output.faces, &constrained)
}

fn order(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn dedup_consecutive(v: Vec<u32>) -> Vec<u32> {
    let mut out: Vec<u32> = Vec::with_capacity(v.len());
    for x in v {
        if out.last() != Some(&x) {
            out.push(x);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn centroid(pts: &[Vec2], t: &[u32; 3]) -> Vec2 {
    let three = ratio(1, 3);
    let sum = &(&pts[t[0] as usize] + &pts[t[1] as usize]) + &pts[t[2] as usize];
    &sum * &three
}

/// Winding-style point-in-polygon test via `orient2d`: true iff `p` is
/// strictly inside the (possibly non-convex) polygon `f`.
fn point_in_polygon(pts: &[Vec2], f: &[u32], p: &Vec2) -> bool {
    let n = f.len();
    let mut inside = false;
    for i in 0..n {
        let a = &pts[f[i] as usize];
        let b = &pts[f[(i + 1) % n] as usize];
        let (ay, by) = (&a.y, &b.y);
        if (ay > &p.y) != (by > &p.y) {
            let t = (&p.y - ay) / &(by - ay);
            let dx = &b.x - &a.x;
            let x_cross = &a.x + &dx * &t;
            if x_cross > p.x {
                inside = !inside;
            }
        }
    }
    inside
}

fn all_edges_of(tris: &[[u32; 3]]) -> Vec<(u32, u32)> {
    let mut set: HashSet<(u32, u32)> = HashSet::new();
    for t in tris {
        for i in 0..3 {
            set.insert(order(t[i], t[(i + 1) % 3]));
        }
    }
    set.into_iter().collect()
}

fn boundary_edges_of(tris: &[[u32; 3]]) -> Vec<(u32, u32)> {
    let mut count: HashMap<(u32, u32), u32> = HashMap::new();
    for t in tris {
        for i in 0..3 {
            *count.entry(order(t[i], t[(i + 1) % 3])).or_insert(0) += 1;
        }
    }
    count.into_iter().filter(|&(_, c)| c == 1).map(|(e, _)| e).collect()
}

fn is_self_intersecting(pts: &[Vec2], face: &[u32]) -> bool {
    let n = face.len();
    if n < 4 {
        return false;
    }
    for i in 0..n {
        let (a, b) = (face[i], face[(i + 1) % n]);
        for j in (i + 1)..n {
            let (c, d) = (face[j], face[(j + 1) % n]);
            if a == c || a == d || b == c || b == d {
                continue;
            }
            if segments_properly_cross(pts, a, b, c, d) {
                return true;
            }
        }
    }
    false
}

fn segments_properly_cross(pts: &[Vec2], a: u32, b: u32, c: u32, d: u32) -> bool {
    let (pa, pb, pc, pd) = (&pts[a as usize], &pts[b as usize], &pts[c as usize], &pts[d as usize]);
    let s1 = orient2d(pa, pb, pc);
    let s2 = orient2d(pa, pb, pd);
    let s3 = orient2d(pc, pd, pa);
    let s4 = orient2d(pc, pd, pb);
    s1 != s2 && s1 != Sign::Zero && s2 != Sign::Zero && s3 != s4 && s3 != Sign::Zero && s4 != Sign::Zero
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexact_math::int;

    fn v(x: i64, y: i64) -> Vec2 {
        Vec2::new(int(x), int(y))
    }

    #[test]
    fn square_with_diagonal_inside_mode_matches_reference_counts() {
        let input = CdtInput {
            points: vec![v(0, 0), v(1, 0), v(1, 1), v(0, 1)],
            edges: vec![(0, 2)],
            faces: vec![vec![0, 1, 2, 3]],
            eps: int(0),
        };
        let out = calc(&input, OutputMode::Inside).unwrap();
        assert_eq!(out.verts.len(), 4);
        assert_eq!(out.edges.len(), 5);
        assert_eq!(out.faces.len(), 2);
        assert_eq!(out.face_edge_offset, 1);
    }

    #[test]
    fn coincident_points_within_eps_merge() {
        let input = CdtInput {
            points: vec![v(0, 0), v(0, 0), v(1, 0), v(0, 1)],
            edges: vec![],
            faces: vec![],
            eps: int(0),
        };
        let out = calc(&input, OutputMode::Full).unwrap();
        assert_eq!(out.verts.len(), 3);
        assert!(out.verts_orig.iter().any(|ids| ids.len() == 2));
    }

    #[test]
    fn self_intersecting_face_is_rejected() {
        let input = CdtInput {
            points: vec![v(0, 0), v(1, 1), v(1, 0), v(0, 1)],
            edges: vec![],
            faces: vec![vec![0, 1, 2, 3]],
            eps: int(0),
        };
        assert!(matches!(calc(&input, OutputMode::Full), Err(CdtError::SelfIntersectingFace { face: 0 })));
    }

    #[test]
    fn fewer_than_three_points_yields_empty_output() {
        let input = CdtInput { points: vec![v(0, 0), v(1, 0)], edges: vec![], faces: vec![], eps: int(0) };
        let out = calc(&input, OutputMode::Full).unwrap();
        assert!(out.faces.is_empty());
    }
}
