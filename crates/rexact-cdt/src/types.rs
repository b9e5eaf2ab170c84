use std::collections::HashMap;

use rexact_math::Vec2;

use crate::ids::{CdtEdgeId, CdtFaceId, CdtVertId, SymEdgeId};

/// One directed half-edge. `next` walks CCW around `face`; `rot` walks CCW
/// around `vert` (the edge's origin) to the next edge leaving that vertex.
/// From these two stored fields, `sym = next.rot` (the opposite half-edge of
/// the same undirected edge) and `prev = rot.next.rot` (the previous edge of
/// `face`) are derived, exactly as stated in the data model.
#[derive(Copy, Clone, Debug)]
pub struct SymEdge {
    pub next: SymEdgeId,
    pub rot: SymEdgeId,
    pub vert: CdtVertId,
    pub edge: CdtEdgeId,
    pub face: CdtFaceId,
}

#[derive(Clone, Debug, Default)]
pub struct CdtVert {
    pub pos: Vec2,
    pub symedge: SymEdgeId,
    pub input_ids: Vec<u32>,
    /// `>= 0`: this vertex was merged into the vertex at that dense output
    /// index. `-1`: this vertex is canonical (its own representative).
    pub merge_to_index: i32,
    pub visit_index: u32,
}

#[derive(Clone, Debug, Default)]
pub struct CdtEdge {
    pub symedges: [SymEdgeId; 2],
    pub input_ids: Vec<u32>,
    pub constrained: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CdtFace {
    pub symedge: SymEdgeId,
    pub input_ids: Vec<u32>,
    pub visit_index: u32,
    pub deleted: bool,
}

/// Owns `CdtVert`/`CdtEdge`/`CdtFace` by pooled index so that growing any
/// pool never invalidates the `next`/`rot`/`vert`/`edge`/`face` references
/// stored in a [`SymEdge`]. `outer_face` is the sentinel representing the
/// unbounded face outside the triangulated region; every boundary edge's
/// placeholder mirror half-edge belongs to it.
pub struct Arrangement {
    pub symedges: Vec<SymEdge>,
    pub verts: Vec<CdtVert>,
    pub edges: Vec<CdtEdge>,
    pub faces: Vec<CdtFace>,
    pub outer_face: CdtFaceId,
}

impl Default for Arrangement {
    fn default() -> Self {
        Self::new()
    }
}

impl Arrangement {
    pub fn new() -> Self {
        let mut arr = Arrangement {
            symedges: Vec::new(),
            verts: Vec::new(),
            edges: Vec::new(),
            faces: Vec::new(),
            outer_face: CdtFaceId::INVALID,
        };
        arr.outer_face = arr.new_face();
        arr
    }

    #[inline]
    pub fn next(&self, s: SymEdgeId) -> SymEdgeId {
        self.symedges[s.to_usize()].next
    }

    #[inline]
    pub fn rot(&self, s: SymEdgeId) -> SymEdgeId {
        self.symedges[s.to_usize()].rot
    }

    /// The opposite half-edge of the same undirected edge: `next.rot`.
    #[inline]
    pub fn sym(&self, s: SymEdgeId) -> SymEdgeId {
        self.rot(self.next(s))
    }

    /// The previous half-edge of `s`'s face: `rot.next.rot`.
    #[inline]
    pub fn prev(&self, s: SymEdgeId) -> SymEdgeId {
        self.rot(self.next(self.rot(s)))
    }

    /// `next(next(s))`: valid because every live face in this structure is a
    /// triangle (output face-merging happens above this layer, via
    /// `input_ids`/grouping, never by splicing `SymEdge` faces together).
    #[inline]
    fn prev_face(&self, s: SymEdgeId) -> SymEdgeId {
        self.next(self.next(s))
    }

    #[inline]
    pub fn orig(&self, s: SymEdgeId) -> CdtVertId {
        self.symedges[s.to_usize()].vert
    }

    #[inline]
    pub fn dest(&self, s: SymEdgeId) -> CdtVertId {
        self.orig(self.sym(s))
    }

    #[inline]
    pub fn face_of(&self, s: SymEdgeId) -> CdtFaceId {
        self.symedges[s.to_usize()].face
    }

    #[inline]
    pub fn edge_of(&self, s: SymEdgeId) -> CdtEdgeId {
        self.symedges[s.to_usize()].edge
    }

    pub fn new_vert(&mut self, pos: Vec2) -> CdtVertId {
        let id = CdtVertId::from_usize(self.verts.len());
        self.verts.push(CdtVert {
            pos,
            symedge: SymEdgeId::INVALID,
            input_ids: Vec::new(),
            merge_to_index: -1,
            visit_index: 0,
        });
        id
    }

    fn new_edge(&mut self) -> CdtEdgeId {
        let id = CdtEdgeId::from_usize(self.edges.len());
        self.edges.push(CdtEdge {
            symedges: [SymEdgeId::INVALID; 2],
            input_ids: Vec::new(),
            constrained: false,
        });
        id
    }

    pub fn new_face(&mut self) -> CdtFaceId {
        let id = CdtFaceId::from_usize(self.faces.len());
        self.faces.push(CdtFace {
            symedge: SymEdgeId::INVALID,
            input_ids: Vec::new(),
            visit_index: 0,
            deleted: false,
        });
        id
    }

    fn push_symedge(&mut self, s: SymEdge) -> SymEdgeId {
        let id = SymEdgeId::from_usize(self.symedges.len());
        self.symedges.push(s);
        id
    }

    /// Creates a brand new triangular face `(a, b, c)` (CCW) with its own,
    /// not-yet-glued placeholder ring on the `outer_face`. Returns the
    /// symedge originating at `a` directed toward `b`.
    pub fn new_triangle(&mut self, a: CdtVertId, b: CdtVertId, c: CdtVertId) -> SymEdgeId {
        let face = self.new_face();
        let e_ab = self.new_edge();
        let e_bc = self.new_edge();
        let e_ca = self.new_edge();

        let base = self.symedges.len() as u32;
        let s_ab = SymEdgeId(base);
        let s_bc = SymEdgeId(base + 1);
        let s_ca = SymEdgeId(base + 2);
        let s_ba = SymEdgeId(base + 3);
        let s_ac = SymEdgeId(base + 4);
        let s_cb = SymEdgeId(base + 5);

        self.push_symedge(SymEdge { next: s_bc, rot: s_ac, vert: a, edge: e_ab, face });
        self.push_symedge(SymEdge { next: s_ca, rot: s_ba, vert: b, edge: e_bc, face });
        self.push_symedge(SymEdge { next: s_ab, rot: s_cb, vert: c, edge: e_ca, face });
        self.push_symedge(SymEdge {
            next: s_ac,
            rot: s_bc,
            vert: b,
            edge: e_ab,
            face: self.outer_face,
        });
        self.push_symedge(SymEdge {
            next: s_cb,
            rot: s_ab,
            vert: a,
            edge: e_ca,
            face: self.outer_face,
        });
        self.push_symedge(SymEdge {
            next: s_ba,
            rot: s_ca,
            vert: c,
            edge: e_bc,
            face: self.outer_face,
        });

        self.verts[a.to_usize()].symedge = s_ab;
        self.verts[b.to_usize()].symedge = s_bc;
        self.verts[c.to_usize()].symedge = s_ca;
        self.edges[e_ab.to_usize()].symedges = [s_ab, s_ba];
        self.edges[e_bc.to_usize()].symedges = [s_bc, s_cb];
        self.edges[e_ca.to_usize()].symedges = [s_ca, s_ac];
        self.faces[face.to_usize()].symedge = s_ab;

        s_ab
    }

    /// Stitches two triangles together across a shared edge by making their
    /// inner half-edges `inner1`/`inner2` (same undirected edge, opposite
    /// direction) each other's `sym`. Each triangle's now-redundant
    /// placeholder half-edge is left orphaned in the pool.
    pub fn glue(&mut self, inner1: SymEdgeId, inner2: SymEdgeId) {
        debug_assert_eq!(self.orig(inner1), self.dest(inner2));
        debug_assert_eq!(self.orig(inner2), self.dest(inner1));
        let prev1 = self.prev_face(inner1);
        let prev2 = self.prev_face(inner2);
        self.symedges[prev1.to_usize()].rot = inner2;
        self.symedges[prev2.to_usize()].rot = inner1;

        let edge = self.edge_of(inner1);
        self.symedges[inner2.to_usize()].edge = edge;
        self.edges[edge.to_usize()].symedges = [inner1, inner2];
    }

    /// Builds a fresh arrangement from a triangle soup: `positions` indexed
    /// by `u32`, `triangles` CCW vertex-index triples. `constrained` flags
    /// undirected edges (by vertex-index pair) that must not be reported as
    /// flippable by downstream Delaunay legalization consumers.
    pub fn from_triangles(
        positions: &[Vec2],
        triangles: &[[u32; 3]],
        constrained: &HashMap<(u32, u32), Vec<u32>>,
    ) -> (Arrangement, Vec<CdtVertId>) {
        let mut arr = Arrangement::new();
        let verts: Vec<CdtVertId> = positions.iter().map(|p| arr.new_vert(p.clone())).collect();

        // Maps a directed (lo, hi)-keyed undirected edge to the first inner
        // half-edge seen for it, so the second triangle sharing that edge can
        // be glued to it.
        let mut pending: HashMap<(u32, u32), SymEdgeId> = HashMap::new();

        for tri in triangles {
            let [ia, ib, ic] = *tri;
            let s_ab = arr.new_triangle(verts[ia as usize], verts[ib as usize], verts[ic as usize]);
            let s_bc = arr.next(s_ab);
            let s_ca = arr.next(s_bc);
            for (s, (lo, hi)) in [
                (s_ab, order(ia, ib)),
                (s_bc, order(ib, ic)),
                (s_ca, order(ic, ia)),
            ] {
                if let Some(other) = pending.remove(&(lo, hi)) {
                    arr.glue(s, other);
                } else {
                    pending.insert((lo, hi), s);
                }
            }
        }

        for (&(lo, hi), ids) in constrained {
            // Most edges are still in `pending` only if they never got glued
            // (pure boundary edges); anything interior must be found via a
            // vertex-fan walk instead.
            let found = pending
                .get(&(lo, hi))
                .copied()
                .or_else(|| arr.find_symedge(verts[lo as usize], verts[hi as usize]));
            if let Some(s) = found {
                let e = arr.edge_of(s).to_usize();
                arr.edges[e].constrained = true;
                arr.edges[e].input_ids = ids.clone();
            }
        }

        (arr, verts)
    }

    /// Linear scan of `from`'s outgoing fan for the half-edge to `to`, used
    /// only while stitching constrained-edge tags onto the final structure.
    fn find_symedge(&self, from: CdtVertId, to: CdtVertId) -> Option<SymEdgeId> {
        let start = self.verts[from.to_usize()].symedge;
        if !start.is_valid() {
            return None;
        }
        let mut s = start;
        loop {
            if self.dest(s) == to {
                return Some(s);
            }
            s = self.rot(s);
            if s == start {
                return None;
            }
        }
    }
}

#[inline]
fn order(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
