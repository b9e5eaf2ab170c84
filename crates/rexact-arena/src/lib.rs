//! Owns all [`Vertex`] and [`Face`] storage for one arrangement computation.
//!
//! The arena is the thing that makes invariant (I5) of the arrangement hold:
//! two geometrically identical points always collapse to the same
//! [`VertexId`], because [`Arena::add_or_find_vert`] looks vertices up by
//! their exact coordinate before allocating.

use std::collections::HashMap;
use std::fmt;

use rexact_math::{Sign, Vec3, R};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// ID of a vertex owned by an [`Arena`]. Stable for the arena's lifetime and
/// assigned in creation order, so `VertexId(0)` is always the first vertex
/// ever allocated.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct VertexId(pub u32);

impl VertexId {
    pub const INVALID: Self = VertexId(u32::MAX);

    #[inline]
    pub fn to_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn from_usize(v: usize) -> Self {
        VertexId(v as u32)
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v#{}", self.0)
    }
}

/// ID of a face owned by an [`Arena`]. Faces are never deduplicated, so two
/// `FaceId`s can refer to geometrically identical faces.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct FaceId(pub u32);

impl FaceId {
    pub const INVALID: Self = FaceId(u32::MAX);

    #[inline]
    pub fn to_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn from_usize(v: usize) -> Self {
        FaceId(v as u32)
    }
}

impl fmt::Debug for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "f#{}", self.0)
    }
}

/// Origin tag: the input-element id a vertex or face was produced from, or
/// `None` when synthesized (e.g. a Steiner point introduced by the CDT, or a
/// face stitched together from a coplanar cluster).
pub type Orig = Option<u32>;

/// A vertex: an exact 3D position plus its double-precision shadow, used only
/// for BVH bounds and never fed back into a predicate.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Vertex {
    pub co_exact: Vec3,
    pub co_double: [f64; 3],
    pub id: VertexId,
    pub orig: Orig,
}

impl PartialEq for Vertex {
    /// Identity is the exact coordinate, not the id or `orig`.
    fn eq(&self, other: &Self) -> bool {
        self.co_exact == other.co_exact
    }
}
impl Eq for Vertex {}

fn to_f64(r: &R) -> f64 {
    // `Ratio::to_f64`-equivalent: BigRational does not implement `ToPrimitive`
    // precisely for huge numerators, but the BVH only needs a
    // conservative-enough double for bounding boxes, not a correctly rounded
    // one.
    let (numer, denom) = (r.numer(), r.denom());
    let n = numer.to_string().parse::<f64>().unwrap_or(f64::NAN);
    let d = denom.to_string().parse::<f64>().unwrap_or(1.0);
    n / d
}

fn vec3_to_double(v: &Vec3) -> [f64; 3] {
    [to_f64(&v.x), to_f64(&v.y), to_f64(&v.z)]
}

/// A plane in canonical form: `n . x + d = 0`, with `n` divided through by
/// its first nonzero component so that every plane has one unique
/// representative. Equality and hashing are defined over this canonical
/// form, so two `Plane`s built from different (but coplanar) triangles
/// compare equal.
#[derive(Clone, Debug)]
pub struct Plane {
    pub n: Vec3,
    pub d: R,
}

impl Plane {
    /// Builds the plane through three non-collinear vertices, canonicalized.
    ///
    /// Returns `None` if the three points are collinear (cross product is the
    /// zero vector), mirroring `Arena::add_face`'s requirement of three
    /// non-collinear vertices.
    pub fn from_three_points(v0: &Vec3, v1: &Vec3, v2: &Vec3) -> Option<Plane> {
        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let n = e1.cross(&e2);
        if n.x.sgn_is_zero() && n.y.sgn_is_zero() && n.z.sgn_is_zero() {
            return None;
        }
        let d = -n.dot(v0);
        Some(Plane { n, d }.canonicalized())
    }

    fn canonicalized(self) -> Plane {
        let first_nonzero = if !self.n.x.sgn_is_zero() {
            self.n.x.clone()
        } else if !self.n.y.sgn_is_zero() {
            self.n.y.clone()
        } else {
            self.n.z.clone()
        };
        let n = Vec3::new(
            &self.n.x / &first_nonzero,
            &self.n.y / &first_nonzero,
            &self.n.z / &first_nonzero,
        );
        let d = &self.d / &first_nonzero;
        Plane { n, d }
    }

    /// Signed distance of `p` from the plane (sign only matters; magnitude is
    /// not normalized since `n` is not a unit vector).
    pub fn signed_distance_sign(&self, p: &Vec3) -> Sign {
        rexact_math::sgn(&(self.n.dot(p) + &self.d))
    }
}

// Small helper trait so `Plane` construction reads naturally; avoids pulling
// `rexact_math::sgn` into every call site above.
trait IsZero {
    fn sgn_is_zero(&self) -> bool;
}
impl IsZero for R {
    fn sgn_is_zero(&self) -> bool {
        rexact_math::sgn(self).is_zero()
    }
}

impl PartialEq for Plane {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n && self.d == other.d
    }
}
impl Eq for Plane {}

/// A face: an ordered, CCW (around `plane.n`) sequence of vertex handles plus
/// per-edge provenance used by the self-intersection driver.
#[derive(Clone, Debug)]
pub struct Face {
    pub verts: Vec<VertexId>,
    /// `edge_orig[i]` is the input-edge/face-position id for the edge from
    /// `verts[i]` to `verts[(i+1) % n]`.
    pub edge_orig: Vec<Orig>,
    /// `is_intersect[i]` is true if that same edge arose from intersection
    /// subdivision rather than being present in the input.
    pub is_intersect: Vec<bool>,
    pub plane: Plane,
    pub id: FaceId,
    pub orig: Orig,
}

impl Face {
    #[inline]
    pub fn len(&self) -> usize {
        self.verts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.verts.is_empty()
    }

    /// Next position index, wrapping modulo the face size.
    #[inline]
    pub fn next_pos(&self, i: usize) -> usize {
        (i + 1) % self.len()
    }

    /// Previous position index, wrapping modulo the face size.
    #[inline]
    pub fn prev_pos(&self, i: usize) -> usize {
        (i + self.len() - 1) % self.len()
    }

    /// If this face has exactly three positions, its equivalent
    /// [`IndexedTriangle`] relative to `mesh`'s dense vertex index.
    pub fn as_indexed_triangle(&self, mesh: &Mesh) -> Option<IndexedTriangle> {
        if self.len() != 3 {
            return None;
        }
        Some(IndexedTriangle {
            v0: mesh.lookup_vert(self.verts[0])?,
            v1: mesh.lookup_vert(self.verts[1])?,
            v2: mesh.lookup_vert(self.verts[2])?,
            orig: self.orig,
        })
    }

    /// Rewrites this face's positions, eliding every position `i` for which
    /// `mask[i]` is true. Produces the data for a new [`Face`]; the caller
    /// (via [`Arena::erase_face_positions`]) allocates it.
    fn erased(&self, mask: &[bool]) -> (Vec<VertexId>, Vec<Orig>, Vec<bool>) {
        let mut verts = Vec::with_capacity(self.len());
        let mut edge_orig = Vec::with_capacity(self.len());
        let mut is_intersect = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            if mask[i] {
                continue;
            }
            verts.push(self.verts[i]);
            edge_orig.push(self.edge_orig[i]);
            is_intersect.push(self.is_intersect[i]);
        }
        (verts, edge_orig, is_intersect)
    }
}

/// A face with exactly three positions, referring to a dense vertex index
/// (see [`Mesh::populate_vert`]) rather than an arena [`VertexId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexedTriangle {
    pub v0: usize,
    pub v1: usize,
    pub v2: usize,
    pub orig: Orig,
}

/// Errors reported by [`Arena::add_face`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// Fewer than three distinct, non-collinear vertices were given.
    DegenerateFace,
    /// The edge provenance arrays did not match the vertex count.
    MismatchedEdgeData,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArenaError::DegenerateFace => {
                write!(f, "face has fewer than three distinct, non-collinear vertices")
            }
            ArenaError::MismatchedEdgeData => {
                write!(f, "edge provenance array length does not match vertex count")
            }
        }
    }
}
impl std::error::Error for ArenaError {}

/// Owns all [`Vertex`] and [`Face`] storage for one arrangement computation.
pub struct Arena {
    verts: Vec<Vertex>,
    faces: Vec<Face>,
    by_coord: HashMap<Vec3, VertexId>,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            verts: Vec::new(),
            faces: Vec::new(),
            by_coord: HashMap::new(),
        }
    }

    /// Capacity hint; does not change observable behavior.
    pub fn reserve(&mut self, nv: usize, nf: usize) {
        self.verts.reserve(nv);
        self.faces.reserve(nf);
        self.by_coord.reserve(nv);
    }

    /// Returns the existing handle for `co`, if any.
    pub fn find_vert(&self, co: &Vec3) -> Option<VertexId> {
        self.by_coord.get(co).copied()
    }

    /// Returns the existing handle for `co` if one exists (ignoring `orig`
    /// in that case, per the spec); otherwise allocates a new vertex with
    /// the next creation index as its id.
    pub fn add_or_find_vert(&mut self, co: Vec3, orig: Orig) -> VertexId {
        if let Some(id) = self.by_coord.get(&co) {
            return *id;
        }
        let id = VertexId::from_usize(self.verts.len());
        let co_double = vec3_to_double(&co);
        self.by_coord.insert(co.clone(), id);
        self.verts.push(Vertex {
            co_exact: co,
            co_double,
            id,
            orig,
        });
        id
    }

    #[inline]
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.verts[id.to_usize()]
    }

    #[inline]
    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    #[inline]
    pub fn face(&self, id: FaceId) -> &Face {
        &self.faces[id.to_usize()]
    }

    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Allocates a new face. `edge_origs`/`is_intersect` default to `None`
    /// / `false` per position when omitted. Faces are never deduplicated.
    pub fn add_face(
        &mut self,
        verts: Vec<VertexId>,
        orig: Orig,
        edge_origs: Option<Vec<Orig>>,
        is_intersect: Option<Vec<bool>>,
    ) -> Result<FaceId, ArenaError> {
        let n = verts.len();
        let edge_orig = edge_origs.unwrap_or_else(|| vec![None; n]);
        let is_intersect = is_intersect.unwrap_or_else(|| vec![false; n]);
        if edge_orig.len() != n || is_intersect.len() != n {
            return Err(ArenaError::MismatchedEdgeData);
        }
        let plane = self.find_face_plane(&verts).ok_or(ArenaError::DegenerateFace)?;
        let id = FaceId::from_usize(self.faces.len());
        self.faces.push(Face {
            verts,
            edge_orig,
            is_intersect,
            plane,
            id,
            orig,
        });
        Ok(id)
    }

    /// Finds the first triple of non-collinear vertices among `verts` and
    /// builds their plane.
    fn find_face_plane(&self, verts: &[VertexId]) -> Option<Plane> {
        if verts.len() < 3 {
            return None;
        }
        let v0 = &self.vertex(verts[0]).co_exact;
        for i in 1..verts.len() - 1 {
            let v1 = &self.vertex(verts[i]).co_exact;
            let v2 = &self.vertex(verts[i + 1]).co_exact;
            if let Some(plane) = Plane::from_three_points(v0, v1, v2) {
                return Some(plane);
            }
        }
        None
    }

    /// Rewrites face `f`, eliding every position flagged in `mask`, as a new
    /// face allocated in this arena (the original face is left untouched).
    pub fn erase_face_positions(&mut self, f: FaceId, mask: &[bool]) -> Result<FaceId, ArenaError> {
        let (verts, edge_orig, is_intersect) = self.face(f).erased(mask);
        let orig = self.face(f).orig;
        self.add_face(verts, orig, Some(edge_orig), Some(is_intersect))
    }
}

/// A sequence of [`FaceId`]s plus a lazily populated dense vertex index over
/// the exact vertex set reachable from those faces.
pub struct Mesh {
    pub faces: Vec<FaceId>,
    vert_index: Option<HashMap<VertexId, usize>>,
    dense_verts: Vec<VertexId>,
}

impl Mesh {
    pub fn new(faces: Vec<FaceId>) -> Self {
        Mesh {
            faces,
            vert_index: None,
            dense_verts: Vec::new(),
        }
    }

    /// Builds the dense `0..n-1` vertex labelling from the faces' vertex
    /// handles, in first-seen order. Idempotent once built.
    pub fn populate_vert(&mut self, arena: &Arena) {
        if self.vert_index.is_some() {
            return;
        }
        let mut index = HashMap::new();
        let mut dense = Vec::new();
        for &f in &self.faces {
            for &v in &arena.face(f).verts {
                if !index.contains_key(&v) {
                    index.insert(v, dense.len());
                    dense.push(v);
                }
            }
        }
        self.vert_index = Some(index);
        self.dense_verts = dense;
    }

    /// Dense index of `v`, or `None` if `v` is not reachable from this mesh's
    /// faces or [`populate_vert`](Self::populate_vert) has not been called.
    pub fn lookup_vert(&self, v: VertexId) -> Option<usize> {
        self.vert_index.as_ref()?.get(&v).copied()
    }

    /// The dense vertex set built by [`populate_vert`](Self::populate_vert).
    pub fn dense_verts(&self) -> &[VertexId] {
        &self.dense_verts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexact_math::int;

    fn v(x: i64, y: i64, z: i64) -> Vec3 {
        Vec3::new(int(x), int(y), int(z))
    }

    #[test]
    fn dedup_by_exact_coord() {
        let mut a = Arena::new();
        let v0 = a.add_or_find_vert(v(0, 0, 0), Some(1));
        let v1 = a.add_or_find_vert(v(0, 0, 0), Some(2));
        assert_eq!(v0, v1);
        assert_eq!(a.num_verts(), 1);
        // orig of the second call is ignored; the vertex keeps its original orig.
        assert_eq!(a.vertex(v0).orig, Some(1));
    }

    #[test]
    fn distinct_coords_get_distinct_ids() {
        let mut a = Arena::new();
        let v0 = a.add_or_find_vert(v(0, 0, 0), None);
        let v1 = a.add_or_find_vert(v(1, 0, 0), None);
        assert_ne!(v0, v1);
        assert_eq!(a.num_verts(), 2);
    }

    #[test]
    fn add_face_rejects_degenerate() {
        let mut a = Arena::new();
        let v0 = a.add_or_find_vert(v(0, 0, 0), None);
        let v1 = a.add_or_find_vert(v(1, 0, 0), None);
        let v2 = a.add_or_find_vert(v(2, 0, 0), None);
        assert_eq!(
            a.add_face(vec![v0, v1, v2], None, None, None),
            Err(ArenaError::DegenerateFace)
        );
    }

    #[test]
    fn face_plane_is_canonical_regardless_of_starting_vertex() {
        let mut a = Arena::new();
        let v0 = a.add_or_find_vert(v(0, 0, 0), None);
        let v1 = a.add_or_find_vert(v(1, 0, 0), None);
        let v2 = a.add_or_find_vert(v(0, 1, 0), None);
        let f1 = a.add_face(vec![v0, v1, v2], Some(0), None, None).unwrap();
        let f2 = a.add_face(vec![v1, v2, v0], Some(1), None, None).unwrap();
        assert_eq!(a.face(f1).plane, a.face(f2).plane);
    }

    #[test]
    fn mesh_populate_vert_is_dense_and_first_seen_order() {
        let mut a = Arena::new();
        let v0 = a.add_or_find_vert(v(0, 0, 0), None);
        let v1 = a.add_or_find_vert(v(1, 0, 0), None);
        let v2 = a.add_or_find_vert(v(0, 1, 0), None);
        let f = a.add_face(vec![v0, v1, v2], None, None, None).unwrap();
        let mut mesh = Mesh::new(vec![f]);
        mesh.populate_vert(&a);
        assert_eq!(mesh.lookup_vert(v0), Some(0));
        assert_eq!(mesh.lookup_vert(v1), Some(1));
        assert_eq!(mesh.lookup_vert(v2), Some(2));
        assert_eq!(mesh.dense_verts().len(), 3);
    }

    #[test]
    fn erase_face_positions_allocates_new_face() {
        let mut a = Arena::new();
        let v0 = a.add_or_find_vert(v(0, 0, 0), None);
        let v1 = a.add_or_find_vert(v(1, 0, 0), None);
        let v2 = a.add_or_find_vert(v(0, 1, 0), None);
        let v3 = a.add_or_find_vert(v(1, 1, 0), None);
        let f = a
            .add_face(vec![v0, v1, v2, v3], None, None, None)
            .unwrap();
        let f2 = a
            .erase_face_positions(f, &[false, false, true, false])
            .unwrap();
        assert_eq!(a.face(f2).verts, vec![v0, v1, v3]);
        assert_eq!(a.face(f).verts.len(), 4, "original face is untouched");
    }
}
