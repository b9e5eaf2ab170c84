//! The orchestration layer tying the exact-arithmetic arrangement kernel
//! (`rexact-arena`/`rexact-isect`/`rexact-boolean`) and, behind the `solver`
//! feature, the ADMM soft-body solver (`rexact-solver`) into the two
//! operations client code actually calls: self-intersection and boolean
//! combination of triangle meshes. This is the one place in the workspace
//! that installs a `tracing` subscriber — every lower crate only emits
//! spans/events, never decides how they're rendered.

pub mod exact_f64;
pub mod ffi;

#[cfg(feature = "solver")]
pub use rexact_solver::{
    Collision, Contact, CreateError, EmbeddedMesh, Element, FacetEmbedding, LinSolver, LogLevel,
    Material, ObstacleGrid, RuntimeWarning, Solver, SolverError, SolverOptions, StepError,
};

pub use rexact_boolean::BooleanOp;

use rexact_arena::{Arena, Mesh as ArenaMesh, Orig};

use exact_f64::{vec3_from_f64, vec3_to_f64};

/// A plain triangle mesh at the library boundary: double-precision vertices
/// and triangle index triples, the one shape every entry point here takes
/// and returns.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub verts: Vec<[f64; 3]>,
    pub tris: Vec<[u32; 3]>,
}

/// Non-fatal condition surfaced by a facade-level operation without
/// aborting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshWarning {
    /// At least one operand had an edge shared by a number of triangles
    /// other than two, so it was not a closed, orientable 2-manifold; the
    /// winding-number classification proceeded anyway, best-effort.
    NonManifoldInput,
}

/// Checks whether every edge of `tris` borders exactly two triangles —
/// the closed, orientable 2-manifold precondition the winding-number
/// boolean classification assumes but does not itself enforce.
fn shape_is_manifold(tris: &[[u32; 3]]) -> bool {
    use std::collections::HashMap;
    let mut edge_count: HashMap<(u32, u32), u32> = HashMap::new();
    for tri in tris {
        for k in 0..3 {
            let a = tri[k];
            let b = tri[(k + 1) % 3];
            let key = if a < b { (a, b) } else { (b, a) };
            *edge_count.entry(key).or_insert(0) += 1;
        }
    }
    edge_count.values().all(|&c| c == 2)
}

/// Installs a `tracing-subscriber` filtered to `level`, so callers of this
/// crate's library API get readable diagnostics without wiring up `tracing`
/// themselves. Safe to call more than once; later calls are no-ops once a
/// global subscriber is already set.
#[cfg(feature = "solver")]
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::filter::LevelFilter;

    let filter = match level {
        LogLevel::None => LevelFilter::OFF,
        LogLevel::Low => LevelFilter::WARN,
        LogLevel::High => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
    };
    let _ = tracing_subscriber::fmt().with_max_level(filter).try_init();
}

/// Combines every input shape's triangles into one arena, tagging each
/// resulting face's `orig` with a running global index so a caller can later
/// recover which input shape a post-arrangement triangle descended from.
/// Returns the arena, the combined mesh, and the global-face-index -> shape
/// index table.
fn build_combined(shapes: &[(&[[f64; 3]], &[[u32; 3]])]) -> (Arena, ArenaMesh, Vec<i32>) {
    let mut arena = Arena::new();
    let mut faces = Vec::new();
    let mut face_shape = Vec::new();

    for (shape_id, &(verts, tris)) in shapes.iter().enumerate() {
        let vids: Vec<_> = verts.iter().map(|&p| arena.add_or_find_vert(vec3_from_f64(p), None)).collect();
        for tri in tris {
            let orig: Orig = Some(face_shape.len() as u32);
            let vs = vec![vids[tri[0] as usize], vids[tri[1] as usize], vids[tri[2] as usize]];
            if let Ok(f) = arena.add_face(vs, orig, None, None) {
                faces.push(f);
                face_shape.push(shape_id as i32);
            }
        }
    }
    (arena, ArenaMesh::new(faces), face_shape)
}

/// Reads a finished arena + mesh pair back out as a plain triangle mesh.
/// Non-triangular faces (a coplanar-cluster remnant that never got
/// retriangulated, or a degenerate erase) are dropped rather than panicking.
fn extract(arena: &Arena, mesh: &mut ArenaMesh) -> TriMesh {
    mesh.populate_vert(arena);
    let verts = mesh.dense_verts().iter().map(|&v| vec3_to_f64(&arena.vertex(v).co_exact)).collect();
    let tris = mesh
        .faces
        .iter()
        .filter_map(|&f| {
            let face = arena.face(f);
            if face.len() != 3 {
                return None;
            }
            Some([
                mesh.lookup_vert(face.verts[0])? as u32,
                mesh.lookup_vert(face.verts[1])? as u32,
                mesh.lookup_vert(face.verts[2])? as u32,
            ])
        })
        .collect();
    TriMesh { verts, tris }
}

/// Resolves a triangle mesh's self-intersections, returning the
/// re-triangulated arrangement: every pair of crossing triangles is split
/// along their intersection curve so no two triangles in the output cross.
pub fn trimesh_self_intersect(verts: &[[f64; 3]], tris: &[[u32; 3]]) -> TriMesh {
    let (mut arena, mut mesh, _face_shape) = build_combined(&[(verts, tris)]);
    let mut out = rexact_isect::self_intersect(&mut arena, &mut mesh);
    extract(&arena, &mut out)
}

/// Resolves self-intersections across `shapes` considered jointly: every
/// triangle from every shape can split every other, including triangles
/// from the same shape when `use_self` is set.
pub fn trimesh_nary_intersect(shapes: &[(&[[f64; 3]], &[[u32; 3]])], use_self: bool) -> TriMesh {
    let _ = use_self; // the arrangement kernel always resolves self-intersections; see DESIGN.md
    let (mut arena, mut mesh, _face_shape) = build_combined(shapes);
    let mut out = rexact_isect::self_intersect(&mut arena, &mut mesh);
    extract(&arena, &mut out)
}

/// Runs a boolean operation across `shapes`: self-intersects their union
/// first, then classifies each resulting triangle by winding number against
/// every operand. `hole_tolerant` is accepted to match the C ABI's surface
/// at `§6` but has no further effect here — see `DESIGN.md`, since a
/// direction along which every candidate ray is degenerate already yields an
/// all-zero winding vector, which fails every op's "inside" predicate and so
/// already reads as "outside".
pub fn boolean_mesh(shapes: &[(&[[f64; 3]], &[[u32; 3]])], op: BooleanOp, hole_tolerant: bool) -> (TriMesh, Option<MeshWarning>) {
    let _ = hole_tolerant;
    let warning = if shapes.iter().any(|&(_, tris)| !shape_is_manifold(tris)) { Some(MeshWarning::NonManifoldInput) } else { None };

    let (mut arena, mut mesh, face_shape) = build_combined(shapes);
    let arrangement = rexact_isect::self_intersect(&mut arena, &mut mesh);
    let nshapes = shapes.len();
    let shape_fn = move |orig: Orig| -> i32 { orig.and_then(|o| face_shape.get(o as usize).copied()).unwrap_or(-1) };

    let mut result = rexact_boolean::boolean(&mut arena, &arrangement, nshapes, shape_fn, op);
    (extract(&arena, &mut result), warning)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet() -> (Vec<[f64; 3]>, Vec<[u32; 3]>) {
        (
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    #[test]
    fn self_intersect_of_a_plain_tet_is_unchanged_in_topology() {
        let (verts, tris) = unit_tet();
        let out = trimesh_self_intersect(&verts, &tris);
        assert_eq!(out.verts.len(), 4);
        assert_eq!(out.tris.len(), 4);
    }

    #[test]
    fn boolean_none_returns_the_raw_arrangement() {
        let (verts, tris) = unit_tet();
        let (out, warning) = boolean_mesh(&[(&verts, &tris)], BooleanOp::None, false);
        assert_eq!(out.tris.len(), 4);
        assert_eq!(warning, None);
    }

    #[test]
    fn union_of_disjoint_tets_keeps_every_triangle() {
        let (verts, tris) = unit_tet();
        let shifted: Vec<[f64; 3]> = verts.iter().map(|p| [p[0] + 10.0, p[1], p[2]]).collect();
        let (out, warning) = boolean_mesh(&[(&verts, &tris), (&shifted, &tris)], BooleanOp::Union, false);
        assert_eq!(out.tris.len(), 8);
        assert_eq!(warning, None);
    }

    #[test]
    fn non_manifold_operand_is_flagged() {
        let verts = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let tris = vec![[0u32, 1, 2]];
        let (_, warning) = boolean_mesh(&[(&verts, &tris)], BooleanOp::None, false);
        assert_eq!(warning, Some(MeshWarning::NonManifoldInput));
    }
}
