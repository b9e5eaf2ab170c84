//! N-ary winding-number boolean classification over an already
//! self-intersected arrangement.
//!
//! Every arrangement triangle has two adjacent "sides": the region just
//! beyond its normal, and the region just behind it. For each side we cast a
//! ray from a point offset a small distance along (or against) the
//! triangle's normal and count oriented crossings against every candidate
//! operand triangle, giving a winding number per operand. Whether the
//! triangle survives into the boolean result, and which way it ends up
//! oriented, falls out of comparing the two sides' winding vectors against
//! the op's "inside" predicate.

use std::collections::HashMap;

use rexact_arena::{Arena, Mesh, Orig, VertexId};
use rexact_math::{int, orient3d, ratio, sgn, Sign, Vec3, R};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BooleanOp {
    Union,
    Intersection,
    /// Operand 0 is the minuend: `A - (B1 u B2 u ...)`.
    Difference,
    /// Returns the arrangement unchanged (the pre-boolean self-intersected
    /// mesh).
    None,
}

/// Runs `op` over `mesh`'s triangles, where `shape_fn` maps an arrangement
/// triangle's original input-face id to an operand index in `0..nshapes`, or
/// `-1` to exclude that face from the boolean altogether (dropped from the
/// output and from ray-cast candidacy alike).
pub fn boolean(
    arena: &mut Arena,
    mesh: &Mesh,
    nshapes: usize,
    shape_fn: impl Fn(Orig) -> i32,
    op: BooleanOp,
) -> Mesh {
    if op == BooleanOp::None {
        return Mesh::new(mesh.faces.clone());
    }

    struct Tri {
        verts: [VertexId; 3],
        pos: [Vec3; 3],
        normal: Vec3,
        shape: i32,
        orig: Orig,
    }

    impl HasPositions for Tri {
        fn positions(&self) -> [&Vec3; 3] {
            [&self.pos[0], &self.pos[1], &self.pos[2]]
        }
    }

    let triangles: Vec<Tri> = mesh
        .faces
        .iter()
        .filter_map(|&f| {
            let face = arena.face(f);
            if face.len() != 3 {
                return None;
            }
            let shape = shape_fn(face.orig);
            let pos = [
                arena.vertex(face.verts[0]).co_exact.clone(),
                arena.vertex(face.verts[1]).co_exact.clone(),
                arena.vertex(face.verts[2]).co_exact.clone(),
            ];
            Some(Tri {
                verts: [face.verts[0], face.verts[1], face.verts[2]],
                pos,
                normal: face.plane.n.clone(),
                shape,
                orig: face.orig,
            })
        })
        .collect();

    let candidates: Vec<(i32, [Vec3; 3])> =
        triangles.iter().filter(|t| t.shape >= 0).map(|t| (t.shape, t.pos.clone())).collect();

    let eps = ray_offset_epsilon(&triangles);

    let mut kept: Vec<([VertexId; 3], Orig)> = Vec::new();
    for t in &triangles {
        if t.shape < 0 {
            continue;
        }
        let centroid = &(&(&t.pos[0] + &t.pos[1]) + &t.pos[2]) * &ratio(1, 3);
        let offset = &t.normal * &eps;
        let p_out = &centroid + &offset;
        let p_in = &centroid - &offset;

        let w_out = winding_numbers(&p_out, &candidates, nshapes);
        let w_in = winding_numbers(&p_in, &candidates, nshapes);

        let out_inside = is_inside(op, &w_out, nshapes);
        let in_inside = is_inside(op, &w_in, nshapes);
        if out_inside == in_inside {
            continue;
        }

        if in_inside && !out_inside {
            kept.push((t.verts, t.orig));
        } else {
            kept.push(([t.verts[0], t.verts[2], t.verts[1]], t.orig));
        }
    }

    let kept = dedup_and_cancel(op, kept);

    let mut out_faces = Vec::new();
    for (verts, orig) in kept {
        if let Ok(id) = arena.add_face(verts.to_vec(), orig, None, None) {
            out_faces.push(id);
        }
    }
    Mesh::new(out_faces)
}

fn is_inside(op: BooleanOp, w: &[i32], nshapes: usize) -> bool {
    match op {
        BooleanOp::Union => w.iter().sum::<i32>() >= 1,
        BooleanOp::Intersection => w.iter().sum::<i32>() >= nshapes as i32,
        BooleanOp::Difference => w[0] >= 1 && w[1..].iter().all(|&wi| wi <= 0),
        BooleanOp::None => unreachable!(),
    }
}

/// Collapses duplicate coincident triangles (same vertex set, arising from
/// overlapping coplanar input already merged by the self-intersect driver)
/// to one instance, and — for `Difference` — drops a group entirely if it
/// contains two opposite-facing copies that cancel.
fn dedup_and_cancel(op: BooleanOp, faces: Vec<([VertexId; 3], Orig)>) -> Vec<([VertexId; 3], Orig)> {
    let mut groups: HashMap<[VertexId; 3], Vec<([VertexId; 3], Orig)>> = HashMap::new();
    for (verts, orig) in faces {
        let mut key = verts;
        key.sort();
        groups.entry(key).or_default().push((verts, orig));
    }

    let mut out = Vec::new();
    for group in groups.into_values() {
        if group.len() == 1 {
            out.push(group[0]);
            continue;
        }
        let first = group[0].0;
        let has_opposite = group[1..].iter().any(|(v, _)| !same_winding(&first, v));
        if op == BooleanOp::Difference && has_opposite {
            continue;
        }
        out.push(group[0]);
    }
    out
}

/// True iff `b` is a cyclic rotation of `a` (same winding), given both are
/// permutations of the same three distinct ids.
fn same_winding(a: &[VertexId; 3], b: &[VertexId; 3]) -> bool {
    (0..3).any(|r| (0..3).all(|i| a[i] == b[(i + r) % 3]))
}

/// A small but geometry-scaled offset: a fraction of the scene's bounding
/// box diagonal, mirroring the BVH's own exact-touching-avoidance padding.
fn ray_offset_epsilon(triangles: &[impl HasPositions]) -> R {
    let mut min = None;
    let mut max = None;
    for t in triangles {
        for p in t.positions() {
            min = Some(match min {
                None => p.clone(),
                Some(m) => component_min(&m, p),
            });
            max = Some(match max {
                None => p.clone(),
                Some(m) => component_max(&m, p),
            });
        }
    }
    let (min, max) = match (min, max) {
        (Some(a), Some(b)) => (a, b),
        _ => return ratio(1, 1_000_000),
    };
    let diag = (&max - &min).squared_length();
    if sgn(&diag) == Sign::Zero {
        return ratio(1, 1_000_000);
    }
    &diag / &int(100_000_000)
}

trait HasPositions {
    fn positions(&self) -> [&Vec3; 3];
}

fn component_min(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::new(a.x.clone().min(b.x.clone()), a.y.clone().min(b.y.clone()), a.z.clone().min(b.z.clone()))
}

fn component_max(a: &Vec3, b: &Vec3) -> Vec3 {
    Vec3::new(a.x.clone().max(b.x.clone()), a.y.clone().max(b.y.clone()), a.z.clone().max(b.z.clone()))
}

/// Counts, for each operand `0..nshapes`, the oriented crossing count of a
/// ray from `origin` against every candidate triangle. Tries a handful of
/// fixed, non-axis-aligned directions until one produces no degenerate
/// (vertex/edge-grazing) hit against any candidate.
fn winding_numbers(origin: &Vec3, candidates: &[(i32, [Vec3; 3])], nshapes: usize) -> Vec<i32> {
    const DIRECTIONS: &[(i64, i64, i64)] =
        &[(1, 7, 13), (17, -5, 11), (-9, 19, 3), (23, -11, -17), (31, 5, -19), (-13, -23, 7), (41, 3, -29), (-7, 37, -11)];

    'directions: for &(dx, dy, dz) in DIRECTIONS {
        let dir = Vec3::new(int(dx), int(dy), int(dz));
        let far = &(&dir * &int(1_000_000)) + origin;
        let mut winding = vec![0i32; nshapes];
        for (shape, tri) in candidates {
            match segment_crosses_triangle(origin, &far, tri) {
                CrossResult::Degenerate => continue 'directions,
                CrossResult::None => {}
                CrossResult::Enter => winding[*shape as usize] += 1,
                CrossResult::Exit => winding[*shape as usize] -= 1,
            }
        }
        return winding;
    }
    vec![0i32; nshapes]
}

enum CrossResult {
    None,
    Enter,
    Exit,
    Degenerate,
}

/// Whether segment `o`-`q` pierces triangle `tri`'s interior, via the
/// classic three-signed-tetrahedra-volumes test (`orient3d(o, q, vi, vi+1)`
/// all agreeing in sign iff the line through `o, q` passes through the
/// triangle's interior), combined with a plane-side check of `o` vs `q` to
/// restrict to the segment (and, since `q` is far along the cast direction,
/// to the forward ray).
fn segment_crosses_triangle(o: &Vec3, q: &Vec3, tri: &[Vec3; 3]) -> CrossResult {
    let normal = (&tri[1] - &tri[0]).cross(&(&tri[2] - &tri[0]));
    let d = -normal.dot(&tri[0]);
    let so = sgn(&(normal.dot(o) + &d));
    let sq = sgn(&(normal.dot(q) + &d));
    if so == Sign::Zero || sq == Sign::Zero || so == sq {
        return if so == Sign::Zero || sq == Sign::Zero { CrossResult::Degenerate } else { CrossResult::None };
    }

    let s1 = orient3d(o, q, &tri[0], &tri[1]);
    let s2 = orient3d(o, q, &tri[1], &tri[2]);
    let s3 = orient3d(o, q, &tri[2], &tri[0]);
    if s1 == Sign::Zero || s2 == Sign::Zero || s3 == Sign::Zero {
        return CrossResult::Degenerate;
    }
    if s1 != s2 || s2 != s3 {
        return CrossResult::None;
    }
    if so == Sign::Neg {
        CrossResult::Enter
    } else {
        CrossResult::Exit
    }
}
