//! Self-intersect driver (C6): for every input triangle, gathers its
//! non-coplanar intersections, resolves coplanar overlap through its
//! cluster (if any), retriangulates in 2-D via [`rexact_cdt`], and lifts the
//! result back into the arena as new faces.

use std::collections::HashMap;

use rexact_arena::{Arena, FaceId, Mesh, Orig, Plane};
use rexact_math::{dominant_axis, orient2d, ratio, Sign, Vec2, Vec3, R};
use rexact_cdt::{CdtInput, OutputMode};

use crate::cluster::{build_clusters, Cluster};
use crate::itt::{triangle_triangle_intersect, Itt};

struct Triangle {
    face: FaceId,
    plane: Plane,
    verts: [Vec3; 3],
    orig: Orig,
}

/// Runs the full self-intersection pipeline over every triangular face in
/// `mesh`, returning a new [`Mesh`] over freshly allocated faces in `arena`.
/// Non-triangular input faces are skipped (the arrangement is assumed
/// already triangulated, matching the "TMesh" precondition of C4/C6).
pub fn self_intersect(arena: &mut Arena, mesh: &mut Mesh) -> Mesh {
    mesh.populate_vert(arena);

    let triangles: Vec<Triangle> = mesh
        .faces
        .iter()
        .filter_map(|&f| {
            let face = arena.face(f);
            if face.len() != 3 {
                return None;
            }
            let verts = [
                arena.vertex(face.verts[0]).co_exact.clone(),
                arena.vertex(face.verts[1]).co_exact.clone(),
                arena.vertex(face.verts[2]).co_exact.clone(),
            ];
            Some(Triangle { face: f, plane: face.plane.clone(), verts, orig: face.orig })
        })
        .collect();

    // Step 1: pairwise non-coplanar intersections, indexed by face.
    let mut itts: HashMap<FaceId, Vec<Itt>> = HashMap::new();
    for i in 0..triangles.len() {
        for j in (i + 1)..triangles.len() {
            let a = &triangles[i];
            let b = &triangles[j];
            let result = triangle_triangle_intersect(
                (&a.verts[0], &a.verts[1], &a.verts[2]),
                &a.plane,
                (&b.verts[0], &b.verts[1], &b.verts[2]),
                &b.plane,
            );
            match result {
                Itt::Point(_) | Itt::Segment(..) => {
                    itts.entry(a.face).or_default().push(result.clone());
                    itts.entry(b.face).or_default().push(result);
                }
                _ => {}
            }
        }
    }

    // Step 2: coplanar clusters.
    let cluster_input: Vec<(FaceId, Plane, [Vec3; 3])> =
        triangles.iter().map(|t| (t.face, t.plane.clone(), t.verts.clone())).collect();
    let clusters = build_clusters(&cluster_input);
    let mut face_to_cluster: HashMap<FaceId, usize> = HashMap::new();
    for (ci, c) in clusters.iter().enumerate() {
        for &f in &c.faces {
            face_to_cluster.insert(f, ci);
        }
    }

    let by_face: HashMap<FaceId, &Triangle> = triangles.iter().map(|t| (t.face, t)).collect();

    // Memoize one CDT run per cluster (clusters of size 1 are processed the
    // same way as the generic per-triangle path).
    let mut cluster_cache: HashMap<usize, Vec<(FaceId, Vec<[Vec3; 3]>)>> = HashMap::new();

    let mut out_faces = Vec::new();
    for t in &triangles {
        let ci = face_to_cluster[&t.face];
        let cluster = &clusters[ci];
        let per_face = cluster_cache.entry(ci).or_insert_with(|| {
            calc_cluster_subdivided(cluster, &by_face, &itts)
        });
        if let Some((_, pieces)) = per_face.iter().find(|(f, _)| *f == t.face) {
            for piece in pieces {
                let v0 = arena.add_or_find_vert(piece[0].clone(), t.orig);
                let v1 = arena.add_or_find_vert(piece[1].clone(), t.orig);
                let v2 = arena.add_or_find_vert(piece[2].clone(), t.orig);
                if let Ok(id) = arena.add_face(vec![v0, v1, v2], t.orig, None, None) {
                    out_faces.push(id);
                }
            }
        }
    }

    Mesh::new(out_faces)
}

/// Projects every member of `cluster` to 2-D along a shared dominant axis,
/// appends all gathered non-coplanar intersections as CDT constraint edges,
/// triangulates, lifts back to 3-D, and buckets the surviving pieces by
/// which member triangle's polygon contains them.
fn calc_cluster_subdivided(
    cluster: &Cluster,
    by_face: &HashMap<FaceId, &Triangle>,
    itts: &HashMap<FaceId, Vec<Itt>>,
) -> Vec<(FaceId, Vec<[Vec3; 3]>)> {
    let rep = by_face[&cluster.faces[0]];
    let plane = rep.plane.clone();
    let axis = dominant_axis(&plane.n);

    let mut points: Vec<Vec2> = Vec::new();
    let mut point_index: HashMap<(String, String), u32> = HashMap::new();
    let mut faces_2d: Vec<Vec<u32>> = Vec::new();
    let mut edges: Vec<(u32, u32)> = Vec::new();

    let mut intern = |p2: Vec2, points: &mut Vec<Vec2>, index: &mut HashMap<(String, String), u32>| -> u32 {
        let key = (p2.x.to_string(), p2.y.to_string());
        *index.entry(key).or_insert_with(|| {
            points.push(p2);
            (points.len() - 1) as u32
        })
    };

    for &f in &cluster.faces {
        let tri = by_face[&f];
        let mut ccw = project_ccw(&tri.verts, axis);
        if reversed_normal(&tri.plane, &plane) {
            ccw.reverse();
        }
        let idx: Vec<u32> = ccw.into_iter().map(|p| intern(p, &mut points, &mut point_index)).collect();
        faces_2d.push(idx);

        for itt in itts.get(&f).into_iter().flatten() {
            if let Itt::Segment(a, b) = itt {
                let ia = intern(project_point(a, axis), &mut points, &mut point_index);
                let ib = intern(project_point(b, axis), &mut points, &mut point_index);
                edges.push((ia, ib));
            }
        }
    }

    let input = CdtInput { points, edges, faces: faces_2d.clone(), eps: ratio(0, 1) };
    let output = match rexact_cdt::calc(&input, OutputMode::Inside) {
        Ok(o) => o,
        Err(_) => return cluster.faces.iter().map(|&f| (f, Vec::new())).collect(),
    };

    let mut result: HashMap<FaceId, Vec<[Vec3; 3]>> = cluster.faces.iter().map(|&f| (f, Vec::new())).collect();
    for (ti, tri) in output.faces.iter().enumerate() {
        let owners = &output.faces_orig[ti];
        let owner_face = owners.first().map(|&fi| cluster.faces[fi as usize]);
        let piece3d = [
            lift(&output.verts[tri[0] as usize], &plane, axis),
            lift(&output.verts[tri[1] as usize], &plane, axis),
            lift(&output.verts[tri[2] as usize], &plane, axis),
        ];
        if let Some(owner) = owner_face {
            result.get_mut(&owner).unwrap().push(piece3d);
        }
    }
    result.into_iter().collect()
}

fn project_point(p: &Vec3, axis: usize) -> Vec2 {
    p.project_dominant(axis)
}

fn project_ccw(verts: &[Vec3; 3], axis: usize) -> Vec<Vec2> {
    let mut pts: Vec<Vec2> = verts.iter().map(|p| p.project_dominant(axis)).collect();
    if orient2d(&pts[0], &pts[1], &pts[2]) == Sign::Neg {
        pts.swap(1, 2);
    }
    pts
}

fn reversed_normal(face_plane: &Plane, cluster_plane: &Plane) -> bool {
    let dot = face_plane.n.dot(&cluster_plane.n);
    rexact_math::sgn(&dot) == Sign::Neg
}

/// `p3d[axis] = -(sum_{i != axis} n_i * p2d_i + d) / n_axis`.
fn lift(p2: &Vec2, plane: &Plane, axis: usize) -> Vec3 {
    let (i0, i1) = match axis {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let n = [&plane.n.x, &plane.n.y, &plane.n.z];
    let in_plane_sum = n[i0] * &p2.x + n[i1] * &p2.y;
    let numer = in_plane_sum + &plane.d;
    let missing: R = -(&numer / n[axis]);
    match axis {
        0 => Vec3::new(missing, p2.x.clone(), p2.y.clone()),
        1 => Vec3::new(p2.x.clone(), missing, p2.y.clone()),
        _ => Vec3::new(p2.x.clone(), p2.y.clone(), missing),
    }
}
