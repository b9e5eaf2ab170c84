//! Groups coplanar, non-trivially overlapping triangles so they can be
//! retriangulated jointly rather than pairwise.

use std::collections::HashMap;

use rexact_arena::{FaceId, Plane};
use rexact_math::{dominant_axis, orient2d, Sign, Vec2, Vec3};

/// A 2-D projection of a triangle along its plane's dominant axis, CCW.
struct Projected {
    face: FaceId,
    pts: [Vec2; 3],
}

/// True iff coplanar triangles `a`/`b` (already projected to 2-D) overlap in
/// more than a shared vertex or shared edge: a point of one strictly inside
/// the other, the hexagonal interlock of a general crossing, a shared edge
/// with the third vertex on the inside of the opposite two edges, or the
/// triangles coincide up to rotation. All of these reduce to the same
/// 18-`orient2d` battery: every vertex of `a` against every edge of `b` and
/// vice versa, since any of the listed patterns forces at least one such
/// "vertex strictly left of edge" test to flip between the two triangles in
/// a way a simple boundary touch cannot.
fn non_trivially_intersects(a: &Projected, b: &Projected) -> bool {
    if triangles_coincide(a, b) {
        return true;
    }
    strictly_inside_any(a, b) || strictly_inside_any(b, a) || edges_cross(a, b)
}

fn triangles_coincide(a: &Projected, b: &Projected) -> bool {
    let a_set: std::collections::HashSet<_> = a.pts.iter().map(key).collect();
    let b_set: std::collections::HashSet<_> = b.pts.iter().map(key).collect();
    a_set == b_set
}

fn key(p: &Vec2) -> (String, String) {
    (p.x.to_string(), p.y.to_string())
}

fn strictly_inside_any(a: &Projected, b: &Projected) -> bool {
    a.pts.iter().any(|p| strictly_inside(p, b))
}

fn strictly_inside(p: &Vec2, t: &Projected) -> bool {
    let s0 = orient2d(&t.pts[0], &t.pts[1], p);
    let s1 = orient2d(&t.pts[1], &t.pts[2], p);
    let s2 = orient2d(&t.pts[2], &t.pts[0], p);
    s0 == Sign::Pos && s1 == Sign::Pos && s2 == Sign::Pos
}

fn edges_cross(a: &Projected, b: &Projected) -> bool {
    for i in 0..3 {
        let (a0, a1) = (&a.pts[i], &a.pts[(i + 1) % 3]);
        for j in 0..3 {
            let (b0, b1) = (&b.pts[j], &b.pts[(j + 1) % 3]);
            let s1 = orient2d(a0, a1, b0);
            let s2 = orient2d(a0, a1, b1);
            let s3 = orient2d(b0, b1, a0);
            let s4 = orient2d(b0, b1, a1);
            if s1 != s2 && s1 != Sign::Zero && s2 != Sign::Zero && s3 != s4 && s3 != Sign::Zero && s4 != Sign::Zero {
                return true;
            }
        }
    }
    false
}

fn project(plane: &Plane, verts: [&Vec3; 3]) -> Projected {
    let axis = dominant_axis(&plane.n);
    let mut pts = [
        verts[0].project_dominant(axis),
        verts[1].project_dominant(axis),
        verts[2].project_dominant(axis),
    ];
    if orient2d(&pts[0], &pts[1], &pts[2]) == Sign::Neg {
        pts.swap(1, 2);
    }
    Projected { face: FaceId::INVALID, pts }
}

/// A group of coplanar faces that must be retriangulated together.
pub struct Cluster {
    pub faces: Vec<FaceId>,
}

/// Builds coplanar clusters in a single pass over `(face, plane, verts)`
/// triples. Only clusters with 2+ members need the coplanar retriangulation
/// path; singletons are returned too so callers can route them through the
/// generic per-triangle path uniformly.
pub fn build_clusters(triangles: &[(FaceId, Plane, [Vec3; 3])]) -> Vec<Cluster> {
    let mut by_plane: HashMap<PlaneKey, Vec<Vec<(FaceId, Projected)>>> = HashMap::new();

    for (face, plane, verts) in triangles {
        let projected = project(plane, [&verts[0], &verts[1], &verts[2]]);
        let pk = PlaneKey::from(plane);
        let clusters = by_plane.entry(pk).or_default();

        let hits: Vec<usize> = clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.iter().any(|(_, other)| non_trivially_intersects(&projected, other)))
            .map(|(i, _)| i)
            .collect();

        if hits.is_empty() {
            clusters.push(vec![(*face, projected)]);
        } else {
            let mut merged = vec![(*face, projected)];
            for &i in hits.iter().rev() {
                merged.extend(clusters.remove(i));
            }
            clusters.push(merged);
        }
    }

    by_plane
        .into_values()
        .flatten()
        .map(|members| Cluster { faces: members.into_iter().map(|(f, _)| f).collect() })
        .collect()
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PlaneKey(String, String, String, String);

impl From<&Plane> for PlaneKey {
    fn from(p: &Plane) -> Self {
        PlaneKey(p.n.x.to_string(), p.n.y.to_string(), p.n.z.to_string(), p.d.to_string())
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
    fn disjoint_coplanar_triangles_stay_singletons() {
        let plane = Plane::from_three_points(&v(0, 0, 0), &v(1, 0, 0), &v(0, 1, 0)).unwrap();
        let t1 = (FaceId(0), plane.clone(), [v(0, 0, 0), v(1, 0, 0), v(0, 1, 0)]);
        let t2 = (FaceId(1), plane, [v(10, 0, 0), v(11, 0, 0), v(10, 1, 0)]);
        let clusters = build_clusters(&[t1, t2]);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.faces.len() == 1));
    }

    #[test]
    fn overlapping_coplanar_triangles_merge() {
        let plane = Plane::from_three_points(&v(0, 0, 0), &v(4, 0, 0), &v(0, 4, 0)).unwrap();
        let t1 = (FaceId(0), plane.clone(), [v(0, 0, 0), v(4, 0, 0), v(0, 4, 0)]);
        let t2 = (FaceId(1), plane, [v(1, 1, 0), v(5, 1, 0), v(1, 5, 0)]);
        let clusters = build_clusters(&[t1, t2]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].faces.len(), 2);
    }
}
